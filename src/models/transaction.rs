use std::fmt;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::Id;

pub type Metadata = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Debit,
    Credit,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Debit => "DEBIT",
            TransactionType::Credit => "CREDIT",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transaction as received from an aggregator. Never persisted as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub description: String,
    pub amount: f64,
    pub currency: String,
    #[serde(rename = "type")]
    pub txn_type: TransactionType,
    /// ISO-8601 timestamp or date.
    pub posted_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<f64>,
    #[serde(default)]
    pub account_ref: String,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

/// Canonical projection of a [`RawTransaction`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedTransaction {
    /// Cleaned, uppercased description.
    pub description: String,
    pub raw_description: String,
    pub merchant: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    pub account_ref: String,
    pub amount: f64,
    pub currency: String,
    #[serde(rename = "type")]
    pub txn_type: TransactionType,
    pub posted_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<f64>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionSource {
    Aggregator,
    Manual,
}

impl TransactionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionSource::Aggregator => "aggregator",
            TransactionSource::Manual => "manual",
        }
    }
}

/// The stored record. Only `category`/`subcategory` change after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Id,
    pub user_id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consent_id: Option<Id>,
    pub source: TransactionSource,
    pub dedup_hash: String,
    pub description: String,
    pub raw_description: String,
    pub merchant: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    pub account_ref: String,
    pub amount: Decimal,
    pub currency: String,
    #[serde(rename = "type")]
    pub txn_type: TransactionType,
    pub posted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

/// Identity and provenance for a transaction about to be persisted.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub id: Id,
    pub user_id: Id,
    pub consent_id: Option<Id>,
    pub source: TransactionSource,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Build the stored record. Fails on unparseable timestamps or
    /// non-finite amounts, which the ingestion pipeline treats as a per-record
    /// failure.
    pub fn from_normalized(
        normalized: NormalizedTransaction,
        dedup_hash: String,
        provenance: Provenance,
    ) -> Result<Self> {
        let posted_at = parse_timestamp(&normalized.posted_at)
            .with_context(|| format!("Unparseable posted_at: {:?}", normalized.posted_at))?;
        let value_date = normalized
            .value_date
            .as_deref()
            .map(|raw| {
                parse_timestamp(raw)
                    .map(|ts| ts.date_naive())
                    .with_context(|| format!("Unparseable value_date: {raw:?}"))
            })
            .transpose()?;
        let amount = round_amount(normalized.amount)
            .with_context(|| format!("Invalid amount: {}", normalized.amount))?;
        let balance = normalized
            .balance
            .map(|b| round_amount(b).with_context(|| format!("Invalid balance: {b}")))
            .transpose()?;

        Ok(Self {
            id: provenance.id,
            user_id: provenance.user_id,
            consent_id: provenance.consent_id,
            source: provenance.source,
            dedup_hash,
            description: normalized.description,
            raw_description: normalized.raw_description,
            merchant: normalized.merchant,
            category: normalized.category,
            subcategory: normalized.subcategory,
            account_ref: normalized.account_ref,
            amount,
            currency: normalized.currency,
            txn_type: normalized.txn_type,
            posted_at,
            value_date,
            balance,
            metadata: normalized.metadata,
            created_at: provenance.created_at,
        })
    }
}

/// Round a provider amount to cents. `None` for NaN/infinite values.
pub fn round_amount(amount: f64) -> Option<Decimal> {
    let mut value = Decimal::from_f64(amount)?
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    value.rescale(2);
    Some(value)
}

/// Parse an ISO-8601 timestamp as sent by providers.
///
/// Accepts RFC 3339, a naive `YYYY-MM-DDThh:mm[:ss]` (taken as UTC), or a bare
/// date (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
}
