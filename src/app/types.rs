use serde::Serialize;

use crate::ingest::IngestReport;
use crate::models::{CategoryOverride, Consent, NormalizedTransaction, Transaction};

/// JSON output for stored transactions
#[derive(Debug, Serialize)]
pub struct TransactionOutput {
    pub id: String,
    pub posted_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_date: Option<String>,
    pub description: String,
    pub merchant: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    pub amount: String,
    pub currency: String,
    #[serde(rename = "type")]
    pub txn_type: String,
    pub account_ref: String,
    pub source: String,
    pub dedup_hash: String,
}

impl From<&Transaction> for TransactionOutput {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id.to_string(),
            posted_at: tx.posted_at.to_rfc3339(),
            value_date: tx.value_date.map(|d| d.to_string()),
            description: tx.description.clone(),
            merchant: tx.merchant.clone(),
            category: tx.category.clone(),
            subcategory: tx.subcategory.clone(),
            amount: tx.amount.to_string(),
            currency: tx.currency.clone(),
            txn_type: tx.txn_type.to_string(),
            account_ref: tx.account_ref.clone(),
            source: tx.source.as_str().to_string(),
            dedup_hash: tx.dedup_hash.clone(),
        }
    }
}

/// JSON output for consents
#[derive(Debug, Serialize)]
pub struct ConsentOutput {
    pub id: String,
    pub handle: String,
    pub status: String,
    pub fi_type: String,
    pub from: String,
    pub to: String,
    pub redirect_url: String,
    pub expires_at: Option<String>,
}

impl From<&Consent> for ConsentOutput {
    fn from(consent: &Consent) -> Self {
        Self {
            id: consent.id.to_string(),
            handle: consent.handle.clone(),
            status: consent.status.to_string(),
            fi_type: consent.fi_type.clone(),
            from: consent.date_range.from.to_string(),
            to: consent.date_range.to.to_string(),
            redirect_url: consent.redirect_url.clone(),
            expires_at: consent.expires_at.map(|ts| ts.to_rfc3339()),
        }
    }
}

/// Counts from one pipeline run.
#[derive(Debug, Serialize)]
pub struct IngestReportOutput {
    pub session_id: String,
    pub fetched: usize,
    pub unique: usize,
    pub new: usize,
    pub duplicates: usize,
    pub failed: usize,
}

impl From<&IngestReport> for IngestReportOutput {
    fn from(report: &IngestReport) -> Self {
        Self {
            session_id: report.session_id.clone(),
            fetched: report.fetched,
            unique: report.unique,
            new: report.new.len(),
            duplicates: report.duplicates,
            failed: report.failed,
        }
    }
}

/// Result of a synthetic end-to-end run.
#[derive(Debug, Serialize)]
pub struct SimulateOutput {
    pub user_id: String,
    pub consent: ConsentOutput,
    pub report: IngestReportOutput,
    pub stored_total: usize,
}

/// JSON output for category overrides
#[derive(Debug, Serialize)]
pub struct OverrideOutput {
    pub id: String,
    pub pattern: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    pub created_at: String,
}

impl From<&CategoryOverride> for OverrideOutput {
    fn from(rule: &CategoryOverride) -> Self {
        Self {
            id: rule.id.to_string(),
            pattern: rule.matcher.pattern(),
            category: rule.category.clone(),
            subcategory: rule.subcategory.clone(),
            created_at: rule.created_at.to_rfc3339(),
        }
    }
}

/// One record run through the normalizer and hasher.
#[derive(Debug, Serialize)]
pub struct NormalizeOutput {
    pub normalized: NormalizedTransaction,
    pub hash_input: String,
    pub dedup_hash: String,
}
