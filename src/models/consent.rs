use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::Id;

/// Lifecycle of a consent (bank link).
///
/// `Pending -> Active -> Revoked` and `Pending -> Revoked`. `Revoked` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsentStatus {
    Pending,
    Active,
    Revoked,
}

impl ConsentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsentStatus::Pending => "PENDING",
            ConsentStatus::Active => "ACTIVE",
            ConsentStatus::Revoked => "REVOKED",
        }
    }

    /// Whether moving from `self` to `next` is legal. Staying put is always
    /// allowed so callbacks can be replayed.
    pub fn can_transition_to(self, next: ConsentStatus) -> bool {
        use ConsentStatus::*;
        matches!(
            (self, next),
            (Pending, Pending)
                | (Pending, Active)
                | (Pending, Revoked)
                | (Active, Active)
                | (Active, Revoked)
                | (Revoked, Revoked)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == ConsentStatus::Revoked
    }
}

impl fmt::Display for ConsentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(ConsentStatus::Pending),
            "ACTIVE" => Ok(ConsentStatus::Active),
            "REVOKED" => Ok(ConsentStatus::Revoked),
            other => anyhow::bail!("Unknown consent status: {other}"),
        }
    }
}

/// How often the aggregator may be asked for fresh data under a consent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FetchFrequency {
    Once,
    #[default]
    Daily,
    Weekly,
    Monthly,
}

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> anyhow::Result<Self> {
        if from > to {
            anyhow::bail!("Invalid date range: {from} is after {to}");
        }
        Ok(Self { from, to })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.from.iter_days().take_while(move |d| *d <= self.to)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.from, self.to)
    }
}

/// What the user asks for when initiating a consent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRequest {
    /// Financial-instrument type, e.g. "SAVINGS".
    pub fi_type: String,
    pub purpose: String,
    pub date_range: DateRange,
    #[serde(default)]
    pub frequency: FetchFrequency,
}

/// A user's grant of read access to one financial-institution relationship.
///
/// Consents are never deleted; revoked ones are kept for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consent {
    pub id: Id,
    pub user_id: Id,
    /// Provider-side consent handle.
    pub handle: String,
    pub fi_type: String,
    pub purpose: String,
    pub date_range: DateRange,
    pub frequency: FetchFrequency,
    pub status: ConsentStatus,
    pub redirect_url: String,
    /// Set when the consent becomes active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Consent {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// A data-fetch session may only be opened while this holds.
    pub fn permits_fetch_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ConsentStatus::Active && !self.is_expired_at(now)
    }
}
