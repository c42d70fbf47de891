//! Consent-gated ingestion: consent lifecycle, data sessions, the
//! normalize → dedup → persist pipeline and the user-facing transaction
//! operations built on it.

mod consents;
mod fetch;
mod service;
mod transactions;

pub use service::IngestionService;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ConsentStatus, Id, SessionStatus, Transaction, TransactionType};

/// Errors surfaced at the orchestrator boundary.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The aggregator failed or timed out. Safe to retry.
    #[error("Provider error: {0:#}")]
    Provider(anyhow::Error),

    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    #[error("{what} {id} does not belong to this user")]
    Unauthorized { what: &'static str, id: String },

    #[error("Consent is {status}, not ACTIVE")]
    ConsentNotActive { status: ConsentStatus },

    #[error("Consent expired at {expired_at}")]
    ConsentExpired { expired_at: DateTime<Utc> },

    #[error("Consent cannot move from {from} to {to}")]
    InvalidTransition {
        from: ConsentStatus,
        to: ConsentStatus,
    },

    #[error("Session {session_id} is {status}, not READY")]
    SessionNotReady {
        session_id: String,
        status: SessionStatus,
    },

    #[error("Invalid date range: {from} is after {to}")]
    InvalidDateRange { from: NaiveDate, to: NaiveDate },

    #[error("Webhook signature is invalid")]
    SignatureInvalid,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Transaction already recorded as {existing}")]
    Duplicate { existing: Id },

    #[error("Storage error: {0:#}")]
    Storage(anyhow::Error),
}

impl IngestError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, IngestError::Provider(_))
    }
}

/// Repository failures for a whole operation.
impl From<anyhow::Error> for IngestError {
    fn from(err: anyhow::Error) -> Self {
        IngestError::Storage(err)
    }
}

pub type IngestResult<T> = std::result::Result<T, IngestError>;

/// Counts and new records from one pipeline run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    pub session_id: String,
    /// Records returned by the provider.
    pub fetched: usize,
    /// Left after intra-batch dedup.
    pub unique: usize,
    /// Persisted by this run.
    pub new: Vec<Transaction>,
    /// Already stored (lookback hit or repository uniqueness).
    pub duplicates: usize,
    /// Records skipped because they could not be persisted.
    pub failed: usize,
}

/// Result of asking for a fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Session was READY and the pipeline ran.
    Ingested(IngestReport),
    /// Provider is still preparing the data; poll or wait for the webhook.
    Pending {
        session_id: String,
        status: SessionStatus,
    },
}

impl FetchOutcome {
    pub fn session_id(&self) -> &str {
        match self {
            FetchOutcome::Ingested(report) => &report.session_id,
            FetchOutcome::Pending { session_id, .. } => session_id,
        }
    }
}

/// A transaction the user typed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualTransaction {
    pub description: String,
    pub amount: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(rename = "type")]
    pub txn_type: TransactionType,
    pub posted_at: String,
    #[serde(default)]
    pub value_date: Option<String>,
    #[serde(default)]
    pub account_ref: Option<String>,
    /// Overrides the inferred category when set.
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub subcategory: Option<String>,
}

fn default_currency() -> String {
    "INR".to_string()
}
