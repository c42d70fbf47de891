mod json_file;
mod memory;

pub use json_file::JsonFileStorage;
pub use memory::MemoryStorage;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};

use crate::models::{CategoryOverride, Consent, ConsentStatus, DataSession, Id, Transaction};

/// Raised (inside `anyhow::Error`) when a transaction with the same dedup
/// hash already exists for the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Transaction with dedup hash {hash} already exists for user {user_id}")]
pub struct DuplicateTransaction {
    pub user_id: Id,
    pub hash: String,
}

/// Filters for listing a user's transactions. Dates are inclusive and
/// compared against the UTC posting date.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl TransactionQuery {
    pub fn matches(&self, tx: &Transaction) -> bool {
        let date = tx.posted_at.date_naive();
        self.from.map_or(true, |from| date >= from) && self.to.map_or(true, |to| date <= to)
    }

    /// Filter, order by posting time, then page.
    pub fn apply(&self, transactions: Vec<Transaction>) -> Vec<Transaction> {
        let mut matched: Vec<Transaction> =
            transactions.into_iter().filter(|tx| self.matches(tx)).collect();
        matched.sort_by(|a, b| a.posted_at.cmp(&b.posted_at).then_with(|| a.id.cmp(&b.id)));
        matched
            .into_iter()
            .skip(self.offset)
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

/// Repository boundary for the ingestion pipeline.
#[async_trait::async_trait]
pub trait Storage: Send + Sync {
    // Consents
    async fn create_consent(&self, consent: &Consent) -> Result<()>;
    async fn get_consent(&self, id: &Id) -> Result<Option<Consent>>;
    async fn get_consent_by_handle(&self, handle: &str) -> Result<Option<Consent>>;
    async fn list_consents(&self, user_id: &Id) -> Result<Vec<Consent>>;
    /// Replace a stored consent. Errors if it does not exist.
    async fn update_consent(&self, consent: &Consent) -> Result<()>;
    /// Returns false if the consent does not exist.
    async fn update_consent_status(
        &self,
        id: &Id,
        status: ConsentStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// ACTIVE consents whose expiry (if any) is after `now`.
    async fn list_active_consents(
        &self,
        user_id: &Id,
        now: DateTime<Utc>,
    ) -> Result<Vec<Consent>> {
        Ok(self
            .list_consents(user_id)
            .await?
            .into_iter()
            .filter(|consent| consent.permits_fetch_at(now))
            .collect())
    }

    // Data sessions
    async fn save_session(&self, session: &DataSession) -> Result<()>;
    async fn get_session(&self, session_id: &str) -> Result<Option<DataSession>>;

    // Transactions
    /// Fails with [`DuplicateTransaction`] if the user already has the hash.
    async fn create_transaction(&self, tx: &Transaction) -> Result<()>;
    async fn get_transaction(&self, user_id: &Id, id: &Id) -> Result<Option<Transaction>>;
    async fn get_transaction_by_hash(
        &self,
        user_id: &Id,
        hash: &str,
    ) -> Result<Option<Transaction>>;
    async fn list_transactions(
        &self,
        user_id: &Id,
        query: &TransactionQuery,
    ) -> Result<Vec<Transaction>>;
    /// Dedup hashes of the user's most recently persisted transactions,
    /// newest first.
    async fn recent_hashes(&self, user_id: &Id, limit: usize) -> Result<Vec<String>>;
    /// Category is the only mutable part of a stored transaction.
    async fn update_transaction_category(
        &self,
        user_id: &Id,
        id: &Id,
        category: &str,
        subcategory: Option<&str>,
    ) -> Result<bool>;
    async fn delete_transaction(&self, user_id: &Id, id: &Id) -> Result<bool>;
    /// Returns how many were removed.
    async fn delete_user_transactions(&self, user_id: &Id) -> Result<usize>;

    // Category overrides, kept in the order the user created them
    async fn create_override(&self, rule: &CategoryOverride) -> Result<()>;
    async fn get_override(&self, user_id: &Id, id: &Id) -> Result<Option<CategoryOverride>>;
    async fn list_overrides(&self, user_id: &Id) -> Result<Vec<CategoryOverride>>;
    async fn update_override(&self, rule: &CategoryOverride) -> Result<bool>;
    async fn delete_override(&self, user_id: &Id, id: &Id) -> Result<bool>;
}
