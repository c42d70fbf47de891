//! In-memory storage implementation for testing.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::models::{CategoryOverride, Consent, ConsentStatus, DataSession, Id, Transaction};

use super::{DuplicateTransaction, Storage, TransactionQuery};

/// In-memory storage for tests and one-off runs.
pub struct MemoryStorage {
    consents: Mutex<HashMap<Id, Consent>>,
    sessions: Mutex<HashMap<String, DataSession>>,
    /// Per user, in persistence order.
    transactions: Mutex<HashMap<Id, Vec<Transaction>>>,
    overrides: Mutex<HashMap<Id, Vec<CategoryOverride>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            consents: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            transactions: Mutex::new(HashMap::new()),
            overrides: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Storage for MemoryStorage {
    async fn create_consent(&self, consent: &Consent) -> Result<()> {
        let mut consents = self.consents.lock().await;
        if consents.contains_key(&consent.id) {
            anyhow::bail!("Consent {} already exists", consent.id);
        }
        consents.insert(consent.id.clone(), consent.clone());
        Ok(())
    }

    async fn get_consent(&self, id: &Id) -> Result<Option<Consent>> {
        let consents = self.consents.lock().await;
        Ok(consents.get(id).cloned())
    }

    async fn get_consent_by_handle(&self, handle: &str) -> Result<Option<Consent>> {
        let consents = self.consents.lock().await;
        Ok(consents.values().find(|c| c.handle == handle).cloned())
    }

    async fn list_consents(&self, user_id: &Id) -> Result<Vec<Consent>> {
        let consents = self.consents.lock().await;
        let mut owned: Vec<Consent> = consents
            .values()
            .filter(|c| &c.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(owned)
    }

    async fn update_consent(&self, consent: &Consent) -> Result<()> {
        let mut consents = self.consents.lock().await;
        match consents.get_mut(&consent.id) {
            Some(existing) => {
                *existing = consent.clone();
                Ok(())
            }
            None => anyhow::bail!("Consent not found: {}", consent.id),
        }
    }

    async fn update_consent_status(
        &self,
        id: &Id,
        status: ConsentStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut consents = self.consents.lock().await;
        Ok(match consents.get_mut(id) {
            Some(existing) => {
                existing.status = status;
                existing.updated_at = updated_at;
                true
            }
            None => false,
        })
    }

    async fn save_session(&self, session: &DataSession) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        sessions.insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<DataSession>> {
        let sessions = self.sessions.lock().await;
        Ok(sessions.get(session_id).cloned())
    }

    async fn create_transaction(&self, tx: &Transaction) -> Result<()> {
        let mut txns = self.transactions.lock().await;
        let user_txns = txns.entry(tx.user_id.clone()).or_default();
        if user_txns.iter().any(|t| t.dedup_hash == tx.dedup_hash) {
            return Err(DuplicateTransaction {
                user_id: tx.user_id.clone(),
                hash: tx.dedup_hash.clone(),
            }
            .into());
        }
        user_txns.push(tx.clone());
        Ok(())
    }

    async fn get_transaction(&self, user_id: &Id, id: &Id) -> Result<Option<Transaction>> {
        let txns = self.transactions.lock().await;
        Ok(txns
            .get(user_id)
            .and_then(|user_txns| user_txns.iter().find(|t| &t.id == id).cloned()))
    }

    async fn get_transaction_by_hash(
        &self,
        user_id: &Id,
        hash: &str,
    ) -> Result<Option<Transaction>> {
        let txns = self.transactions.lock().await;
        Ok(txns
            .get(user_id)
            .and_then(|user_txns| user_txns.iter().find(|t| t.dedup_hash == hash).cloned()))
    }

    async fn list_transactions(
        &self,
        user_id: &Id,
        query: &TransactionQuery,
    ) -> Result<Vec<Transaction>> {
        let txns = self.transactions.lock().await;
        let user_txns = txns.get(user_id).cloned().unwrap_or_default();
        Ok(query.apply(user_txns))
    }

    async fn recent_hashes(&self, user_id: &Id, limit: usize) -> Result<Vec<String>> {
        let txns = self.transactions.lock().await;
        Ok(txns
            .get(user_id)
            .map(|user_txns| {
                user_txns
                    .iter()
                    .rev()
                    .take(limit)
                    .map(|t| t.dedup_hash.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update_transaction_category(
        &self,
        user_id: &Id,
        id: &Id,
        category: &str,
        subcategory: Option<&str>,
    ) -> Result<bool> {
        let mut txns = self.transactions.lock().await;
        let Some(tx) = txns
            .get_mut(user_id)
            .and_then(|user_txns| user_txns.iter_mut().find(|t| &t.id == id))
        else {
            return Ok(false);
        };
        tx.category = category.to_string();
        tx.subcategory = subcategory.map(str::to_string);
        Ok(true)
    }

    async fn delete_transaction(&self, user_id: &Id, id: &Id) -> Result<bool> {
        let mut txns = self.transactions.lock().await;
        let Some(user_txns) = txns.get_mut(user_id) else {
            return Ok(false);
        };
        let before = user_txns.len();
        user_txns.retain(|t| &t.id != id);
        Ok(user_txns.len() != before)
    }

    async fn delete_user_transactions(&self, user_id: &Id) -> Result<usize> {
        let mut txns = self.transactions.lock().await;
        Ok(txns.remove(user_id).map_or(0, |removed| removed.len()))
    }

    async fn create_override(&self, rule: &CategoryOverride) -> Result<()> {
        let mut overrides = self.overrides.lock().await;
        overrides
            .entry(rule.user_id.clone())
            .or_default()
            .push(rule.clone());
        Ok(())
    }

    async fn get_override(&self, user_id: &Id, id: &Id) -> Result<Option<CategoryOverride>> {
        let overrides = self.overrides.lock().await;
        Ok(overrides
            .get(user_id)
            .and_then(|rules| rules.iter().find(|r| &r.id == id).cloned()))
    }

    async fn list_overrides(&self, user_id: &Id) -> Result<Vec<CategoryOverride>> {
        let overrides = self.overrides.lock().await;
        Ok(overrides.get(user_id).cloned().unwrap_or_default())
    }

    async fn update_override(&self, rule: &CategoryOverride) -> Result<bool> {
        let mut overrides = self.overrides.lock().await;
        let Some(existing) = overrides
            .get_mut(&rule.user_id)
            .and_then(|rules| rules.iter_mut().find(|r| r.id == rule.id))
        else {
            return Ok(false);
        };
        *existing = rule.clone();
        Ok(true)
    }

    async fn delete_override(&self, user_id: &Id, id: &Id) -> Result<bool> {
        let mut overrides = self.overrides.lock().await;
        let Some(rules) = overrides.get_mut(user_id) else {
            return Ok(false);
        };
        let before = rules.len();
        rules.retain(|r| &r.id != id);
        Ok(rules.len() != before)
    }
}
