use tracing::info;

use crate::dedup::dedup_hash;
use crate::models::{
    parse_timestamp, CategoryOverride, Id, Metadata, OverrideMatcher, Provenance, RawTransaction,
    Transaction, TransactionSource,
};
use crate::normalize::{apply_overrides, normalize};
use crate::storage::{DuplicateTransaction, TransactionQuery};

use super::{IngestError, IngestResult, IngestionService, ManualTransaction};

impl IngestionService {
    /// Record a transaction the user entered by hand.
    ///
    /// It goes through the same normalizer and hash as aggregator data, so
    /// the same purchase entered manually and later fetched (or the other way
    /// round) is stored once.
    pub async fn add_manual_transaction(
        &self,
        user_id: &Id,
        manual: ManualTransaction,
    ) -> IngestResult<Transaction> {
        validate_manual(&manual)?;

        let raw = RawTransaction {
            description: manual.description,
            amount: manual.amount,
            currency: manual.currency.trim().to_uppercase(),
            txn_type: manual.txn_type,
            posted_at: manual.posted_at,
            value_date: manual.value_date,
            balance: None,
            account_ref: manual.account_ref.unwrap_or_default(),
            metadata: Metadata::new(),
        };
        let mut normalized = normalize(&raw);
        if let Some(category) = manual.category.filter(|c| !c.trim().is_empty()) {
            normalized.category = category;
            normalized.subcategory = manual.subcategory;
        }
        let hash = dedup_hash(&normalized);

        let _guard = self.lock_user(user_id).await;
        if let Some(existing) = self.storage.get_transaction_by_hash(user_id, &hash).await? {
            return Err(IngestError::Duplicate {
                existing: existing.id,
            });
        }

        let provenance = Provenance {
            id: self.ids.new_id(),
            user_id: user_id.clone(),
            consent_id: None,
            source: TransactionSource::Manual,
            created_at: self.clock.now(),
        };
        let tx = Transaction::from_normalized(normalized, hash.clone(), provenance)
            .map_err(|err| IngestError::InvalidInput(format!("{err:#}")))?;

        if let Err(err) = self.storage.create_transaction(&tx).await {
            if err.downcast_ref::<DuplicateTransaction>().is_none() {
                return Err(err.into());
            }
            let existing = self
                .storage
                .get_transaction_by_hash(user_id, &hash)
                .await?
                .map_or_else(|| tx.id.clone(), |existing| existing.id);
            return Err(IngestError::Duplicate { existing });
        }

        info!(
            user_id = %user_id,
            transaction_id = %tx.id,
            amount = %tx.amount,
            category = %tx.category,
            "manual transaction added"
        );
        Ok(tx)
    }

    /// Stored transactions with the user's overrides applied. Stored
    /// categories are not rewritten.
    pub async fn list_transactions(
        &self,
        user_id: &Id,
        query: &TransactionQuery,
    ) -> IngestResult<Vec<Transaction>> {
        let mut transactions = self.storage.list_transactions(user_id, query).await?;
        let rules = self.storage.list_overrides(user_id).await?;
        apply_overrides(&rules, &mut transactions);
        Ok(transactions)
    }

    pub async fn set_transaction_category(
        &self,
        user_id: &Id,
        transaction_id: &Id,
        category: &str,
        subcategory: Option<&str>,
    ) -> IngestResult<Transaction> {
        let category = category.trim();
        if category.is_empty() {
            return Err(IngestError::InvalidInput("category must not be empty".into()));
        }
        let not_found = || IngestError::NotFound {
            what: "Transaction",
            id: transaction_id.to_string(),
        };

        if !self
            .storage
            .update_transaction_category(user_id, transaction_id, category, subcategory)
            .await?
        {
            return Err(not_found());
        }
        self.storage
            .get_transaction(user_id, transaction_id)
            .await?
            .ok_or_else(not_found)
    }

    pub async fn add_category_override(
        &self,
        user_id: &Id,
        pattern: &str,
        category: &str,
        subcategory: Option<&str>,
    ) -> IngestResult<CategoryOverride> {
        let matcher = OverrideMatcher::parse(pattern)
            .map_err(|err| IngestError::InvalidInput(format!("{err:#}")))?;
        let category = category.trim();
        if category.is_empty() {
            return Err(IngestError::InvalidInput("category must not be empty".into()));
        }

        let rule = CategoryOverride {
            id: self.ids.new_id(),
            user_id: user_id.clone(),
            matcher,
            category: category.to_string(),
            subcategory: subcategory.map(str::to_string),
            created_at: self.clock.now(),
        };
        self.storage.create_override(&rule).await?;
        info!(
            user_id = %user_id,
            override_id = %rule.id,
            pattern = %rule.matcher,
            "category override added"
        );
        Ok(rule)
    }

    /// Overrides in the order they are applied.
    pub async fn list_category_overrides(
        &self,
        user_id: &Id,
    ) -> IngestResult<Vec<CategoryOverride>> {
        Ok(self.storage.list_overrides(user_id).await?)
    }

    pub async fn remove_category_override(
        &self,
        user_id: &Id,
        override_id: &Id,
    ) -> IngestResult<()> {
        if !self.storage.delete_override(user_id, override_id).await? {
            return Err(IngestError::NotFound {
                what: "Category override",
                id: override_id.to_string(),
            });
        }
        info!(user_id = %user_id, override_id = %override_id, "category override removed");
        Ok(())
    }

    /// Delete every stored transaction of the user. Consents stay for audit.
    pub async fn delete_account_data(&self, user_id: &Id) -> IngestResult<usize> {
        let _guard = self.lock_user(user_id).await;
        let removed = self.storage.delete_user_transactions(user_id).await?;
        info!(user_id = %user_id, removed, "account transactions deleted");
        Ok(removed)
    }
}

fn validate_manual(manual: &ManualTransaction) -> IngestResult<()> {
    let problem = if manual.description.trim().is_empty() {
        Some("description must not be empty".to_string())
    } else if !manual.amount.is_finite() || manual.amount <= 0.0 {
        Some("amount must be a positive number".to_string())
    } else if manual.currency.trim().is_empty() {
        Some("currency must not be empty".to_string())
    } else if parse_timestamp(&manual.posted_at).is_none() {
        Some(format!("posted_at is not a timestamp: {:?}", manual.posted_at))
    } else {
        None
    };
    problem.map_or(Ok(()), |message| Err(IngestError::InvalidInput(message)))
}
