use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::models::{Consent, Id, IdGenerator, UuidIdGenerator};
use crate::provider::AggregatorClient;
use crate::storage::Storage;
use crate::webhook::WebhookVerifier;

use super::{IngestError, IngestResult};

const DEFAULT_VALIDITY_DAYS: i64 = 30;
const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_DEDUP_LOOKBACK: usize = 5000;

type UserLocks = StdMutex<HashMap<Id, Arc<Mutex<()>>>>;

/// Held while one user's transactions are checked and persisted. The map
/// entry is dropped with the last holder, so idle users cost nothing.
pub(super) struct UserLock<'a> {
    locks: &'a UserLocks,
    user_id: Id,
    lock: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for UserLock<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the map and this handle remain: nobody is waiting.
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.user_id);
        }
    }
}

/// The ingestion orchestrator.
///
/// Holds no per-user state beyond a lock per user, taken around the
/// "load known hashes, persist new ones" step so concurrent fetches for the
/// same user cannot both persist a transaction.
pub struct IngestionService {
    pub(super) storage: Arc<dyn Storage>,
    pub(super) provider: Arc<dyn AggregatorClient>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) ids: Arc<dyn IdGenerator>,
    pub(super) consent_validity: chrono::Duration,
    pub(super) provider_timeout: Duration,
    pub(super) dedup_lookback: usize,
    pub(super) webhook: Option<WebhookVerifier>,
    user_locks: UserLocks,
}

impl IngestionService {
    pub fn new(storage: Arc<dyn Storage>, provider: Arc<dyn AggregatorClient>) -> Self {
        Self {
            storage,
            provider,
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidIdGenerator),
            consent_validity: chrono::Duration::days(DEFAULT_VALIDITY_DAYS),
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
            dedup_lookback: DEFAULT_DEDUP_LOOKBACK,
            webhook: None,
            user_locks: StdMutex::new(HashMap::new()),
        }
    }

    /// Apply the consent, provider-timeout and ingestion settings from config.
    pub fn with_config(self, config: &Config) -> anyhow::Result<Self> {
        let validity = chrono::Duration::from_std(config.consent.validity)
            .map_err(|_| anyhow::anyhow!("consent.validity is out of range"))?;
        Ok(self
            .with_consent_validity(validity)
            .with_provider_timeout(config.provider.timeout)
            .with_dedup_lookback(config.ingestion.dedup_lookback))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_consent_validity(mut self, validity: chrono::Duration) -> Self {
        self.consent_validity = validity;
        self
    }

    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    pub fn with_dedup_lookback(mut self, lookback: usize) -> Self {
        self.dedup_lookback = lookback;
        self
    }

    pub fn with_webhook_verifier(mut self, verifier: WebhookVerifier) -> Self {
        self.webhook = Some(verifier);
        self
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn provider(&self) -> &Arc<dyn AggregatorClient> {
        &self.provider
    }

    /// Run a provider call under the configured timeout. Failures and
    /// timeouts both surface as [`IngestError::Provider`].
    pub(super) async fn call_provider<T, F>(
        &self,
        operation: &'static str,
        call: F,
    ) -> IngestResult<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        match tokio::time::timeout(self.provider_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                tracing::warn!(
                    provider = self.provider.name(),
                    operation,
                    error = %format!("{err:#}"),
                    "provider call failed"
                );
                Err(IngestError::Provider(
                    err.context(format!("{} {operation}", self.provider.name())),
                ))
            }
            Err(_) => {
                tracing::warn!(
                    provider = self.provider.name(),
                    operation,
                    timeout_ms = self.provider_timeout.as_millis() as u64,
                    "provider call timed out"
                );
                Err(IngestError::Provider(anyhow::anyhow!(
                    "{} {operation} timed out after {:?}",
                    self.provider.name(),
                    self.provider_timeout
                )))
            }
        }
    }

    /// Serialize hash lookup and persistence for one user.
    pub(super) async fn lock_user(&self, user_id: &Id) -> UserLock<'_> {
        let lock = {
            let mut locks = self.user_locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(user_id.clone()).or_default())
        };
        let guard = Arc::clone(&lock).lock_owned().await;
        UserLock {
            locks: &self.user_locks,
            user_id: user_id.clone(),
            lock,
            guard: Some(guard),
        }
    }

    /// Load a consent and check it belongs to `user_id`.
    pub(super) async fn owned_consent(
        &self,
        user_id: &Id,
        consent_id: &Id,
    ) -> IngestResult<Consent> {
        let consent = self
            .storage
            .get_consent(consent_id)
            .await?
            .ok_or_else(|| IngestError::NotFound {
                what: "Consent",
                id: consent_id.to_string(),
            })?;
        if &consent.user_id != user_id {
            return Err(IngestError::Unauthorized {
                what: "Consent",
                id: consent_id.to_string(),
            });
        }
        Ok(consent)
    }
}
