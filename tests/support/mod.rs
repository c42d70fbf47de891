#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use bankfeed::clock::ManualClock;
use bankfeed::config::SyntheticConfig;
use bankfeed::ingest::IngestionService;
use bankfeed::models::{
    Consent, ConsentRequest, ConsentStatus, DateRange, FetchFrequency, Id, RawTransaction,
    SequentialIdGenerator, SessionStatus,
};
use bankfeed::provider::{
    AggregatorClient, ConsentGrant, CreateConsentRequest, SessionGrant, SyntheticProvider,
};
use bankfeed::storage::{MemoryStorage, Storage};
use bankfeed::webhook::WebhookVerifier;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use secrecy::SecretString;

pub const WEBHOOK_SECRET: &str = "test-webhook-secret";

pub fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, month, day).unwrap()
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 2, 1, 9, 0, 0).unwrap()
}

pub fn verifier() -> WebhookVerifier {
    WebhookVerifier::new(SecretString::new(WEBHOOK_SECRET.into()))
}

pub struct TestEnv {
    pub service: IngestionService,
    pub provider: Arc<SyntheticProvider>,
    pub storage: Arc<dyn Storage>,
    pub clock: Arc<ManualClock>,
    pub verifier: WebhookVerifier,
}

impl TestEnv {
    pub fn new(ready_delay: Duration) -> Self {
        Self::with_storage(Arc::new(MemoryStorage::new()), ready_delay)
    }

    pub fn with_storage(storage: Arc<dyn Storage>, ready_delay: Duration) -> Self {
        let provider = synthetic(ready_delay);
        Self::build(storage, provider.clone(), provider)
    }

    /// Service talks to a [`FlakyProvider`] wrapped around the synthetic one.
    pub fn flaky(ready_delay: Duration) -> (Self, Arc<FlakyProvider>) {
        let provider = synthetic(ready_delay);
        let flaky = Arc::new(FlakyProvider::new(provider.clone()));
        let env = Self::build(Arc::new(MemoryStorage::new()), provider, flaky.clone());
        (env, flaky)
    }

    fn build(
        storage: Arc<dyn Storage>,
        provider: Arc<SyntheticProvider>,
        client: Arc<dyn AggregatorClient>,
    ) -> Self {
        let clock = Arc::new(ManualClock::new(start_time()));
        let service = IngestionService::new(storage.clone(), client)
            .with_clock(clock.clone())
            .with_id_generator(Arc::new(SequentialIdGenerator::new("test")))
            .with_webhook_verifier(verifier());
        Self {
            service,
            provider,
            storage,
            clock,
            verifier: verifier(),
        }
    }

    pub fn with_dedup_lookback(mut self, lookback: usize) -> Self {
        self.service = self.service.with_dedup_lookback(lookback);
        self
    }

    pub async fn pending_consent(&self, user: &Id) -> Consent {
        let request = ConsentRequest {
            fi_type: "DEPOSIT".to_string(),
            purpose: "Spending insights".to_string(),
            date_range: DateRange::new(date(1, 1), date(12, 31)).unwrap(),
            frequency: FetchFrequency::default(),
        };
        self.service.initiate_consent(user, request).await.unwrap()
    }

    /// Consent approved at the provider and confirmed by callback.
    pub async fn active_consent(&self, user: &Id) -> Consent {
        let consent = self.pending_consent(user).await;
        self.provider.approve(&consent.handle).await.unwrap();
        self.service
            .handle_consent_callback(&consent.handle, ConsentStatus::Active)
            .await
            .unwrap()
    }

    pub fn signed(&self, body: &serde_json::Value) -> (Vec<u8>, String) {
        let bytes = serde_json::to_vec(body).unwrap();
        let signature = self.verifier.sign(&bytes).unwrap();
        (bytes, signature)
    }
}

fn synthetic(ready_delay: Duration) -> Arc<SyntheticProvider> {
    Arc::new(SyntheticProvider::new(&SyntheticConfig::default()).with_ready_delay(ready_delay))
}

/// Synthetic provider with switchable faults.
pub struct FlakyProvider {
    inner: Arc<SyntheticProvider>,
    pub fail_revoke: AtomicBool,
    pub corrupt_first_record: AtomicBool,
}

impl FlakyProvider {
    pub fn new(inner: Arc<SyntheticProvider>) -> Self {
        Self {
            inner,
            fail_revoke: AtomicBool::new(false),
            corrupt_first_record: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl AggregatorClient for FlakyProvider {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn create_consent(&self, request: &CreateConsentRequest) -> Result<ConsentGrant> {
        self.inner.create_consent(request).await
    }

    async fn get_consent_status(&self, handle: &str) -> Result<ConsentStatus> {
        self.inner.get_consent_status(handle).await
    }

    async fn create_data_session(&self, handle: &str, range: &DateRange) -> Result<SessionGrant> {
        self.inner.create_data_session(handle, range).await
    }

    async fn get_session_status(&self, session_id: &str) -> Result<SessionStatus> {
        self.inner.get_session_status(session_id).await
    }

    async fn fetch_transactions(&self, session_id: &str) -> Result<Vec<RawTransaction>> {
        let mut records = self.inner.fetch_transactions(session_id).await?;
        if self.corrupt_first_record.load(Ordering::SeqCst) {
            if let Some(first) = records.first_mut() {
                first.posted_at = "garbage".to_string();
            }
        }
        Ok(records)
    }

    async fn revoke_consent(&self, handle: &str) -> Result<()> {
        if self.fail_revoke.load(Ordering::SeqCst) {
            anyhow::bail!("aggregator unavailable");
        }
        self.inner.revoke_consent(handle).await
    }
}
