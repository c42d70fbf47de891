//! In-process stand-in for an account aggregator.
//!
//! Consents start PENDING until [`SyntheticProvider::approve`] is called, the
//! way a user would approve on the aggregator's page. Data sessions flip to
//! READY after `ready_delay` on a spawned timer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::{
    AggregatorClient, ConsentGrant, CreateConsentRequest, SessionGrant, TransactionGenerator,
};
use crate::config::SyntheticConfig;
use crate::models::{ConsentStatus, DateRange, RawTransaction, SessionStatus};

#[derive(Debug)]
struct SyntheticConsent {
    customer_id: String,
    status: ConsentStatus,
}

#[derive(Debug)]
struct SyntheticSession {
    customer_id: String,
    range: DateRange,
    status: SessionStatus,
    salt: u64,
}

#[derive(Debug, Default)]
struct SyntheticState {
    consents: HashMap<String, SyntheticConsent>,
    sessions: HashMap<String, SyntheticSession>,
}

/// Aggregator backed by [`TransactionGenerator`].
pub struct SyntheticProvider {
    generator: TransactionGenerator,
    ready_delay: Duration,
    redirect_base: String,
    state: Arc<Mutex<SyntheticState>>,
}

impl SyntheticProvider {
    pub fn new(config: &SyntheticConfig) -> Self {
        Self {
            generator: TransactionGenerator::new(config.seed),
            ready_delay: config.ready_delay,
            redirect_base: config.redirect_base.trim_end_matches('/').to_string(),
            state: Arc::new(Mutex::new(SyntheticState::default())),
        }
    }

    /// Zero delay: sessions are READY as soon as they are created.
    pub fn with_ready_delay(mut self, ready_delay: Duration) -> Self {
        self.ready_delay = ready_delay;
        self
    }

    pub fn generator(&self) -> &TransactionGenerator {
        &self.generator
    }

    /// Simulate the user approving the consent at the aggregator.
    pub async fn approve(&self, handle: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let consent = state
            .consents
            .get_mut(handle)
            .with_context(|| format!("Unknown consent handle: {handle}"))?;
        match consent.status {
            ConsentStatus::Pending => {
                consent.status = ConsentStatus::Active;
                debug!(handle, "synthetic consent approved");
                Ok(())
            }
            ConsentStatus::Active => Ok(()),
            ConsentStatus::Revoked => anyhow::bail!("Consent {handle} was revoked"),
        }
    }

    fn schedule_ready(&self, session_id: String) {
        let state = Arc::clone(&self.state);
        let delay = self.ready_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut state = state.lock().await;
            if let Some(session) = state.sessions.get_mut(&session_id) {
                session.status = SessionStatus::Ready;
                debug!(session_id = %session_id, "synthetic session ready");
            }
        });
    }
}

#[async_trait::async_trait]
impl AggregatorClient for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn create_consent(&self, request: &CreateConsentRequest) -> Result<ConsentGrant> {
        let handle = format!("cns-{}", Uuid::new_v4().simple());
        let mut state = self.state.lock().await;
        state.consents.insert(
            handle.clone(),
            SyntheticConsent {
                customer_id: request.customer_id.clone(),
                status: ConsentStatus::Pending,
            },
        );
        Ok(ConsentGrant {
            redirect_url: format!("{}/{handle}", self.redirect_base),
            handle,
            status: ConsentStatus::Pending,
        })
    }

    async fn get_consent_status(&self, handle: &str) -> Result<ConsentStatus> {
        let state = self.state.lock().await;
        state
            .consents
            .get(handle)
            .map(|consent| consent.status)
            .with_context(|| format!("Unknown consent handle: {handle}"))
    }

    async fn create_data_session(&self, handle: &str, range: &DateRange) -> Result<SessionGrant> {
        let session_id = format!("ses-{}", Uuid::new_v4().simple());
        let status = if self.ready_delay.is_zero() {
            SessionStatus::Ready
        } else {
            SessionStatus::Pending
        };

        {
            let mut state = self.state.lock().await;
            let consent = state
                .consents
                .get(handle)
                .with_context(|| format!("Unknown consent handle: {handle}"))?;
            if consent.status != ConsentStatus::Active {
                anyhow::bail!("Consent {handle} is {}, not ACTIVE", consent.status);
            }
            let customer_id = consent.customer_id.clone();
            state.sessions.insert(
                session_id.clone(),
                SyntheticSession {
                    customer_id,
                    range: *range,
                    status,
                    salt: rand::random(),
                },
            );
        }

        if status == SessionStatus::Pending {
            self.schedule_ready(session_id.clone());
        }
        Ok(SessionGrant { session_id, status })
    }

    async fn get_session_status(&self, session_id: &str) -> Result<SessionStatus> {
        let state = self.state.lock().await;
        state
            .sessions
            .get(session_id)
            .map(|session| session.status)
            .with_context(|| format!("Unknown session: {session_id}"))
    }

    async fn fetch_transactions(&self, session_id: &str) -> Result<Vec<RawTransaction>> {
        let (customer_id, range, salt) = {
            let state = self.state.lock().await;
            let session = state
                .sessions
                .get(session_id)
                .with_context(|| format!("Unknown session: {session_id}"))?;
            if session.status != SessionStatus::Ready {
                anyhow::bail!("Session {session_id} is not ready");
            }
            (session.customer_id.clone(), session.range, session.salt)
        };
        Ok(self.generator.deliver(&customer_id, range.days(), salt))
    }

    async fn revoke_consent(&self, handle: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let consent = state
            .consents
            .get_mut(handle)
            .with_context(|| format!("Unknown consent handle: {handle}"))?;
        consent.status = ConsentStatus::Revoked;
        Ok(())
    }
}
