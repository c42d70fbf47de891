//! Account-aggregator boundary.
//!
//! The orchestrator only ever talks to an [`AggregatorClient`]. Which
//! implementation sits behind it is decided once, from configuration, by
//! [`build_provider`].

mod factory;
mod generator;
#[cfg(feature = "http")]
pub mod http;
pub mod synthetic;

pub use factory::build_provider;
pub use generator::TransactionGenerator;
#[cfg(feature = "http")]
pub use http::HttpAggregatorClient;
pub use synthetic::SyntheticProvider;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::models::{
    ConsentRequest, ConsentStatus, DateRange, FetchFrequency, RawTransaction, SessionStatus,
};

/// What the provider needs to open a consent request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateConsentRequest {
    /// Our user id, as the provider's customer identifier.
    pub customer_id: String,
    pub fi_type: String,
    pub purpose: String,
    pub date_range: DateRange,
    pub frequency: FetchFrequency,
}

impl CreateConsentRequest {
    pub fn new(customer_id: impl Into<String>, request: &ConsentRequest) -> Self {
        Self {
            customer_id: customer_id.into(),
            fi_type: request.fi_type.clone(),
            purpose: request.purpose.clone(),
            date_range: request.date_range,
            frequency: request.frequency,
        }
    }
}

/// Provider response to a consent request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentGrant {
    pub handle: String,
    pub redirect_url: String,
    pub status: ConsentStatus,
}

/// Provider response to a data-session request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionGrant {
    pub session_id: String,
    pub status: SessionStatus,
}

/// Capability contract every aggregator implementation provides.
///
/// Errors are plain `anyhow` errors; the orchestrator wraps them (and
/// timeouts) as provider failures.
#[async_trait::async_trait]
pub trait AggregatorClient: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn create_consent(&self, request: &CreateConsentRequest) -> Result<ConsentGrant>;

    async fn get_consent_status(&self, handle: &str) -> Result<ConsentStatus>;

    async fn create_data_session(&self, handle: &str, range: &DateRange) -> Result<SessionGrant>;

    async fn get_session_status(&self, session_id: &str) -> Result<SessionStatus>;

    /// Transactions for a READY session.
    async fn fetch_transactions(&self, session_id: &str) -> Result<Vec<RawTransaction>>;

    /// Revoke at the provider. Revoking twice is not an error.
    async fn revoke_consent(&self, handle: &str) -> Result<()>;
}
