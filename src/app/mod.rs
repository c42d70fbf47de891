mod config;
mod list;
mod mutations;
mod normalize;
mod simulate;
mod types;

use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use crate::config::ResolvedConfig;
use crate::ingest::IngestionService;
use crate::models::Id;
use crate::provider::build_provider;
use crate::storage::JsonFileStorage;
use crate::webhook::WebhookVerifier;

pub use config::config_output;
pub use list::{list_consents, list_transactions};
pub use mutations::{add_override, list_overrides, remove_override};
pub use normalize::{normalize_output, sign_body, NormalizeArgs};
pub use simulate::{simulate, SimulateRequest};
pub use types::{
    ConsentOutput, IngestReportOutput, NormalizeOutput, OverrideOutput, SimulateOutput,
    TransactionOutput,
};

/// Service over the JSON store in the data directory and the configured
/// provider. The webhook verifier is attached when its secret is set.
pub fn open_service(config: &ResolvedConfig) -> Result<IngestionService> {
    let storage = Arc::new(JsonFileStorage::new(&config.data_dir));
    let provider = build_provider(&config.config.provider)?;
    let service = IngestionService::new(storage, provider).with_config(&config.config)?;
    Ok(match config.config.webhook.secret() {
        Ok(secret) => service.with_webhook_verifier(WebhookVerifier::new(secret)),
        Err(err) => {
            debug!(error = %format!("{err:#}"), "webhook verification disabled");
            service
        }
    })
}

/// CLI user names are used as ids when they are path-safe, otherwise mapped
/// to a stable derived id.
fn user_id(user: &str) -> Id {
    if Id::is_path_safe(user) {
        Id::from_string(user)
    } else {
        Id::from_external(user)
    }
}
