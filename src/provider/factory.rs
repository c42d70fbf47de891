use std::sync::Arc;

use anyhow::Result;

use super::{AggregatorClient, SyntheticProvider};
use crate::config::{ProviderConfig, ProviderKind};

/// Construct the configured aggregator client.
pub fn build_provider(config: &ProviderConfig) -> Result<Arc<dyn AggregatorClient>> {
    match config.kind {
        ProviderKind::Synthetic => Ok(Arc::new(SyntheticProvider::new(&config.synthetic))),
        ProviderKind::Http => build_http(config),
    }
}

#[cfg(feature = "http")]
fn build_http(config: &ProviderConfig) -> Result<Arc<dyn AggregatorClient>> {
    use anyhow::Context;

    let base_url = config
        .base_url
        .as_deref()
        .context("provider.base_url is required for the http provider")?;
    let client = super::HttpAggregatorClient::new(base_url, config.api_key()?, config.timeout)?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "http"))]
fn build_http(_config: &ProviderConfig) -> Result<Arc<dyn AggregatorClient>> {
    anyhow::bail!("bankfeed was built without the \"http\" feature");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds_synthetic() {
        let provider = build_provider(&ProviderConfig::default()).unwrap();
        assert_eq!(provider.name(), "synthetic");
    }

    #[test]
    fn http_without_base_url_fails() {
        let config = ProviderConfig {
            kind: ProviderKind::Http,
            ..ProviderConfig::default()
        };
        assert!(build_provider(&config).is_err());
    }
}
