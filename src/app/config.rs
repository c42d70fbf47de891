use std::path::Path;

use crate::config::{ProviderKind, ResolvedConfig};
use crate::duration::format_duration;

pub fn config_output(config_path: &Path, config: &ResolvedConfig) -> serde_json::Value {
    let provider = &config.config.provider;
    let webhook = &config.config.webhook;
    serde_json::json!({
        "config_file": config_path.display().to_string(),
        "data_directory": config.data_dir.display().to_string(),
        "consent": {
            "validity": format_duration(config.config.consent.validity)
        },
        "provider": {
            "kind": match provider.kind {
                ProviderKind::Synthetic => "synthetic",
                ProviderKind::Http => "http",
            },
            "timeout": format_duration(provider.timeout),
            "base_url": provider.base_url,
            "api_key_env": provider.api_key_env,
            "synthetic": {
                "seed": provider.synthetic.seed,
                "ready_delay": format_duration(provider.synthetic.ready_delay),
                "redirect_base": provider.synthetic.redirect_base
            }
        },
        "ingestion": {
            "dedup_lookback": config.config.ingestion.dedup_lookback
        },
        "webhook": {
            "secret_env": webhook.secret_env,
            "secret_configured": webhook.secret().is_ok()
        }
    })
}
