use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::duration::{deserialize_duration, serialize_duration};

/// Default consent validity window (30 days).
fn default_consent_validity() -> Duration {
    Duration::from_secs(30 * 24 * 60 * 60)
}

/// Default bound on any single provider call.
fn default_provider_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_ready_delay() -> Duration {
    Duration::from_secs(2)
}

/// Consent lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsentConfig {
    /// How long a consent stays usable after the provider approves it.
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub validity: Duration,
}

impl Default for ConsentConfig {
    fn default() -> Self {
        Self {
            validity: default_consent_validity(),
        }
    }
}

/// Which aggregator implementation to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Synthetic,
    Http,
}

/// Synthetic provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    /// Seed for the transaction generator. Same seed, same transactions.
    pub seed: u64,

    /// Delay before a data session flips to READY. Zero means sessions are
    /// READY as soon as they are created.
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub ready_delay: Duration,

    /// Base URL used to mint consent redirect links.
    pub redirect_base: String,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            seed: 7,
            ready_delay: default_ready_delay(),
            redirect_base: "https://aa.example.com/consent".to_string(),
        }
    }
}

/// Aggregator provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,

    /// Upper bound on each provider call; expiry surfaces as a provider error.
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub timeout: Duration,

    /// Base URL of the aggregator API (http provider only).
    pub base_url: Option<String>,

    /// Environment variable holding the aggregator API key (http provider only).
    pub api_key_env: String,

    pub synthetic: SyntheticConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            timeout: default_provider_timeout(),
            base_url: None,
            api_key_env: "BANKFEED_PROVIDER_API_KEY".to_string(),
            synthetic: SyntheticConfig::default(),
        }
    }
}

impl ProviderConfig {
    pub fn api_key(&self) -> Result<SecretString> {
        read_secret_env(&self.api_key_env)
    }
}

/// Ingestion pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// How many of the user's most recent stored hashes are checked before
    /// persisting a batch.
    pub dedup_lookback: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            dedup_lookback: 5000,
        }
    }
}

/// Webhook signature settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Environment variable holding the shared HMAC secret.
    pub secret_env: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret_env: "BANKFEED_WEBHOOK_SECRET".to_string(),
        }
    }
}

impl WebhookConfig {
    pub fn secret(&self) -> Result<SecretString> {
        read_secret_env(&self.secret_env)
    }
}

fn read_secret_env(var: &str) -> Result<SecretString> {
    let value =
        std::env::var(var).with_context(|| format!("Environment variable {var} is not set"))?;
    if value.trim().is_empty() {
        anyhow::bail!("Environment variable {var} is empty");
    }
    Ok(SecretString::new(value.into()))
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Path to data directory. If relative, resolved from config file location.
    /// If not specified, defaults to the config file's directory.
    pub data_dir: Option<PathBuf>,
    pub consent: ConsentConfig,
    pub provider: ProviderConfig,
    pub ingestion: IngestionConfig,
    pub webhook: WebhookConfig,
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.consent.validity.is_zero() {
            anyhow::bail!("consent.validity must be greater than zero");
        }
        if self.provider.timeout.is_zero() {
            anyhow::bail!("provider.timeout must be greater than zero");
        }
        if self.provider.kind == ProviderKind::Http && self.provider.base_url.is_none() {
            anyhow::bail!("provider.base_url is required when provider.kind = \"http\"");
        }
        Ok(())
    }

    /// Resolve the data directory path.
    ///
    /// If `data_dir` is set and relative, it's resolved relative to `config_dir`.
    /// If `data_dir` is not set, returns `config_dir`.
    pub fn resolve_data_dir(&self, config_dir: &Path) -> PathBuf {
        match &self.data_dir {
            Some(data_dir) if data_dir.is_absolute() => data_dir.clone(),
            Some(data_dir) => config_dir.join(data_dir),
            None => config_dir.to_path_buf(),
        }
    }
}

/// Loaded configuration with resolved paths.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub data_dir: PathBuf,
    pub config: Config,
}

/// Returns the default config file path.
///
/// `./bankfeed.toml` if it exists, else `bankfeed/bankfeed.toml` under the
/// XDG data directory.
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from("bankfeed.toml");
    if local_config.exists() {
        return local_config;
    }

    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("bankfeed").join("bankfeed.toml");
    }

    local_config
}

impl ResolvedConfig {
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_path = config_path
            .canonicalize()
            .with_context(|| format!("Config file not found: {}", config_path.display()))?;

        let config_dir = config_path
            .parent()
            .context("Config file has no parent directory")?;

        let config = Config::load(&config_path)?;
        let data_dir = config.resolve_data_dir(config_dir);

        Ok(Self { data_dir, config })
    }

    /// Load config, falling back to defaults when the file doesn't exist. The
    /// data directory is then the config file's intended parent.
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            return Self::load(config_path);
        }

        let config_path = if config_path.is_relative() {
            std::env::current_dir()
                .context("Failed to get current directory")?
                .join(config_path)
        } else {
            config_path.to_path_buf()
        };

        let config_dir = config_path
            .parent()
            .context("Config path has no parent directory")?;

        Ok(Self {
            data_dir: config_dir.to_path_buf(),
            config: Config::default(),
        })
    }
}
