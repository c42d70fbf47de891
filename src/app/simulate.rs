use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use secrecy::SecretString;
use tracing::info;
use uuid::Uuid;

use crate::config::ResolvedConfig;
use crate::ingest::{FetchOutcome, IngestionService};
use crate::models::{ConsentRequest, ConsentStatus, DateRange, FetchFrequency, SessionStatus};
use crate::provider::{AggregatorClient, SyntheticProvider};
use crate::storage::{JsonFileStorage, TransactionQuery};
use crate::webhook::{ConsentCallback, DataReadyWebhook, WebhookVerifier};

use super::{user_id, SimulateOutput};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct SimulateRequest {
    pub user: String,
    pub fi_type: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

/// Drive one consent through the synthetic aggregator end to end and persist
/// what it delivers into the JSON store.
///
/// The synthetic provider lives in this process, so every run opens a fresh
/// consent. The generated transactions are stable per user and day, which is
/// what makes re-runs show up as duplicates.
pub async fn simulate(config: &ResolvedConfig, request: SimulateRequest) -> Result<SimulateOutput> {
    let range = DateRange::new(request.from, request.to)?;
    let synthetic = &config.config.provider.synthetic;
    let provider = Arc::new(SyntheticProvider::new(synthetic));
    let verifier = WebhookVerifier::new(simulation_secret(config));
    let storage = Arc::new(JsonFileStorage::new(&config.data_dir));
    let service = IngestionService::new(storage, provider.clone())
        .with_config(&config.config)?
        .with_webhook_verifier(verifier.clone());
    let user = user_id(&request.user);

    let consent = service
        .initiate_consent(
            &user,
            ConsentRequest {
                fi_type: request.fi_type,
                purpose: "Spending insights".to_string(),
                date_range: range,
                frequency: FetchFrequency::default(),
            },
        )
        .await?;
    provider.approve(&consent.handle).await?;

    let callback = serde_json::to_vec(&ConsentCallback {
        consent_id: consent.handle.clone(),
        status: ConsentStatus::Active,
    })?;
    let consent = service
        .handle_signed_consent_callback(&callback, &verifier.sign(&callback)?)
        .await?;

    let report = match service
        .fetch_transactions(&user, &consent.id, range.from, range.to)
        .await?
    {
        FetchOutcome::Ingested(report) => report,
        FetchOutcome::Pending { session_id, .. } => {
            let deadline = synthetic.ready_delay + config.config.provider.timeout;
            wait_until_ready(provider.as_ref(), &session_id, deadline).await?;
            let body = serde_json::to_vec(&DataReadyWebhook {
                session_id,
                status: SessionStatus::Ready,
            })?;
            service
                .handle_signed_data_ready_webhook(&body, &verifier.sign(&body)?)
                .await?
        }
    };

    let stored_total = service
        .list_transactions(&user, &TransactionQuery::default())
        .await?
        .len();

    Ok(SimulateOutput {
        user_id: user.to_string(),
        consent: (&consent).into(),
        report: (&report).into(),
        stored_total,
    })
}

fn simulation_secret(config: &ResolvedConfig) -> SecretString {
    config.config.webhook.secret().unwrap_or_else(|_| {
        info!("no webhook secret configured; signing simulated callbacks with a one-off secret");
        SecretString::new(Uuid::new_v4().simple().to_string().into())
    })
}

async fn wait_until_ready(
    provider: &SyntheticProvider,
    session_id: &str,
    timeout: Duration,
) -> Result<()> {
    tokio::time::timeout(timeout, async {
        loop {
            if provider.get_session_status(session_id).await? == SessionStatus::Ready {
                return Ok::<(), anyhow::Error>(());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    })
    .await
    .with_context(|| format!("Session {session_id} was not ready within {timeout:?}"))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::TempDir;

    fn resolved(dir: &TempDir, ready_delay: Duration) -> ResolvedConfig {
        let mut config = Config::default();
        config.provider.synthetic.ready_delay = ready_delay;
        ResolvedConfig {
            data_dir: dir.path().to_path_buf(),
            config,
        }
    }

    fn request(to: u32) -> SimulateRequest {
        SimulateRequest {
            user: "asha".to_string(),
            fi_type: "DEPOSIT".to_string(),
            from: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            to: NaiveDate::from_ymd_opt(2024, 1, to).unwrap(),
        }
    }

    #[tokio::test]
    async fn rerun_only_adds_the_new_days() -> Result<()> {
        let dir = TempDir::new()?;
        let config = resolved(&dir, Duration::ZERO);

        let first = simulate(&config, request(7)).await?;
        assert!(first.report.new > 0);
        assert_eq!(first.report.duplicates, 0);
        assert_eq!(first.consent.status, "ACTIVE");

        let second = simulate(&config, request(10)).await?;
        assert_eq!(second.report.duplicates, first.report.new);
        assert_eq!(second.stored_total, first.report.new + second.report.new);
        Ok(())
    }

    #[tokio::test]
    async fn waits_for_a_delayed_session() -> Result<()> {
        let dir = TempDir::new()?;
        let config = resolved(&dir, Duration::from_millis(50));

        let output = simulate(&config, request(2)).await?;
        assert!(output.report.new > 0);
        assert_eq!(output.stored_total, output.report.new);
        Ok(())
    }
}
