use std::collections::HashSet;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::dedup::dedupe_batch;
use crate::models::{
    Consent, ConsentStatus, DataSession, DateRange, Id, Provenance, SessionStatus, Transaction,
    TransactionSource,
};
use crate::normalize::normalize;
use crate::storage::DuplicateTransaction;
use crate::webhook::DataReadyWebhook;

use super::{FetchOutcome, IngestError, IngestReport, IngestResult, IngestionService};

impl IngestionService {
    /// Open a data session under an active consent and, when the provider
    /// has the data ready straight away, ingest it.
    ///
    /// A PENDING session is recorded so the data-ready webhook (or
    /// [`poll_session`](Self::poll_session)) can finish the job later.
    pub async fn fetch_transactions(
        &self,
        user_id: &Id,
        consent_id: &Id,
        from: NaiveDate,
        to: NaiveDate,
    ) -> IngestResult<FetchOutcome> {
        if from > to {
            return Err(IngestError::InvalidDateRange { from, to });
        }
        let consent = self.owned_consent(user_id, consent_id).await?;
        self.ensure_fetch_permitted(&consent)?;

        let range = DateRange { from, to };
        let grant = self
            .call_provider(
                "create_data_session",
                self.provider.create_data_session(&consent.handle, &range),
            )
            .await?;

        let session = DataSession {
            session_id: grant.session_id,
            user_id: user_id.clone(),
            consent_id: consent.id.clone(),
            range,
            status: grant.status,
            created_at: self.clock.now(),
            ingested_at: None,
        };
        self.storage.save_session(&session).await?;
        info!(
            user_id = %user_id,
            consent_id = %consent.id,
            session_id = %session.session_id,
            %from,
            %to,
            status = %session.status,
            "data session opened"
        );

        match session.status {
            SessionStatus::Ready => Ok(FetchOutcome::Ingested(self.run_pipeline(session).await?)),
            status => Ok(FetchOutcome::Pending {
                session_id: session.session_id,
                status,
            }),
        }
    }

    /// Provider notification that a session's data is ready.
    ///
    /// Only the session id is trusted from the notification; readiness is
    /// confirmed with the provider before anything is fetched.
    pub async fn handle_data_ready_webhook(&self, session_id: &str) -> IngestResult<IngestReport> {
        let session = self.stored_session(session_id).await?;
        let status = self
            .call_provider(
                "get_session_status",
                self.provider.get_session_status(session_id),
            )
            .await?;
        if status != SessionStatus::Ready {
            return Err(IngestError::SessionNotReady {
                session_id: session_id.to_string(),
                status,
            });
        }
        self.run_pipeline(session).await
    }

    /// Verify the body signature, then handle it as a data-ready webhook.
    pub async fn handle_signed_data_ready_webhook(
        &self,
        body: &[u8],
        signature: &str,
    ) -> IngestResult<IngestReport> {
        self.verify_signature(body, signature)?;
        let webhook: DataReadyWebhook = serde_json::from_slice(body)
            .map_err(|err| IngestError::InvalidInput(format!("data-ready webhook body: {err}")))?;
        self.handle_data_ready_webhook(&webhook.session_id).await
    }

    /// Ask the provider about a session the user opened and ingest it if it
    /// is ready. Stands in for the webhook when none can be received.
    pub async fn poll_session(&self, user_id: &Id, session_id: &str) -> IngestResult<FetchOutcome> {
        let session = self.stored_session(session_id).await?;
        if &session.user_id != user_id {
            return Err(IngestError::Unauthorized {
                what: "Session",
                id: session_id.to_string(),
            });
        }
        let status = self
            .call_provider(
                "get_session_status",
                self.provider.get_session_status(session_id),
            )
            .await?;
        match status {
            SessionStatus::Ready => Ok(FetchOutcome::Ingested(self.run_pipeline(session).await?)),
            status => {
                debug!(session_id, %status, "session not ready yet");
                Ok(FetchOutcome::Pending {
                    session_id: session_id.to_string(),
                    status,
                })
            }
        }
    }

    async fn stored_session(&self, session_id: &str) -> IngestResult<DataSession> {
        self.storage
            .get_session(session_id)
            .await?
            .ok_or_else(|| IngestError::NotFound {
                what: "Session",
                id: session_id.to_string(),
            })
    }

    fn ensure_fetch_permitted(&self, consent: &Consent) -> IngestResult<()> {
        if consent.status != ConsentStatus::Active {
            return Err(IngestError::ConsentNotActive {
                status: consent.status,
            });
        }
        match consent.expires_at {
            Some(expired_at) if expired_at <= self.clock.now() => {
                Err(IngestError::ConsentExpired { expired_at })
            }
            _ => Ok(()),
        }
    }

    /// Fetch, normalize, dedupe and persist one READY session.
    ///
    /// The consent is re-checked first: a consent revoked or expired after
    /// the session was opened stops the fetch. Records that fail to convert
    /// or persist are logged and counted, never fatal to the batch.
    async fn run_pipeline(&self, mut session: DataSession) -> IngestResult<IngestReport> {
        let consent = self.owned_consent(&session.user_id, &session.consent_id).await?;
        self.ensure_fetch_permitted(&consent)?;

        let raw = self
            .call_provider(
                "fetch_transactions",
                self.provider.fetch_transactions(&session.session_id),
            )
            .await?;

        let mut report = IngestReport {
            session_id: session.session_id.clone(),
            fetched: raw.len(),
            ..IngestReport::default()
        };
        let batch = dedupe_batch(raw.iter().map(normalize).collect());
        report.unique = batch.len();

        {
            let _guard = self.lock_user(&session.user_id).await;
            let mut known: HashSet<String> = self
                .storage
                .recent_hashes(&session.user_id, self.dedup_lookback)
                .await?
                .into_iter()
                .collect();

            for item in batch {
                if known.contains(&item.hash) {
                    report.duplicates += 1;
                    continue;
                }
                let hash = item.hash;
                let provenance = Provenance {
                    id: self.ids.new_id(),
                    user_id: session.user_id.clone(),
                    consent_id: Some(session.consent_id.clone()),
                    source: TransactionSource::Aggregator,
                    created_at: self.clock.now(),
                };
                let converted =
                    Transaction::from_normalized(item.transaction, hash.clone(), provenance);
                let tx = match converted {
                    Ok(tx) => tx,
                    Err(err) => {
                        warn!(
                            session_id = %session.session_id,
                            dedup_hash = %hash,
                            error = %format!("{err:#}"),
                            "skipping malformed transaction"
                        );
                        report.failed += 1;
                        continue;
                    }
                };
                match self.storage.create_transaction(&tx).await {
                    Ok(()) => {
                        known.insert(hash);
                        report.new.push(tx);
                    }
                    Err(err) if err.downcast_ref::<DuplicateTransaction>().is_some() => {
                        known.insert(hash);
                        report.duplicates += 1;
                    }
                    Err(err) => {
                        warn!(
                            session_id = %session.session_id,
                            dedup_hash = %hash,
                            error = %format!("{err:#}"),
                            "failed to persist transaction"
                        );
                        report.failed += 1;
                    }
                }
            }
        }

        session.status = SessionStatus::Ready;
        session.ingested_at = Some(self.clock.now());
        if let Err(err) = self.storage.save_session(&session).await {
            warn!(
                session_id = %session.session_id,
                error = %format!("{err:#}"),
                "failed to record session ingestion"
            );
        }

        info!(
            user_id = %session.user_id,
            session_id = %session.session_id,
            fetched = report.fetched,
            unique = report.unique,
            new = report.new.len(),
            duplicates = report.duplicates,
            failed = report.failed,
            "ingestion complete"
        );
        Ok(report)
    }
}
