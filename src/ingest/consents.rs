use tracing::{debug, info, warn};

use crate::models::{Consent, ConsentRequest, ConsentStatus, Id};
use crate::provider::CreateConsentRequest;
use crate::webhook::ConsentCallback;

use super::{IngestError, IngestResult, IngestionService};

impl IngestionService {
    /// Ask the provider for a consent and record it as PENDING. Nothing is
    /// stored if the provider call fails.
    pub async fn initiate_consent(
        &self,
        user_id: &Id,
        request: ConsentRequest,
    ) -> IngestResult<Consent> {
        if request.fi_type.trim().is_empty() {
            return Err(IngestError::InvalidInput("fi_type must not be empty".into()));
        }
        let range = request.date_range;
        if range.from > range.to {
            return Err(IngestError::InvalidDateRange {
                from: range.from,
                to: range.to,
            });
        }

        let provider_request = CreateConsentRequest::new(user_id.as_str(), &request);
        let grant = self
            .call_provider("create_consent", self.provider.create_consent(&provider_request))
            .await?;

        let now = self.clock.now();
        let consent = Consent {
            id: self.ids.new_id(),
            user_id: user_id.clone(),
            handle: grant.handle,
            fi_type: request.fi_type,
            purpose: request.purpose,
            date_range: request.date_range,
            frequency: request.frequency,
            status: ConsentStatus::Pending,
            redirect_url: grant.redirect_url,
            expires_at: None,
            created_at: now,
            updated_at: now,
        };
        self.storage.create_consent(&consent).await?;

        info!(
            user_id = %user_id,
            consent_id = %consent.id,
            handle = %consent.handle,
            fi_type = %consent.fi_type,
            "consent initiated"
        );
        Ok(consent)
    }

    /// Provider callback keyed by the provider's consent handle.
    ///
    /// ACTIVE stamps the expiry. Replaying the current status is a no-op
    /// that keeps the original expiry.
    pub async fn handle_consent_callback(
        &self,
        handle: &str,
        status: ConsentStatus,
    ) -> IngestResult<Consent> {
        let consent = self
            .storage
            .get_consent_by_handle(handle)
            .await?
            .ok_or_else(|| IngestError::NotFound {
                what: "Consent",
                id: handle.to_string(),
            })?;
        self.apply_consent_status(consent, status).await
    }

    /// Verify the body signature, then handle it as a consent callback.
    pub async fn handle_signed_consent_callback(
        &self,
        body: &[u8],
        signature: &str,
    ) -> IngestResult<Consent> {
        self.verify_signature(body, signature)?;
        let callback: ConsentCallback = serde_json::from_slice(body)
            .map_err(|err| IngestError::InvalidInput(format!("consent callback body: {err}")))?;
        self.handle_consent_callback(&callback.consent_id, callback.status)
            .await
    }

    /// Revoke at the provider, then locally. A provider failure leaves the
    /// local record untouched.
    pub async fn revoke_consent(&self, user_id: &Id, consent_id: &Id) -> IngestResult<Consent> {
        let mut consent = self.owned_consent(user_id, consent_id).await?;
        if consent.status == ConsentStatus::Revoked {
            debug!(consent_id = %consent_id, "consent already revoked");
            return Ok(consent);
        }

        self.call_provider("revoke_consent", self.provider.revoke_consent(&consent.handle))
            .await?;

        let now = self.clock.now();
        if !self
            .storage
            .update_consent_status(&consent.id, ConsentStatus::Revoked, now)
            .await?
        {
            return Err(IngestError::NotFound {
                what: "Consent",
                id: consent_id.to_string(),
            });
        }
        consent.status = ConsentStatus::Revoked;
        consent.updated_at = now;

        info!(user_id = %user_id, consent_id = %consent_id, "consent revoked");
        Ok(consent)
    }

    /// Consents the user can fetch with right now.
    pub async fn list_active_consents(&self, user_id: &Id) -> IngestResult<Vec<Consent>> {
        Ok(self
            .storage
            .list_active_consents(user_id, self.clock.now())
            .await?)
    }

    /// Every consent the user ever created, revoked ones included.
    pub async fn list_consents(&self, user_id: &Id) -> IngestResult<Vec<Consent>> {
        Ok(self.storage.list_consents(user_id).await?)
    }

    pub async fn get_consent(&self, user_id: &Id, consent_id: &Id) -> IngestResult<Consent> {
        self.owned_consent(user_id, consent_id).await
    }

    /// Poll the provider for the consent status instead of waiting for the
    /// callback, and apply it with the same rules.
    pub async fn refresh_consent_status(
        &self,
        user_id: &Id,
        consent_id: &Id,
    ) -> IngestResult<Consent> {
        let consent = self.owned_consent(user_id, consent_id).await?;
        let status = self
            .call_provider(
                "get_consent_status",
                self.provider.get_consent_status(&consent.handle),
            )
            .await?;
        self.apply_consent_status(consent, status).await
    }

    async fn apply_consent_status(
        &self,
        mut consent: Consent,
        status: ConsentStatus,
    ) -> IngestResult<Consent> {
        if consent.status == status {
            debug!(consent_id = %consent.id, %status, "consent status unchanged");
            return Ok(consent);
        }
        if !consent.status.can_transition_to(status) {
            warn!(
                consent_id = %consent.id,
                from = %consent.status,
                to = %status,
                "rejected consent status change"
            );
            return Err(IngestError::InvalidTransition {
                from: consent.status,
                to: status,
            });
        }

        let now = self.clock.now();
        consent.status = status;
        consent.updated_at = now;
        if status == ConsentStatus::Active {
            consent.expires_at = Some(now + self.consent_validity);
        }
        self.storage.update_consent(&consent).await?;

        info!(
            user_id = %consent.user_id,
            consent_id = %consent.id,
            %status,
            expires_at = ?consent.expires_at,
            "consent status updated"
        );
        Ok(consent)
    }

    pub(super) fn verify_signature(&self, body: &[u8], signature: &str) -> IngestResult<()> {
        let Some(verifier) = &self.webhook else {
            warn!("webhook received but no webhook secret is configured");
            return Err(IngestError::SignatureInvalid);
        };
        if !verifier.verify(body, signature) {
            warn!(body_len = body.len(), "webhook signature mismatch");
            return Err(IngestError::SignatureInvalid);
        }
        Ok(())
    }
}
