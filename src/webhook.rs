//! Signed callback bodies from the aggregator.
//!
//! The provider signs the raw request body with a shared secret
//! (hex HMAC-SHA256). Bodies are only parsed after the signature checks out.

use anyhow::{Context, Result};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::models::{ConsentStatus, SessionStatus};

type HmacSha256 = Hmac<Sha256>;

/// Consent approval/revocation pushed by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentCallback {
    /// Provider-side consent handle.
    pub consent_id: String,
    pub status: ConsentStatus,
}

/// Notification that a data session finished preparing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataReadyWebhook {
    pub session_id: String,
    pub status: SessionStatus,
}

#[derive(Clone)]
pub struct WebhookVerifier {
    secret: SecretString,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier").finish_non_exhaustive()
    }
}

impl WebhookVerifier {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    fn mac(&self, body: &[u8]) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .context("Invalid webhook secret")?;
        mac.update(body);
        Ok(mac)
    }

    /// Hex signature for `body`.
    pub fn sign(&self, body: &[u8]) -> Result<String> {
        Ok(hex::encode(self.mac(body)?.finalize().into_bytes()))
    }

    /// Constant-time check of a hex signature. An optional `sha256=` prefix is
    /// accepted. Malformed signatures simply fail.
    pub fn verify(&self, body: &[u8], signature: &str) -> bool {
        let signature = signature.trim();
        let signature = signature.strip_prefix("sha256=").unwrap_or(signature);
        let Ok(provided) = hex::decode(signature) else {
            return false;
        };
        let Ok(mac) = self.mac(body) else {
            return false;
        };
        let expected = mac.finalize().into_bytes();
        if provided.len() != expected.len() {
            return false;
        }
        expected.as_slice().ct_eq(provided.as_slice()).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(SecretString::new("whsec_test".into()))
    }

    #[test]
    fn signature_round_trips_and_is_hex_sha256() {
        let body = br#"{"consent_id":"h-1","status":"ACTIVE"}"#;
        let signature = verifier().sign(body).unwrap();
        assert_eq!(signature.len(), 64);
        assert!(verifier().verify(body, &signature));
        assert!(verifier().verify(body, &format!("sha256={signature}")));
        assert!(verifier().verify(body, &signature.to_uppercase()));
    }

    #[test]
    fn tampered_body_wrong_secret_and_garbage_fail() {
        let body = br#"{"session_id":"s-1","status":"READY"}"#;
        let signature = verifier().sign(body).unwrap();

        assert!(!verifier().verify(br#"{"session_id":"s-2","status":"READY"}"#, &signature));
        let other = WebhookVerifier::new(SecretString::new("another".into()));
        assert!(!other.verify(body, &signature));
        assert!(!verifier().verify(body, "not-hex"));
        assert!(!verifier().verify(body, &signature[..10]));
        assert!(!verifier().verify(body, ""));
    }

    #[test]
    fn payloads_parse_provider_json() {
        let callback: ConsentCallback =
            serde_json::from_str(r#"{"consent_id":"h-9","status":"REVOKED"}"#).unwrap();
        assert_eq!(callback.status, ConsentStatus::Revoked);

        let ready: DataReadyWebhook =
            serde_json::from_str(r#"{"session_id":"s-9","status":"READY"}"#).unwrap();
        assert_eq!(ready.status, SessionStatus::Ready);
    }
}
