//! JSON-over-HTTP adapter for a real account aggregator.
//!
//! Endpoints (relative to the configured base URL):
//! - `POST /consents`, `GET /consents/{handle}`, `POST /consents/{handle}/revoke`
//! - `POST /sessions`, `GET /sessions/{id}`, `GET /sessions/{id}/transactions`
//!
//! Every request carries the API key in `x-api-key`.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use reqwest::{Client, Method, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{AggregatorClient, ConsentGrant, CreateConsentRequest, SessionGrant};
use crate::models::{ConsentStatus, DateRange, FetchFrequency, RawTransaction, SessionStatus};

const API_KEY_HEADER: &str = "x-api-key";

pub struct HttpAggregatorClient {
    base_url: Url,
    api_key: SecretString,
    client: Client,
}

impl HttpAggregatorClient {
    pub fn new(base_url: &str, api_key: SecretString, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid aggregator base URL: {base_url}"))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Aggregator base URL cannot be a base: {base_url}");
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build aggregator HTTP client")?;
        Ok(Self {
            base_url,
            api_key,
            client,
        })
    }

    /// Base URL joined with percent-encoded path segments.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Aggregator base URL cannot be a base"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&impl Serialize>,
    ) -> Result<(StatusCode, String)> {
        let mut request = self
            .client
            .request(method, url.clone())
            .header(API_KEY_HEADER, self.api_key.expose_secret());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Aggregator request failed: {url}"))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .context("Failed to read aggregator response body")?;
        Ok((status, text))
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&impl Serialize>,
    ) -> Result<T> {
        let url = self.url(segments)?;
        let (status, text) = self.send(method, url, body).await?;
        if !status.is_success() {
            anyhow::bail!("Aggregator API request failed ({status}): {text}");
        }
        serde_json::from_str(&text).context("Failed to parse aggregator JSON response")
    }
}

#[derive(Serialize)]
struct CreateConsentBody<'a> {
    customer_id: &'a str,
    fi_type: &'a str,
    purpose: &'a str,
    from: NaiveDate,
    to: NaiveDate,
    frequency: FetchFrequency,
}

#[derive(Deserialize)]
struct ConsentResponse {
    consent_handle: String,
    #[serde(default)]
    redirect_url: String,
    status: ConsentStatus,
}

#[derive(Deserialize)]
struct StatusResponse<S> {
    status: S,
}

#[derive(Serialize)]
struct CreateSessionBody<'a> {
    consent_handle: &'a str,
    from: NaiveDate,
    to: NaiveDate,
}

#[derive(Deserialize)]
struct SessionResponse {
    session_id: String,
    status: SessionStatus,
}

#[derive(Deserialize)]
struct TransactionsResponse {
    #[serde(default)]
    transactions: Vec<RawTransaction>,
}

#[async_trait::async_trait]
impl AggregatorClient for HttpAggregatorClient {
    fn name(&self) -> &str {
        "http"
    }

    async fn create_consent(&self, request: &CreateConsentRequest) -> Result<ConsentGrant> {
        let body = CreateConsentBody {
            customer_id: &request.customer_id,
            fi_type: &request.fi_type,
            purpose: &request.purpose,
            from: request.date_range.from,
            to: request.date_range.to,
            frequency: request.frequency,
        };
        let response: ConsentResponse = self
            .request(Method::POST, &["consents"], Some(&body))
            .await?;
        Ok(ConsentGrant {
            handle: response.consent_handle,
            redirect_url: response.redirect_url,
            status: response.status,
        })
    }

    async fn get_consent_status(&self, handle: &str) -> Result<ConsentStatus> {
        let response: StatusResponse<ConsentStatus> = self
            .request(Method::GET, &["consents", handle], None::<&()>)
            .await?;
        Ok(response.status)
    }

    async fn create_data_session(&self, handle: &str, range: &DateRange) -> Result<SessionGrant> {
        let body = CreateSessionBody {
            consent_handle: handle,
            from: range.from,
            to: range.to,
        };
        let response: SessionResponse = self
            .request(Method::POST, &["sessions"], Some(&body))
            .await?;
        Ok(SessionGrant {
            session_id: response.session_id,
            status: response.status,
        })
    }

    async fn get_session_status(&self, session_id: &str) -> Result<SessionStatus> {
        let response: StatusResponse<SessionStatus> = self
            .request(Method::GET, &["sessions", session_id], None::<&()>)
            .await?;
        Ok(response.status)
    }

    async fn fetch_transactions(&self, session_id: &str) -> Result<Vec<RawTransaction>> {
        let response: TransactionsResponse = self
            .request(
                Method::GET,
                &["sessions", session_id, "transactions"],
                None::<&()>,
            )
            .await?;
        Ok(response.transactions)
    }

    async fn revoke_consent(&self, handle: &str) -> Result<()> {
        let url = self.url(&["consents", handle, "revoke"])?;
        let (status, text) = self.send(Method::POST, url, None::<&()>).await?;
        // 409: already revoked.
        if status.is_success() || status == StatusCode::CONFLICT {
            return Ok(());
        }
        anyhow::bail!("Aggregator API request failed ({status}): {text}");
    }
}
