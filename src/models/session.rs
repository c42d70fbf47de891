use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DateRange, Id};

/// Provider-side state of a data-fetch session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Pending,
    Ready,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "PENDING",
            SessionStatus::Ready => "READY",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local record binding a provider session to the user and consent that
/// opened it. Written when the session is created so webhooks carrying only a
/// session id can be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSession {
    pub session_id: String,
    pub user_id: Id,
    pub consent_id: Id,
    pub range: DateRange,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    /// Last time the fetch pipeline ran for this session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingested_at: Option<DateTime<Utc>>,
}
