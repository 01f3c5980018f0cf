//! Session model and related functionality

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session entity — the unit of being logged in
///
/// One record per active login, keyed by `session_id` in the shared
/// store. `token_family` is shared by every refresh token descended from
/// the original login and is the handle for replay detection. Records are
/// replaced or deleted, never mutated in place; `expires_at` and the store
/// TTL are computed from the same instant so they cannot disagree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub token_family: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub is_active: bool,
}

impl Session {
    /// Create a new session with a fresh random id
    pub fn new(
        user_id: Uuid,
        token_family: Uuid,
        ip_address: Option<String>,
        user_agent: Option<String>,
        ttl_seconds: u64,
    ) -> Self {
        let created_at = Utc::now();
        Session {
            session_id: Uuid::new_v4(),
            user_id,
            token_family,
            created_at,
            expires_at: created_at + Duration::seconds(ttl_seconds as i64),
            ip_address,
            user_agent,
            is_active: true,
        }
    }

    /// Check if the session has passed its expiry
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// Session info for API responses
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl From<&Session> for SessionSummary {
    fn from(s: &Session) -> Self {
        SessionSummary {
            session_id: s.session_id,
            created_at: s.created_at,
            expires_at: s.expires_at,
            ip_address: s.ip_address.clone(),
            user_agent: s.user_agent.clone(),
        }
    }
}
