//! Session store over the shared TTL-capable key-value store
//!
//! One record per active login, keyed by `session:{sessionId}` with a TTL
//! equal to the refresh-token lifetime. The store is the only shared
//! mutable resource in the system; correctness under concurrent refresh
//! relies on [`SessionStore::take`] being atomic, not on in-process locks.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::cache::RedisPool;
use common::error::StoreResult;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::models::Session;

const SESSION_KEY_PREFIX: &str = "session:";

fn session_key(session_id: Uuid) -> String {
    format!("{}{}", SESSION_KEY_PREFIX, session_id)
}

/// Key-value abstraction holding one record per active session
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Write the record with a TTL matching its `expires_at`
    async fn create(&self, session: &Session) -> StoreResult<()>;

    async fn get(&self, session_id: Uuid) -> StoreResult<Option<Session>>;

    /// Atomically fetch the record and delete its key
    ///
    /// Of two concurrent callers presenting the same id, at most one
    /// observes the record. Refresh rotation must go through this, never
    /// through a separate get-then-delete pair.
    async fn take(&self, session_id: Uuid) -> StoreResult<Option<Session>>;

    /// Delete one session; returns whether it existed
    async fn delete(&self, session_id: Uuid) -> StoreResult<bool>;

    /// Liveness check used by request-time authentication
    ///
    /// A missing or expired key means the session is no longer valid
    /// regardless of what an access token claims.
    async fn exists_active(&self, session_id: Uuid) -> StoreResult<bool>;

    /// All active sessions owned by a user
    async fn list_by_user(&self, user_id: Uuid) -> StoreResult<Vec<Session>>;

    /// Delete every session belonging to a user, returning the count
    ///
    /// Not atomic across keys: a session created concurrently with an
    /// in-flight mass invalidation may survive it.
    async fn delete_all_for_user(&self, user_id: Uuid) -> StoreResult<u64>;
}

/// Redis-backed session store
pub struct RedisSessionStore {
    pool: RedisPool,
}

impl RedisSessionStore {
    /// Create a new session store over a Redis pool
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    fn ttl_for(session: &Session) -> u64 {
        // TTL and expires_at derive from the same record so the store and
        // the payload cannot disagree on lifetime
        (session.expires_at - Utc::now()).num_seconds().max(1) as u64
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn create(&self, session: &Session) -> StoreResult<()> {
        info!(
            "Creating session {} for user {}",
            session.session_id, session.user_id
        );

        let payload = serde_json::to_string(session)?;
        self.pool
            .set(
                &session_key(session.session_id),
                &payload,
                Some(Self::ttl_for(session)),
            )
            .await
    }

    async fn get(&self, session_id: Uuid) -> StoreResult<Option<Session>> {
        match self.pool.get(&session_key(session_id)).await? {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn take(&self, session_id: Uuid) -> StoreResult<Option<Session>> {
        match self.pool.get_del(&session_key(session_id)).await? {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, session_id: Uuid) -> StoreResult<bool> {
        let removed = self.pool.delete(&[session_key(session_id)]).await?;
        Ok(removed > 0)
    }

    async fn exists_active(&self, session_id: Uuid) -> StoreResult<bool> {
        // Expiry is enforced by the key TTL; only the active flag needs
        // an explicit check
        Ok(self
            .get(session_id)
            .await?
            .map(|s| s.is_active)
            .unwrap_or(false))
    }

    async fn list_by_user(&self, user_id: Uuid) -> StoreResult<Vec<Session>> {
        // Naive full-keyspace scan filtered in application code. Fine at
        // small scale; a real deployment wants a per-user secondary index
        // so this becomes O(sessions-for-that-user).
        let pattern = format!("{}*", SESSION_KEY_PREFIX);
        let keys = self.pool.scan_keys(&pattern).await?;

        let mut sessions = Vec::new();
        for key in keys {
            if let Some(payload) = self.pool.get(&key).await? {
                let session: Session = serde_json::from_str(&payload)?;
                if session.user_id == user_id && session.is_active {
                    sessions.push(session);
                }
            }
        }

        Ok(sessions)
    }

    async fn delete_all_for_user(&self, user_id: Uuid) -> StoreResult<u64> {
        let keys: Vec<String> = self
            .list_by_user(user_id)
            .await?
            .iter()
            .map(|s| session_key(s.session_id))
            .collect();

        let removed = self.pool.delete(&keys).await?;
        info!("Deleted {} sessions for user {}", removed, user_id);
        Ok(removed)
    }
}

/// In-memory session store honoring record expiry
///
/// Backs the test suite and local runs; semantics match the Redis store,
/// including single-shot `take`.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    sessions: Arc<Mutex<HashMap<Uuid, Session>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, session: &Session) -> StoreResult<()> {
        let mut sessions = self.sessions.lock().await;
        sessions.insert(session.session_id, session.clone());
        Ok(())
    }

    async fn get(&self, session_id: Uuid) -> StoreResult<Option<Session>> {
        let sessions = self.sessions.lock().await;
        Ok(sessions
            .get(&session_id)
            .filter(|s| !s.is_expired())
            .cloned())
    }

    async fn take(&self, session_id: Uuid) -> StoreResult<Option<Session>> {
        let mut sessions = self.sessions.lock().await;
        Ok(sessions.remove(&session_id).filter(|s| !s.is_expired()))
    }

    async fn delete(&self, session_id: Uuid) -> StoreResult<bool> {
        let mut sessions = self.sessions.lock().await;
        Ok(sessions.remove(&session_id).is_some())
    }

    async fn exists_active(&self, session_id: Uuid) -> StoreResult<bool> {
        let sessions = self.sessions.lock().await;
        Ok(sessions
            .get(&session_id)
            .map(|s| s.is_active && !s.is_expired())
            .unwrap_or(false))
    }

    async fn list_by_user(&self, user_id: Uuid) -> StoreResult<Vec<Session>> {
        let sessions = self.sessions.lock().await;
        Ok(sessions
            .values()
            .filter(|s| s.user_id == user_id && s.is_active && !s.is_expired())
            .cloned()
            .collect())
    }

    async fn delete_all_for_user(&self, user_id: Uuid) -> StoreResult<u64> {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.user_id != user_id);
        Ok((before - sessions.len()) as u64)
    }
}
