//! Fire-and-forget audit event sink
//!
//! The orchestrator emits one event per security-relevant action. Sink
//! failures are caught at the call site and logged; they must never
//! abort or roll back the primary operation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

/// Security/audit actions, snake_case on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    UserRegistered,
    UserLogin,
    LoginFailed,
    UserLogout,
    TokenReuseDetected,
    AllSessionsInvalidated,
    PasswordChanged,
    PasswordResetRequested,
}

/// One audit event
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub action: AuditAction,
    /// `None` when the actor could not be identified (e.g. failed login)
    pub user_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub detail: Option<serde_json::Value>,
    pub at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(action: AuditAction, user_id: Option<Uuid>) -> Self {
        AuditEvent {
            action,
            user_id,
            ip_address: None,
            detail: None,
            at: Utc::now(),
        }
    }

    pub fn with_ip(mut self, ip_address: Option<String>) -> Self {
        self.ip_address = ip_address;
        self
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// Error raised by an audit sink; always swallowed by the caller
#[derive(Error, Debug)]
#[error("Audit sink error: {0}")]
pub struct AuditError(#[from] pub anyhow::Error);

/// Destination for audit events
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn log(&self, event: AuditEvent) -> Result<(), AuditError>;
}

/// Sink that emits audit events as structured log lines
///
/// Stands in until the audit pipeline consumes these; losing an event
/// degrades to a local log entry, never to a failed request.
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn log(&self, event: AuditEvent) -> Result<(), AuditError> {
        let payload =
            serde_json::to_string(&event).map_err(|e| AuditError(anyhow::Error::new(e)))?;
        info!(target: "audit", "{}", payload);
        Ok(())
    }
}

/// Sink that records events in memory, for assertions in tests
#[derive(Clone, Default)]
pub struct MemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything logged so far
    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().await.clone()
    }

    /// Actions logged so far, in order
    pub async fn actions(&self) -> Vec<AuditAction> {
        self.events.lock().await.iter().map(|e| e.action).collect()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn log(&self, event: AuditEvent) -> Result<(), AuditError> {
        self.events.lock().await.push(event);
        Ok(())
    }
}
