//! Worklane authentication core
//!
//! Password-based login and registration, short-lived access tokens
//! paired with long-lived rotating refresh tokens, a shared session
//! store with token-reuse detection, and a role-based permission engine
//! gating every protected request. The identity store and the audit
//! pipeline are external collaborators reached through traits.

use std::sync::Arc;

pub mod audit;
pub mod error;
pub mod identity;
pub mod middleware;
pub mod models;
pub mod orchestrator;
pub mod rbac;
pub mod routes;
pub mod session;
pub mod token;
pub mod validation;

use crate::orchestrator::AuthOrchestrator;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<AuthOrchestrator>,
}
