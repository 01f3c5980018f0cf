//! Middleware for bearer-token authentication and authorization
//!
//! The authentication layer runs the full chain (token signature →
//! session liveness → user liveness) and attaches the resulting identity
//! to request extensions. The authorization helpers are pure predicate
//! checks with no further I/O.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::AppState;
use crate::error::{AuthError, AuthResult};
use crate::orchestrator::{AuthIdentity, AuthOrchestrator};

/// Authenticate the request and attach an [`AuthIdentity`] to it
///
/// A dropped (cancelled) request never attaches anything: the chain
/// fails closed.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let bearer = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok());

    let identity = state.orchestrator.authenticate(bearer).await?;
    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}

/// Require every listed permission (AND semantics)
pub fn require_permissions(identity: &AuthIdentity, required: &[&str]) -> AuthResult<()> {
    AuthOrchestrator::authorize_permissions(identity, required)
}

/// Require at least one listed role (OR semantics)
pub fn require_roles(identity: &AuthIdentity, required: &[&str]) -> AuthResult<()> {
    AuthOrchestrator::authorize_roles(identity, required)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn identity(roles: &[&str], permissions: &[&str]) -> AuthIdentity {
        AuthIdentity {
            user_id: Uuid::new_v4(),
            email: "admin@example.com".to_string(),
            session_id: Uuid::new_v4(),
            roles: roles.iter().map(|s| s.to_string()).collect(),
            permissions: permissions.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn permission_check_is_all_of() {
        let id = identity(&["admin"], &["admin:read", "admin:write"]);

        assert!(require_permissions(&id, &["admin:read"]).is_ok());
        assert!(matches!(
            require_permissions(&id, &["admin:read", "admin:delete"]),
            Err(AuthError::InsufficientPermissions)
        ));
    }

    #[test]
    fn role_check_is_any_of() {
        let id = identity(&["moderator"], &[]);

        assert!(require_roles(&id, &["admin", "moderator"]).is_ok());
        assert!(matches!(
            require_roles(&id, &["admin"]),
            Err(AuthError::InsufficientRole)
        ));
    }
}
