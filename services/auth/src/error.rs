//! Custom error types for the authentication core

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Error taxonomy for every authentication and authorization failure
///
/// Authentication/authorization failures are not transient; callers must
/// not retry them. `TokenReuseDetected` is the one variant whose error
/// path carries a mandatory side effect (full session invalidation for
/// the affected user), performed before the error is returned. Its HTTP
/// rendering is deliberately identical to `InvalidRefreshToken` so an
/// attacker gets no signal that containment fired.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Missing authentication token")]
    MissingToken,

    /// Bad signature, malformed payload, or expired token
    #[error("Invalid or expired token")]
    InvalidToken,

    /// The referenced session no longer exists in the store
    #[error("Session is no longer valid")]
    InvalidSession,

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    /// Refresh token replay observed; sessions already invalidated
    #[error("Invalid refresh token")]
    TokenReuseDetected,

    #[error("User not found")]
    UserNotFound,

    #[error("User account is deactivated")]
    UserInactive,

    /// Intentionally undifferentiated between unknown email and wrong password
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Insufficient role")]
    InsufficientRole,

    #[error("System roles cannot be modified")]
    CannotModifySystemRole,

    #[error("System roles cannot be deleted")]
    CannotDeleteSystemRole,

    #[error("Role is still assigned to users")]
    RoleInUse,

    #[error("A role with this id already exists")]
    RoleAlreadyExists,

    #[error("Role not found")]
    RoleNotFound,

    #[error("Email is already registered")]
    EmailInUse,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Session does not belong to this user")]
    NotSessionOwner,

    /// Input validation failure with a caller-facing message
    #[error("{0}")]
    Validation(String),

    /// Reserved for the external throttling layer
    #[error("Too many requests")]
    RateLimitExceeded,

    /// Internal failure; details are logged server-side, never surfaced
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "missing_token",
            AuthError::InvalidToken => "invalid_token",
            AuthError::InvalidSession => "invalid_session",
            // Reuse detection must be indistinguishable from an ordinary
            // invalid refresh token on the wire
            AuthError::InvalidRefreshToken | AuthError::TokenReuseDetected => {
                "invalid_refresh_token"
            }
            AuthError::UserNotFound => "user_not_found",
            AuthError::UserInactive => "user_inactive",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::InsufficientPermissions => "insufficient_permissions",
            AuthError::InsufficientRole => "insufficient_role",
            AuthError::CannotModifySystemRole => "cannot_modify_system_role",
            AuthError::CannotDeleteSystemRole => "cannot_delete_system_role",
            AuthError::RoleInUse => "role_in_use",
            AuthError::RoleAlreadyExists => "role_already_exists",
            AuthError::RoleNotFound => "role_not_found",
            AuthError::EmailInUse => "email_in_use",
            AuthError::SessionNotFound => "session_not_found",
            AuthError::NotSessionOwner => "not_session_owner",
            AuthError::Validation(_) => "validation_failed",
            AuthError::RateLimitExceeded => "rate_limit_exceeded",
            AuthError::Internal(_) => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AuthError::MissingToken
            | AuthError::InvalidToken
            | AuthError::InvalidSession
            | AuthError::InvalidRefreshToken
            | AuthError::TokenReuseDetected
            | AuthError::UserNotFound
            | AuthError::UserInactive
            | AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthError::InsufficientPermissions
            | AuthError::InsufficientRole
            | AuthError::CannotModifySystemRole
            | AuthError::CannotDeleteSystemRole
            | AuthError::NotSessionOwner => StatusCode::FORBIDDEN,
            AuthError::RoleInUse | AuthError::RoleAlreadyExists | AuthError::EmailInUse => {
                StatusCode::CONFLICT
            }
            AuthError::RoleNotFound | AuthError::SessionNotFound => StatusCode::NOT_FOUND,
            AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<common::error::StoreError> for AuthError {
    fn from(err: common::error::StoreError) -> Self {
        AuthError::Internal(err.into())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let AuthError::Internal(ref err) = self {
            error!("Internal error: {:#}", err);
        }

        let status = self.status();
        let body = Json(json!({
            "error": self.to_string(),
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}

/// Type alias for auth core results
pub type AuthResult<T> = Result<T, AuthError>;
