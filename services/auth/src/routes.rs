//! Authentication service routes
//!
//! Thin HTTP glue: every handler delegates to the orchestrator and maps
//! its result through the shared error taxonomy.

use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;
use crate::error::AuthError;
use crate::middleware::auth_middleware;
use crate::models::{Credentials, NewIdentity, UserSummary};
use crate::orchestrator::{AuthIdentity, TokenPair};

/// Request for user registration
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub display_name: String,
    pub phone: Option<String>,
}

/// Request for user login
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request for token refresh
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

/// Request for password change
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Request for password reset initiation
#[derive(Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

/// Response carrying a user summary and a fresh token pair
#[derive(Serialize)]
pub struct AuthResponse {
    pub user: UserSummary,
    pub tokens: TokenPair,
}

/// Create the router for the authentication service
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/auth/logout", post(logout))
        .route("/auth/logout-all", post(logout_all))
        .route("/auth/sessions", get(list_sessions))
        .route("/auth/sessions/:session_id", delete(revoke_session))
        .route("/auth/change-password", post(change_password))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh_token))
        .route("/auth/password-reset", post(request_password_reset))
        .merge(protected)
        .with_state(state)
}

/// First client address from X-Forwarded-For, if present
fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .map(|ua| ua.to_string())
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "auth-service"
    }))
}

/// User registration endpoint
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let data = NewIdentity {
        email: payload.email,
        password: payload.password,
        display_name: payload.display_name,
        phone: payload.phone,
    };

    let (user, tokens) = state
        .orchestrator
        .register(data, client_ip(&headers))
        .await?;

    Ok((StatusCode::CREATED, Json(AuthResponse { user, tokens })))
}

/// User login endpoint
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let credentials = Credentials {
        email: payload.email,
        password: payload.password,
    };

    let (user, tokens) = state
        .orchestrator
        .login(credentials, client_ip(&headers), user_agent(&headers))
        .await?;

    Ok((StatusCode::OK, Json(AuthResponse { user, tokens })))
}

/// Refresh token endpoint
pub async fn refresh_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RefreshTokenRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let tokens = state
        .orchestrator
        .refresh(&payload.refresh_token, client_ip(&headers))
        .await?;

    Ok((StatusCode::OK, Json(tokens)))
}

/// Logout endpoint: ends the calling session
pub async fn logout(
    State(state): State<AppState>,
    Extension(identity): Extension<AuthIdentity>,
) -> Result<impl IntoResponse, AuthError> {
    state
        .orchestrator
        .logout(identity.session_id, identity.user_id)
        .await?;

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({"message": "Logged out successfully"})),
    ))
}

/// Logout-all endpoint: ends every session for the calling user
pub async fn logout_all(
    State(state): State<AppState>,
    Extension(identity): Extension<AuthIdentity>,
) -> Result<impl IntoResponse, AuthError> {
    let invalidated = state
        .orchestrator
        .invalidate_all_user_sessions(identity.user_id)
        .await?;

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "invalidated": invalidated })),
    ))
}

/// List the calling user's active sessions
pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(identity): Extension<AuthIdentity>,
) -> Result<impl IntoResponse, AuthError> {
    let sessions = state.orchestrator.list_sessions(identity.user_id).await?;
    Ok((StatusCode::OK, Json(sessions)))
}

/// Revoke one of the calling user's sessions
pub async fn revoke_session(
    State(state): State<AppState>,
    Extension(identity): Extension<AuthIdentity>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, AuthError> {
    state
        .orchestrator
        .revoke_session(session_id, identity.user_id)
        .await?;

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({"message": "Session revoked"})),
    ))
}

/// Change password; invalidates every session on success
pub async fn change_password(
    State(state): State<AppState>,
    Extension(identity): Extension<AuthIdentity>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AuthError> {
    state
        .orchestrator
        .change_password(
            identity.user_id,
            &payload.current_password,
            &payload.new_password,
        )
        .await?;

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({"message": "Password changed; please log in again"})),
    ))
}

/// Password reset endpoint; the response never reveals whether the
/// account exists
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<PasswordResetRequest>,
) -> Result<impl IntoResponse, AuthError> {
    state
        .orchestrator
        .request_password_reset(&payload.email)
        .await?;

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "message": "If the account exists, a reset link has been sent"
        })),
    ))
}
