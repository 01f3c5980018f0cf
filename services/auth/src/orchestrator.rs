//! Auth orchestrator: the state machine tying the leaves together
//!
//! A login session moves Issued → Active → Refreshed → Revoked, with no
//! path back from Revoked. The orchestrator is the only component that
//! mutates the session store and the only one that emits audit events;
//! every flow here either completes or fails closed.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{AuditAction, AuditEvent, AuditSink};
use crate::error::{AuthError, AuthResult};
use crate::identity::{IdentityError, IdentityProvider};
use crate::models::{AuthUser, Credentials, NewIdentity, Session, SessionSummary, UserSummary};
use crate::rbac::{DEFAULT_ROLE_ID, RbacEngine};
use crate::session::SessionStore;
use crate::token::{ACCESS_TOKEN_TTL_SECS, REFRESH_TOKEN_TTL_SECS, TokenService};
use crate::validation;

/// Token pair handed to a freshly authenticated client
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
}

/// Identity attached to a request after a successful authenticate chain
#[derive(Debug, Clone)]
pub struct AuthIdentity {
    pub user_id: Uuid,
    pub email: String,
    pub session_id: Uuid,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

/// Orchestrates login, registration, refresh, logout and the
/// request-time authentication chain
pub struct AuthOrchestrator {
    tokens: TokenService,
    sessions: Arc<dyn SessionStore>,
    identity: Arc<dyn IdentityProvider>,
    audit_sink: Arc<dyn AuditSink>,
    rbac: RbacEngine,
}

impl AuthOrchestrator {
    pub fn new(
        tokens: TokenService,
        sessions: Arc<dyn SessionStore>,
        identity: Arc<dyn IdentityProvider>,
        audit_sink: Arc<dyn AuditSink>,
    ) -> Self {
        let rbac = RbacEngine::new(identity.clone());
        Self {
            tokens,
            sessions,
            identity,
            audit_sink,
            rbac,
        }
    }

    /// The RBAC engine sharing this orchestrator's identity provider
    pub fn rbac(&self) -> &RbacEngine {
        &self.rbac
    }

    /// Emit an audit event, swallowing sink failures
    ///
    /// An audit write must never abort or roll back the operation that
    /// produced it.
    async fn emit(&self, event: AuditEvent) {
        if let Err(err) = self.audit_sink.log(event).await {
            warn!("Audit write failed (continuing): {}", err);
        }
    }

    /// Register a new account and log it in
    ///
    /// Failure at identity creation aborts the whole operation; no
    /// session is left behind.
    pub async fn register(
        &self,
        data: NewIdentity,
        ip_address: Option<String>,
    ) -> AuthResult<(UserSummary, TokenPair)> {
        validation::validate_registration(&data).map_err(AuthError::Validation)?;

        let user = match self.identity.create_identity(data).await {
            Ok(user) => user,
            Err(IdentityError::EmailInUse) => return Err(AuthError::EmailInUse),
            Err(err) => return Err(AuthError::Internal(err.into())),
        };

        let user = self.rbac.assign_role(user.uid, DEFAULT_ROLE_ID).await?;

        let pair = self
            .issue_token_pair(&user, None, ip_address.clone(), None)
            .await?;

        self.emit(
            AuditEvent::new(AuditAction::UserRegistered, Some(user.uid)).with_ip(ip_address),
        )
        .await;
        info!("Registered user {}", user.uid);

        Ok((UserSummary::from(&user), pair))
    }

    /// Authenticate credentials and open a new session
    ///
    /// Unknown email, wrong password and deactivated account all fail
    /// with the same `InvalidCredentials`, defending against enumeration.
    pub async fn login(
        &self,
        credentials: Credentials,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> AuthResult<(UserSummary, TokenPair)> {
        let verified = self
            .identity
            .verify_credentials(&credentials.email, &credentials.password)
            .await
            .map_err(|err| AuthError::Internal(err.into()))?;

        let user = match verified {
            Some(user) if user.is_active => user,
            _ => {
                self.emit(
                    AuditEvent::new(AuditAction::LoginFailed, None)
                        .with_ip(ip_address)
                        .with_detail(json!({ "email": credentials.email })),
                )
                .await;
                return Err(AuthError::InvalidCredentials);
            }
        };

        self.identity
            .record_login(user.uid, chrono::Utc::now())
            .await
            .map_err(|err| AuthError::Internal(err.into()))?;

        let pair = self
            .issue_token_pair(&user, None, ip_address.clone(), user_agent)
            .await?;

        self.emit(AuditEvent::new(AuditAction::UserLogin, Some(user.uid)).with_ip(ip_address))
            .await;
        info!("User {} logged in", user.uid);

        Ok((UserSummary::from(&user), pair))
    }

    /// Persist a new session and sign both tokens against it
    ///
    /// A fresh `session_id` is generated every time; `token_family` is
    /// fresh on login/registration and inherited across refreshes.
    pub async fn issue_token_pair(
        &self,
        user: &AuthUser,
        token_family: Option<Uuid>,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> AuthResult<TokenPair> {
        let family = token_family.unwrap_or_else(Uuid::new_v4);
        let session = Session::new(
            user.uid,
            family,
            ip_address,
            user_agent,
            REFRESH_TOKEN_TTL_SECS,
        );
        self.sessions.create(&session).await?;

        let access_token = self
            .tokens
            .issue_access_token(user, session.session_id)
            .map_err(AuthError::Internal)?;
        let refresh_token = self
            .tokens
            .issue_refresh_token(user.uid, session.session_id, family)
            .map_err(AuthError::Internal)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: ACCESS_TOKEN_TTL_SECS,
        })
    }

    /// Rotate a refresh token, enforcing the reuse-detection protocol
    ///
    /// The stored session is consumed atomically, so of two racing
    /// refresh calls with the same token at most one can succeed. A
    /// session whose stored family disagrees with the token's is treated
    /// as evidence of theft: every session for the user is deleted before
    /// the (deliberately ordinary-looking) error goes back to the caller.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        ip_address: Option<String>,
    ) -> AuthResult<TokenPair> {
        let claims = self.tokens.verify_refresh(refresh_token)?;

        let Some(session) = self.sessions.take(claims.session_id).await? else {
            return Err(AuthError::InvalidRefreshToken);
        };

        if session.user_id != claims.uid {
            return Err(AuthError::InvalidRefreshToken);
        }

        if session.token_family != claims.token_family {
            let removed = self.sessions.delete_all_for_user(session.user_id).await?;
            warn!(
                "Refresh token reuse detected for user {}; invalidated {} sessions",
                session.user_id, removed
            );
            self.emit(
                AuditEvent::new(AuditAction::TokenReuseDetected, Some(session.user_id))
                    .with_ip(ip_address)
                    .with_detail(json!({ "sessionsInvalidated": removed })),
            )
            .await;
            return Err(AuthError::TokenReuseDetected);
        }

        let user = self
            .identity
            .find_by_id(claims.uid)
            .await
            .map_err(|err| AuthError::Internal(err.into()))?;
        let user = match user {
            Some(user) if user.is_active => user,
            // Uninformative on purpose: a refresh caller learns nothing
            // about account state
            _ => return Err(AuthError::InvalidRefreshToken),
        };

        // Old record is already gone; the new session continues the family
        self.issue_token_pair(
            &user,
            Some(session.token_family),
            ip_address,
            session.user_agent,
        )
        .await
    }

    /// End one session
    pub async fn logout(&self, session_id: Uuid, user_id: Uuid) -> AuthResult<()> {
        self.sessions.delete(session_id).await?;
        self.emit(AuditEvent::new(AuditAction::UserLogout, Some(user_id)))
            .await;
        info!("User {} logged out of session {}", user_id, session_id);
        Ok(())
    }

    /// Revoke one of the user's own sessions
    pub async fn revoke_session(&self, session_id: Uuid, user_id: Uuid) -> AuthResult<()> {
        let session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or(AuthError::SessionNotFound)?;

        if session.user_id != user_id {
            return Err(AuthError::NotSessionOwner);
        }

        self.sessions.delete(session_id).await?;
        self.emit(
            AuditEvent::new(AuditAction::UserLogout, Some(user_id))
                .with_detail(json!({ "revokedSessionId": session_id })),
        )
        .await;
        Ok(())
    }

    /// Delete every session for a user, returning the count removed
    pub async fn invalidate_all_user_sessions(&self, user_id: Uuid) -> AuthResult<u64> {
        let removed = self.sessions.delete_all_for_user(user_id).await?;
        self.emit(
            AuditEvent::new(AuditAction::AllSessionsInvalidated, Some(user_id))
                .with_detail(json!({ "sessionsInvalidated": removed })),
        )
        .await;
        info!("Invalidated {} sessions for user {}", removed, user_id);
        Ok(removed)
    }

    /// Change the credential and force re-login everywhere
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        validation::validate_password(new_password).map_err(AuthError::Validation)?;

        match self
            .identity
            .change_password(user_id, current_password, new_password)
            .await
        {
            Ok(()) => {}
            Err(IdentityError::WrongPassword) => {
                return Err(AuthError::Validation(
                    "Current password is incorrect".to_string(),
                ));
            }
            Err(IdentityError::NotFound) => return Err(AuthError::UserNotFound),
            Err(err) => return Err(AuthError::Internal(err.into())),
        }

        self.invalidate_all_user_sessions(user_id).await?;
        self.emit(AuditEvent::new(AuditAction::PasswordChanged, Some(user_id)))
            .await;
        Ok(())
    }

    /// Kick off a password reset without revealing account existence
    ///
    /// Always acknowledges and always audits, whether or not the email
    /// maps to an account.
    pub async fn request_password_reset(&self, email: &str) -> AuthResult<()> {
        if let Err(err) = self.identity.begin_password_reset(email).await {
            // Still an opaque ack to the caller
            warn!("Password reset initiation failed: {}", err);
        }

        self.emit(
            AuditEvent::new(AuditAction::PasswordResetRequested, None)
                .with_detail(json!({ "email": email })),
        )
        .await;
        Ok(())
    }

    /// All active sessions for a user
    pub async fn list_sessions(&self, user_id: Uuid) -> AuthResult<Vec<SessionSummary>> {
        let sessions = self.sessions.list_by_user(user_id).await?;
        Ok(sessions.iter().map(SessionSummary::from).collect())
    }

    /// Request-time authentication chain
    ///
    /// Bearer extraction → signature/expiry → session liveness → user
    /// liveness. Each link fails closed; nothing is attached to the
    /// request until the whole chain succeeds.
    pub async fn authenticate(&self, bearer: Option<&str>) -> AuthResult<AuthIdentity> {
        let token = bearer
            .and_then(|h| h.strip_prefix("Bearer "))
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;

        let claims = self.tokens.verify_access(token)?;

        if !self.sessions.exists_active(claims.session_id).await? {
            return Err(AuthError::InvalidSession);
        }

        let user = self
            .identity
            .find_by_id(claims.uid)
            .await
            .map_err(|err| AuthError::Internal(err.into()))?
            .ok_or(AuthError::UserNotFound)?;

        if !user.is_active {
            return Err(AuthError::UserInactive);
        }

        // Roles and permissions come from the current user record, so a
        // role cascade takes effect without waiting for token expiry
        Ok(AuthIdentity {
            user_id: user.uid,
            email: user.email.clone(),
            session_id: claims.session_id,
            roles: user.role_names(),
            permissions: user.permissions,
        })
    }

    /// Pure authorization predicate over permissions (AND semantics)
    pub fn authorize_permissions(
        identity: &AuthIdentity,
        required: &[&str],
    ) -> AuthResult<()> {
        if RbacEngine::has_permission(&identity.permissions, required) {
            Ok(())
        } else {
            Err(AuthError::InsufficientPermissions)
        }
    }

    /// Pure authorization predicate over roles (OR semantics)
    pub fn authorize_roles(identity: &AuthIdentity, required: &[&str]) -> AuthResult<()> {
        if RbacEngine::has_role(&identity.roles, required) {
            Ok(())
        } else {
            Err(AuthError::InsufficientRole)
        }
    }
}
