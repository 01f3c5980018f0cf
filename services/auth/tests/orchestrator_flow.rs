//! End-to-end flows through the auth orchestrator
//!
//! Drives login, refresh rotation, reuse detection and revocation against
//! the in-memory session store and identity provider, asserting the
//! security properties the core guarantees.

use std::sync::Arc;

use uuid::Uuid;

use auth::audit::{AuditAction, MemoryAuditSink};
use auth::error::AuthError;
use auth::identity::MemoryIdentityProvider;
use auth::middleware::{require_permissions, require_roles};
use auth::models::{Credentials, NewIdentity, NewRole};
use auth::orchestrator::{AuthOrchestrator, TokenPair};
use auth::session::{MemorySessionStore, SessionStore};
use auth::token::{TokenConfig, TokenService};

const PASSWORD: &str = "Sup3r$ecret1";

struct Harness {
    orchestrator: AuthOrchestrator,
    tokens: TokenService,
    sessions: MemorySessionStore,
    identity: Arc<MemoryIdentityProvider>,
    audit: MemoryAuditSink,
}

impl Harness {
    async fn new() -> Self {
        let tokens = TokenService::new(TokenConfig {
            access_secret: "test-access-secret".to_string(),
            refresh_secret: "test-refresh-secret".to_string(),
        });
        let sessions = MemorySessionStore::new();
        let identity = Arc::new(MemoryIdentityProvider::new());
        let audit = MemoryAuditSink::new();

        let orchestrator = AuthOrchestrator::new(
            tokens.clone(),
            Arc::new(sessions.clone()),
            identity.clone(),
            Arc::new(audit.clone()),
        );
        orchestrator.rbac().seed_system_roles().await.unwrap();

        Harness {
            orchestrator,
            tokens,
            sessions,
            identity,
            audit,
        }
    }

    async fn register(&self, email: &str) -> (Uuid, TokenPair) {
        let (user, pair) = self
            .orchestrator
            .register(
                NewIdentity {
                    email: email.to_string(),
                    password: PASSWORD.to_string(),
                    display_name: "Test User".to_string(),
                    phone: None,
                },
                Some("203.0.113.7".to_string()),
            )
            .await
            .unwrap();
        (user.uid, pair)
    }

    async fn login(&self, email: &str) -> TokenPair {
        let (_, pair) = self
            .orchestrator
            .login(
                Credentials {
                    email: email.to_string(),
                    password: PASSWORD.to_string(),
                },
                Some("203.0.113.7".to_string()),
                Some("integration-test".to_string()),
            )
            .await
            .unwrap();
        pair
    }

    fn bearer(pair: &TokenPair) -> String {
        format!("Bearer {}", pair.access_token)
    }
}

#[tokio::test]
async fn login_produces_authenticatable_session() {
    let h = Harness::new().await;
    let (uid, _) = h.register("alice@example.com").await;

    let pair = h.login("alice@example.com").await;
    let identity = h
        .orchestrator
        .authenticate(Some(&Harness::bearer(&pair)))
        .await
        .unwrap();

    assert_eq!(identity.user_id, uid);
    assert!(identity.roles.contains(&"user".to_string()));
    assert!(identity.permissions.contains(&"job:apply".to_string()));
    assert_eq!(pair.token_type, "Bearer");
    assert_eq!(pair.expires_in, 15 * 60);
}

#[tokio::test]
async fn authenticate_rejects_garbage_and_missing_tokens() {
    let h = Harness::new().await;

    assert!(matches!(
        h.orchestrator.authenticate(None).await,
        Err(AuthError::MissingToken)
    ));
    assert!(matches!(
        h.orchestrator.authenticate(Some("Basic abc")).await,
        Err(AuthError::MissingToken)
    ));
    assert!(matches!(
        h.orchestrator.authenticate(Some("Bearer not.a.jwt")).await,
        Err(AuthError::InvalidToken)
    ));
}

#[tokio::test]
async fn login_failures_are_undifferentiated() {
    let h = Harness::new().await;
    h.register("bob@example.com").await;

    let wrong_password = h
        .orchestrator
        .login(
            Credentials {
                email: "bob@example.com".to_string(),
                password: "Wrong$ecret1".to_string(),
            },
            None,
            None,
        )
        .await
        .unwrap_err();
    let unknown_email = h
        .orchestrator
        .login(
            Credentials {
                email: "nobody@example.com".to_string(),
                password: PASSWORD.to_string(),
            },
            None,
            None,
        )
        .await
        .unwrap_err();

    assert!(matches!(wrong_password, AuthError::InvalidCredentials));
    assert!(matches!(unknown_email, AuthError::InvalidCredentials));

    let failures: Vec<_> = h
        .audit
        .events()
        .await
        .into_iter()
        .filter(|e| e.action == AuditAction::LoginFailed)
        .collect();
    assert_eq!(failures.len(), 2);
    assert!(failures.iter().all(|e| e.user_id.is_none()));
}

#[tokio::test]
async fn inactive_user_cannot_login_or_authenticate() {
    let h = Harness::new().await;
    let (uid, pair) = h.register("carol@example.com").await;

    h.identity.set_active(uid, false).await.unwrap();

    assert!(matches!(
        h.orchestrator
            .authenticate(Some(&Harness::bearer(&pair)))
            .await,
        Err(AuthError::UserInactive)
    ));
    assert!(matches!(
        h.orchestrator
            .login(
                Credentials {
                    email: "carol@example.com".to_string(),
                    password: PASSWORD.to_string(),
                },
                None,
                None,
            )
            .await,
        Err(AuthError::InvalidCredentials)
    ));
}

#[tokio::test]
async fn refresh_rotates_and_old_tokens_die() {
    let h = Harness::new().await;
    h.register("dave@example.com").await;
    let pair1 = h.login("dave@example.com").await;

    let pair2 = h.orchestrator.refresh(&pair1.refresh_token, None).await.unwrap();

    // The new pair works end to end
    h.orchestrator
        .authenticate(Some(&Harness::bearer(&pair2)))
        .await
        .unwrap();

    // The rotated-out refresh token is permanently unusable
    assert!(matches!(
        h.orchestrator.refresh(&pair1.refresh_token, None).await,
        Err(AuthError::InvalidRefreshToken)
    ));

    // The old access token fails the session-liveness check
    assert!(matches!(
        h.orchestrator
            .authenticate(Some(&Harness::bearer(&pair1)))
            .await,
        Err(AuthError::InvalidSession)
    ));

    // Rotation preserves the token family
    let old = h.tokens.verify_refresh(&pair1.refresh_token).unwrap();
    let new = h.tokens.verify_refresh(&pair2.refresh_token).unwrap();
    assert_eq!(old.token_family, new.token_family);
    assert_ne!(old.session_id, new.session_id);
}

#[tokio::test]
async fn token_family_mismatch_triggers_blast_radius_containment() {
    let h = Harness::new().await;
    let (uid, _) = h.register("eve@example.com").await;
    let stolen = h.login("eve@example.com").await;
    let other = h.login("eve@example.com").await;

    // Simulate theft: the stored session now belongs to a different
    // token family than the one the stolen refresh token carries
    let claims = h.tokens.verify_refresh(&stolen.refresh_token).unwrap();
    let mut session = h.sessions.get(claims.session_id).await.unwrap().unwrap();
    session.token_family = Uuid::new_v4();
    h.sessions.create(&session).await.unwrap();

    let err = h
        .orchestrator
        .refresh(&stolen.refresh_token, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TokenReuseDetected));

    // Containment: every session for the user is gone, including ones
    // the attacker never touched
    assert_eq!(h.sessions.list_by_user(uid).await.unwrap().len(), 0);
    assert!(matches!(
        h.orchestrator
            .authenticate(Some(&Harness::bearer(&other)))
            .await,
        Err(AuthError::InvalidSession)
    ));

    let actions = h.audit.actions().await;
    assert!(actions.contains(&AuditAction::TokenReuseDetected));

    // The wire rendering gives the attacker no containment signal
    assert_eq!(
        AuthError::TokenReuseDetected.code(),
        AuthError::InvalidRefreshToken.code()
    );
}

#[tokio::test]
async fn logout_and_logout_all() {
    let h = Harness::new().await;
    let (uid, _) = h.register("frank@example.com").await;
    let pair1 = h.login("frank@example.com").await;
    let pair2 = h.login("frank@example.com").await;
    let pair3 = h.login("frank@example.com").await;

    let identity = h
        .orchestrator
        .authenticate(Some(&Harness::bearer(&pair1)))
        .await
        .unwrap();
    h.orchestrator
        .logout(identity.session_id, identity.user_id)
        .await
        .unwrap();

    assert!(matches!(
        h.orchestrator
            .authenticate(Some(&Harness::bearer(&pair1)))
            .await,
        Err(AuthError::InvalidSession)
    ));
    // Other sessions are untouched by a single logout
    h.orchestrator
        .authenticate(Some(&Harness::bearer(&pair2)))
        .await
        .unwrap();

    // Registration opened one session too
    let removed = h.orchestrator.invalidate_all_user_sessions(uid).await.unwrap();
    assert_eq!(removed, 3);
    assert!(matches!(
        h.orchestrator
            .authenticate(Some(&Harness::bearer(&pair3)))
            .await,
        Err(AuthError::InvalidSession)
    ));
}

#[tokio::test]
async fn session_listing_and_owner_checked_revocation() {
    let h = Harness::new().await;
    let (uid_a, pair_a) = h.register("gina@example.com").await;
    let (uid_b, _) = h.register("hank@example.com").await;

    let listed = h.orchestrator.list_sessions(uid_a).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].ip_address.as_deref(), Some("203.0.113.7"));

    let session_id = listed[0].session_id;

    assert!(matches!(
        h.orchestrator.revoke_session(session_id, uid_b).await,
        Err(AuthError::NotSessionOwner)
    ));
    assert!(matches!(
        h.orchestrator.revoke_session(Uuid::new_v4(), uid_a).await,
        Err(AuthError::SessionNotFound)
    ));

    h.orchestrator.revoke_session(session_id, uid_a).await.unwrap();
    assert!(matches!(
        h.orchestrator
            .authenticate(Some(&Harness::bearer(&pair_a)))
            .await,
        Err(AuthError::InvalidSession)
    ));
}

#[tokio::test]
async fn change_password_invalidates_every_session() {
    let h = Harness::new().await;
    let (uid, pair1) = h.register("iris@example.com").await;
    let pair2 = h.login("iris@example.com").await;

    // Wrong current password: nothing is invalidated
    let err = h
        .orchestrator
        .change_password(uid, "Wrong$ecret1", "Fresh$ecret2")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Validation(_)));
    h.orchestrator
        .authenticate(Some(&Harness::bearer(&pair1)))
        .await
        .unwrap();

    h.orchestrator
        .change_password(uid, PASSWORD, "Fresh$ecret2")
        .await
        .unwrap();

    for pair in [&pair1, &pair2] {
        assert!(matches!(
            h.orchestrator
                .authenticate(Some(&Harness::bearer(pair)))
                .await,
            Err(AuthError::InvalidSession)
        ));
    }

    let actions = h.audit.actions().await;
    assert!(actions.contains(&AuditAction::AllSessionsInvalidated));
    assert!(actions.contains(&AuditAction::PasswordChanged));
}

#[tokio::test]
async fn password_reset_is_uninformative() {
    let h = Harness::new().await;
    h.register("judy@example.com").await;

    h.orchestrator
        .request_password_reset("judy@example.com")
        .await
        .unwrap();
    h.orchestrator
        .request_password_reset("ghost@example.com")
        .await
        .unwrap();

    let resets: Vec<_> = h
        .audit
        .events()
        .await
        .into_iter()
        .filter(|e| e.action == AuditAction::PasswordResetRequested)
        .collect();
    assert_eq!(resets.len(), 2);
    assert!(resets.iter().all(|e| e.user_id.is_none()));
}

#[tokio::test]
async fn permission_gating_follows_and_semantics() {
    let h = Harness::new().await;
    let (uid, _) = h.register("kate@example.com").await;

    let role = h
        .orchestrator
        .rbac()
        .create_role(NewRole {
            name: "support_admin".to_string(),
            description: None,
            permissions: vec!["admin:read".to_string(), "admin:write".to_string()],
        })
        .await
        .unwrap();
    h.orchestrator.rbac().assign_role(uid, &role.id).await.unwrap();

    let pair = h.login("kate@example.com").await;
    let identity = h
        .orchestrator
        .authenticate(Some(&Harness::bearer(&pair)))
        .await
        .unwrap();

    assert!(require_permissions(&identity, &["admin:read"]).is_ok());
    assert!(require_permissions(&identity, &["admin:read", "admin:write"]).is_ok());
    assert!(matches!(
        require_permissions(&identity, &["admin:read", "admin:delete"]),
        Err(AuthError::InsufficientPermissions)
    ));

    assert!(require_roles(&identity, &["support_admin", "admin"]).is_ok());
    assert!(matches!(
        require_roles(&identity, &["admin"]),
        Err(AuthError::InsufficientRole)
    ));
}

#[tokio::test]
async fn registration_rejects_bad_input_and_duplicates() {
    let h = Harness::new().await;

    let err = h
        .orchestrator
        .register(
            NewIdentity {
                email: "not-an-email".to_string(),
                password: PASSWORD.to_string(),
                display_name: "X".to_string(),
                phone: None,
            },
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Validation(_)));

    h.register("leo@example.com").await;
    let err = h
        .orchestrator
        .register(
            NewIdentity {
                email: "leo@example.com".to_string(),
                password: PASSWORD.to_string(),
                display_name: "Leo Again".to_string(),
                phone: None,
            },
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::EmailInUse));
}
