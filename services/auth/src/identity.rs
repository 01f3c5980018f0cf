//! Identity provider seam
//!
//! User records, credential verification and role documents live with the
//! identity service; the auth core reaches them only through this trait.
//! The in-memory implementation backs local runs and the test suite.

use std::collections::HashMap;
use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{AuthUser, NewIdentity, Role};

/// Errors surfaced by an identity provider
#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Email is already registered")]
    EmailInUse,

    #[error("Current password is incorrect")]
    WrongPassword,

    #[error("User not found")]
    NotFound,

    #[error("Identity backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// External owner of user records, credentials and role documents
///
/// The core treats user data as read-mostly: it writes back only login
/// metadata and role grants. `set_user_grants` replaces a user's embedded
/// roles and flattened permission set in one call; re-running a grant
/// update is idempotent, which is how a partially applied role cascade
/// gets repaired.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create a new identity; fails with `EmailInUse` on a duplicate email
    async fn create_identity(&self, new: NewIdentity) -> Result<AuthUser, IdentityError>;

    async fn find_by_id(&self, uid: Uuid) -> Result<Option<AuthUser>, IdentityError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<AuthUser>, IdentityError>;

    /// Verify credentials; `None` for unknown email and wrong password
    /// alike, so callers cannot distinguish the two
    async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<AuthUser>, IdentityError>;

    /// Record a successful login timestamp
    async fn record_login(&self, uid: Uuid, at: DateTime<Utc>) -> Result<(), IdentityError>;

    /// Replace the credential after verifying the current one
    async fn change_password(
        &self,
        uid: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), IdentityError>;

    /// Generate a password-reset artifact if the email is known; silent
    /// no-op otherwise
    async fn begin_password_reset(&self, email: &str) -> Result<(), IdentityError>;

    async fn find_role(&self, role_id: &str) -> Result<Option<Role>, IdentityError>;

    async fn list_roles(&self) -> Result<Vec<Role>, IdentityError>;

    async fn insert_role(&self, role: &Role) -> Result<(), IdentityError>;

    async fn update_role(&self, role: &Role) -> Result<(), IdentityError>;

    async fn delete_role(&self, role_id: &str) -> Result<(), IdentityError>;

    /// Every user currently holding the role
    async fn users_with_role(&self, role_id: &str) -> Result<Vec<AuthUser>, IdentityError>;

    async fn count_users_with_role(&self, role_id: &str) -> Result<u64, IdentityError>;

    /// Replace a user's role list and flattened permission set
    async fn set_user_grants(
        &self,
        uid: Uuid,
        roles: &[Role],
        permissions: &[String],
    ) -> Result<(), IdentityError>;
}

struct StoredUser {
    user: AuthUser,
    password_hash: String,
}

/// In-memory identity provider with argon2-hashed credentials
#[derive(Clone, Default)]
pub struct MemoryIdentityProvider {
    users: Arc<Mutex<HashMap<Uuid, StoredUser>>>,
    roles: Arc<Mutex<HashMap<String, Role>>>,
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn hash_password(password: &str) -> Result<String, IdentityError> {
        let salt = SaltString::generate(&mut rand::thread_rng());
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
            .to_string();
        Ok(hash)
    }

    fn verify_hash(hash: &str, password: &str) -> Result<bool, IdentityError> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| anyhow::anyhow!("Failed to parse password hash: {}", e))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }

    /// Flip a user's active flag; deactivated users fail authentication
    pub async fn set_active(&self, uid: Uuid, is_active: bool) -> Result<(), IdentityError> {
        let mut users = self.users.lock().await;
        let stored = users.get_mut(&uid).ok_or(IdentityError::NotFound)?;
        stored.user.is_active = is_active;
        stored.user.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn create_identity(&self, new: NewIdentity) -> Result<AuthUser, IdentityError> {
        let mut users = self.users.lock().await;

        let email = new.email.to_lowercase();
        if users
            .values()
            .any(|stored| stored.user.email.eq_ignore_ascii_case(&email))
        {
            return Err(IdentityError::EmailInUse);
        }

        let password_hash = Self::hash_password(&new.password)?;
        let now = Utc::now();
        let user = AuthUser {
            uid: Uuid::new_v4(),
            email,
            display_name: new.display_name,
            phone: new.phone,
            roles: vec![],
            permissions: vec![],
            is_active: true,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };

        info!("Created identity {} ({})", user.uid, user.email);
        users.insert(
            user.uid,
            StoredUser {
                user: user.clone(),
                password_hash,
            },
        );
        Ok(user)
    }

    async fn find_by_id(&self, uid: Uuid) -> Result<Option<AuthUser>, IdentityError> {
        let users = self.users.lock().await;
        Ok(users.get(&uid).map(|stored| stored.user.clone()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<AuthUser>, IdentityError> {
        let users = self.users.lock().await;
        Ok(users
            .values()
            .find(|stored| stored.user.email.eq_ignore_ascii_case(email))
            .map(|stored| stored.user.clone()))
    }

    async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<AuthUser>, IdentityError> {
        let users = self.users.lock().await;

        let Some(stored) = users
            .values()
            .find(|stored| stored.user.email.eq_ignore_ascii_case(email))
        else {
            return Ok(None);
        };

        if Self::verify_hash(&stored.password_hash, password)? {
            Ok(Some(stored.user.clone()))
        } else {
            Ok(None)
        }
    }

    async fn record_login(&self, uid: Uuid, at: DateTime<Utc>) -> Result<(), IdentityError> {
        let mut users = self.users.lock().await;
        let stored = users.get_mut(&uid).ok_or(IdentityError::NotFound)?;
        stored.user.last_login_at = Some(at);
        stored.user.updated_at = at;
        Ok(())
    }

    async fn change_password(
        &self,
        uid: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), IdentityError> {
        let mut users = self.users.lock().await;
        let stored = users.get_mut(&uid).ok_or(IdentityError::NotFound)?;

        if !Self::verify_hash(&stored.password_hash, current_password)? {
            return Err(IdentityError::WrongPassword);
        }

        stored.password_hash = Self::hash_password(new_password)?;
        stored.user.updated_at = Utc::now();
        Ok(())
    }

    async fn begin_password_reset(&self, email: &str) -> Result<(), IdentityError> {
        let users = self.users.lock().await;
        if users
            .values()
            .any(|stored| stored.user.email.eq_ignore_ascii_case(email))
        {
            // A real provider sends this artifact out of band
            let reset_token = Uuid::new_v4();
            debug!("Issued password reset token {}", reset_token);
        }
        Ok(())
    }

    async fn find_role(&self, role_id: &str) -> Result<Option<Role>, IdentityError> {
        let roles = self.roles.lock().await;
        Ok(roles.get(role_id).cloned())
    }

    async fn list_roles(&self) -> Result<Vec<Role>, IdentityError> {
        let roles = self.roles.lock().await;
        Ok(roles.values().cloned().collect())
    }

    async fn insert_role(&self, role: &Role) -> Result<(), IdentityError> {
        let mut roles = self.roles.lock().await;
        roles.insert(role.id.clone(), role.clone());
        Ok(())
    }

    async fn update_role(&self, role: &Role) -> Result<(), IdentityError> {
        let mut roles = self.roles.lock().await;
        if !roles.contains_key(&role.id) {
            return Err(IdentityError::NotFound);
        }
        roles.insert(role.id.clone(), role.clone());
        Ok(())
    }

    async fn delete_role(&self, role_id: &str) -> Result<(), IdentityError> {
        let mut roles = self.roles.lock().await;
        roles.remove(role_id).ok_or(IdentityError::NotFound)?;
        Ok(())
    }

    async fn users_with_role(&self, role_id: &str) -> Result<Vec<AuthUser>, IdentityError> {
        let users = self.users.lock().await;
        Ok(users
            .values()
            .filter(|stored| stored.user.roles.iter().any(|r| r.id == role_id))
            .map(|stored| stored.user.clone())
            .collect())
    }

    async fn count_users_with_role(&self, role_id: &str) -> Result<u64, IdentityError> {
        Ok(self.users_with_role(role_id).await?.len() as u64)
    }

    async fn set_user_grants(
        &self,
        uid: Uuid,
        roles: &[Role],
        permissions: &[String],
    ) -> Result<(), IdentityError> {
        let mut users = self.users.lock().await;
        let stored = users.get_mut(&uid).ok_or(IdentityError::NotFound)?;
        stored.user.roles = roles.to_vec();
        stored.user.permissions = permissions.to_vec();
        stored.user.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_identity(email: &str) -> NewIdentity {
        NewIdentity {
            email: email.to_string(),
            password: "Sup3r$ecret".to_string(),
            display_name: "Test User".to_string(),
            phone: None,
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let provider = MemoryIdentityProvider::new();
        provider
            .create_identity(new_identity("dup@example.com"))
            .await
            .unwrap();

        let err = provider
            .create_identity(new_identity("DUP@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::EmailInUse));
    }

    #[tokio::test]
    async fn credentials_verify_and_rotate() {
        let provider = MemoryIdentityProvider::new();
        let user = provider
            .create_identity(new_identity("carol@example.com"))
            .await
            .unwrap();

        assert!(
            provider
                .verify_credentials("carol@example.com", "Sup3r$ecret")
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            provider
                .verify_credentials("carol@example.com", "wrong")
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            provider
                .verify_credentials("nobody@example.com", "Sup3r$ecret")
                .await
                .unwrap()
                .is_none()
        );

        let err = provider
            .change_password(user.uid, "wrong", "N3w$ecret!")
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::WrongPassword));

        provider
            .change_password(user.uid, "Sup3r$ecret", "N3w$ecret!")
            .await
            .unwrap();
        assert!(
            provider
                .verify_credentials("carol@example.com", "N3w$ecret!")
                .await
                .unwrap()
                .is_some()
        );
    }
}
