//! User model as consumed by the auth core

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::role::Role;

/// User entity as the auth core sees it
///
/// Owned by the identity provider; the core reads identity and role data
/// and writes back only login metadata and role grants. `permissions` is
/// the precomputed union of all role permission lists and must be
/// recomputed whenever role membership or a role's own list changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub uid: Uuid,
    pub email: String,
    pub display_name: String,
    pub phone: Option<String>,
    pub roles: Vec<Role>,
    pub permissions: Vec<String>,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AuthUser {
    /// Names of every role the user holds
    pub fn role_names(&self) -> Vec<String> {
        self.roles.iter().map(|r| r.name.clone()).collect()
    }
}

/// New identity creation payload
#[derive(Debug, Clone, Deserialize)]
pub struct NewIdentity {
    pub email: String,
    pub password: String,
    pub display_name: String,
    pub phone: Option<String>,
}

/// User login credentials
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Trimmed user view returned by register/login responses
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub uid: Uuid,
    pub email: String,
    pub display_name: String,
    pub roles: Vec<String>,
}

impl From<&AuthUser> for UserSummary {
    fn from(user: &AuthUser) -> Self {
        UserSummary {
            uid: user.uid,
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            roles: user.role_names(),
        }
    }
}
