//! Role-based access control engine
//!
//! Resolves role sets into effective permission sets and evaluates
//! authorization predicates. Every mutation path that touches a user's
//! flattened permission set goes through [`RbacEngine::effective_permissions`];
//! nothing else is allowed to re-implement the union.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};
use crate::identity::{IdentityError, IdentityProvider};
use crate::models::{AuthUser, NewRole, Role, UpdateRole};

/// Role assigned to every new registration
pub const DEFAULT_ROLE_ID: &str = "user";

/// System roles seeded at process start: (name, description, permissions)
const SYSTEM_ROLES: &[(&str, &str, &[&str])] = &[
    (
        "super_admin",
        "Full administrative control",
        &[
            "admin:read",
            "admin:write",
            "admin:delete",
            "user:read",
            "user:write",
            "user:delete",
            "role:read",
            "role:write",
            "role:delete",
            "session:read",
            "session:write",
        ],
    ),
    (
        "admin",
        "Administrative access without destructive operations",
        &[
            "admin:read",
            "admin:write",
            "user:read",
            "user:write",
            "role:read",
            "session:read",
        ],
    ),
    (
        "moderator",
        "User management for community moderation",
        &["user:read", "user:write"],
    ),
    (
        "user",
        "Standard account",
        &["profile:read", "profile:write", "job:read", "job:apply"],
    ),
    ("guest", "Read-only visitor", &["job:read"]),
];

/// RBAC engine
///
/// Pure set algebra plus role CRUD. Persistence of role documents and
/// user grants goes through the identity provider.
#[derive(Clone)]
pub struct RbacEngine {
    identity: Arc<dyn IdentityProvider>,
}

impl RbacEngine {
    pub fn new(identity: Arc<dyn IdentityProvider>) -> Self {
        Self { identity }
    }

    /// Union of every role's permission list, de-duplicated
    pub fn effective_permissions(roles: &[Role]) -> Vec<String> {
        let set: BTreeSet<String> = roles
            .iter()
            .flat_map(|r| r.permissions.iter().cloned())
            .collect();
        set.into_iter().collect()
    }

    /// AND semantics: every required permission must be present
    pub fn has_permission(effective: &[String], required: &[&str]) -> bool {
        required
            .iter()
            .all(|needed| effective.iter().any(|held| held == needed))
    }

    /// OR semantics: at least one required role name must be present
    pub fn has_role(role_names: &[String], required: &[&str]) -> bool {
        required
            .iter()
            .any(|needed| role_names.iter().any(|held| held == needed))
    }

    /// Seed the system roles, skipping any that already exist
    pub async fn seed_system_roles(&self) -> AuthResult<()> {
        for (name, description, permissions) in SYSTEM_ROLES {
            let id = Role::derive_id(name);
            if self.identity.find_role(&id).await.map_err(backend)?.is_some() {
                continue;
            }
            let role = Role {
                id: id.clone(),
                name: name.to_string(),
                description: Some(description.to_string()),
                permissions: permissions.iter().map(|p| p.to_string()).collect(),
                is_system: true,
            };
            self.identity.insert_role(&role).await.map_err(backend)?;
            info!("Seeded system role {}", id);
        }
        Ok(())
    }

    /// Create a non-system role; rejects a duplicate derived id
    pub async fn create_role(&self, new_role: NewRole) -> AuthResult<Role> {
        let id = Role::derive_id(&new_role.name);
        if self.identity.find_role(&id).await.map_err(backend)?.is_some() {
            return Err(AuthError::RoleAlreadyExists);
        }

        let permissions: BTreeSet<String> = new_role.permissions.into_iter().collect();
        let role = Role {
            id,
            name: new_role.name,
            description: new_role.description,
            permissions: permissions.into_iter().collect(),
            is_system: false,
        };
        self.identity.insert_role(&role).await.map_err(backend)?;
        Ok(role)
    }

    /// Update a role and cascade the new permission list to every holder
    ///
    /// The cascade recomputes each affected user's flattened permission
    /// set from their full role list. A cascade that fails partway leaves
    /// role and user documents inconsistent; re-running the update is the
    /// repair path, since the recompute is idempotent.
    pub async fn update_role(&self, role_id: &str, updates: UpdateRole) -> AuthResult<Role> {
        let mut role = self
            .identity
            .find_role(role_id)
            .await
            .map_err(backend)?
            .ok_or(AuthError::RoleNotFound)?;

        if role.is_system {
            return Err(AuthError::CannotModifySystemRole);
        }

        if let Some(description) = updates.description {
            role.description = Some(description);
        }
        if let Some(permissions) = updates.permissions {
            let deduped: BTreeSet<String> = permissions.into_iter().collect();
            role.permissions = deduped.into_iter().collect();
        }

        self.identity.update_role(&role).await.map_err(backend)?;

        // Only users actually holding the role are touched
        let holders = self
            .identity
            .users_with_role(role_id)
            .await
            .map_err(backend)?;
        let holder_count = holders.len();
        for user in holders {
            let roles: Vec<Role> = user
                .roles
                .iter()
                .map(|r| if r.id == role.id { role.clone() } else { r.clone() })
                .collect();
            let permissions = Self::effective_permissions(&roles);
            self.identity
                .set_user_grants(user.uid, &roles, &permissions)
                .await
                .map_err(backend)?;
        }

        info!(
            "Updated role {} and recomputed grants for {} users",
            role.id, holder_count
        );
        Ok(role)
    }

    /// Delete an unassigned, non-system role
    pub async fn delete_role(&self, role_id: &str) -> AuthResult<()> {
        let role = self
            .identity
            .find_role(role_id)
            .await
            .map_err(backend)?
            .ok_or(AuthError::RoleNotFound)?;

        if role.is_system {
            return Err(AuthError::CannotDeleteSystemRole);
        }
        if self
            .identity
            .count_users_with_role(role_id)
            .await
            .map_err(backend)?
            > 0
        {
            return Err(AuthError::RoleInUse);
        }

        self.identity.delete_role(role_id).await.map_err(backend)?;
        info!("Deleted role {}", role_id);
        Ok(())
    }

    /// Grant a role to a user, recomputing their flattened permissions
    pub async fn assign_role(&self, user_id: Uuid, role_id: &str) -> AuthResult<AuthUser> {
        let role = self
            .identity
            .find_role(role_id)
            .await
            .map_err(backend)?
            .ok_or(AuthError::RoleNotFound)?;
        let mut user = self
            .identity
            .find_by_id(user_id)
            .await
            .map_err(backend)?
            .ok_or(AuthError::UserNotFound)?;

        if user.roles.iter().any(|r| r.id == role.id) {
            return Ok(user);
        }

        user.roles.push(role);
        user.permissions = Self::effective_permissions(&user.roles);
        self.identity
            .set_user_grants(user.uid, &user.roles, &user.permissions)
            .await
            .map_err(backend)?;
        Ok(user)
    }

    /// Revoke a role from a user, recomputing their flattened permissions
    pub async fn remove_role(&self, user_id: Uuid, role_id: &str) -> AuthResult<AuthUser> {
        let mut user = self
            .identity
            .find_by_id(user_id)
            .await
            .map_err(backend)?
            .ok_or(AuthError::UserNotFound)?;

        user.roles.retain(|r| r.id != role_id);
        user.permissions = Self::effective_permissions(&user.roles);
        self.identity
            .set_user_grants(user.uid, &user.roles, &user.permissions)
            .await
            .map_err(backend)?;
        Ok(user)
    }
}

fn backend(err: IdentityError) -> AuthError {
    AuthError::Internal(err.into())
}
