//! Role model and related functionality

use serde::{Deserialize, Serialize};

/// Role entity
///
/// Permissions are `"resource:action"` strings. A user's flattened
/// permission set is the union of every held role's list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    /// Identifier derived from the role name (see [`Role::derive_id`])
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub permissions: Vec<String>,
    /// System roles are seeded at startup and cannot be modified or deleted
    #[serde(rename = "isSystem")]
    pub is_system: bool,
}

impl Role {
    /// Derive the stable role id from its name
    ///
    /// Lowercased, with every non-alphanumeric run collapsed to a single
    /// underscore, so "Super Admin" and "super_admin" share one id.
    pub fn derive_id(name: &str) -> String {
        let mut id = String::with_capacity(name.len());
        let mut last_was_sep = false;
        for c in name.trim().chars() {
            if c.is_ascii_alphanumeric() {
                id.push(c.to_ascii_lowercase());
                last_was_sep = false;
            } else if !last_was_sep && !id.is_empty() {
                id.push('_');
                last_was_sep = true;
            }
        }
        if id.ends_with('_') {
            id.pop();
        }
        id
    }
}

/// New role creation payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRole {
    pub name: String,
    pub description: Option<String>,
    pub permissions: Vec<String>,
}

/// Role update payload
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateRole {
    pub description: Option<String>,
    pub permissions: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_id_normalizes_names() {
        assert_eq!(Role::derive_id("super_admin"), "super_admin");
        assert_eq!(Role::derive_id("Super Admin"), "super_admin");
        assert_eq!(Role::derive_id("  Content  Moderator "), "content_moderator");
    }
}
