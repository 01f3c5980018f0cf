//! Authentication service models

pub mod role;
pub mod session;
pub mod user;

// Re-export for convenience
pub use role::{NewRole, Role, UpdateRole};
pub use session::{Session, SessionSummary};
pub use user::{AuthUser, Credentials, NewIdentity, UserSummary};
