//! Per-endpoint authorization requirements.

use crate::services::auth::AuthorizationPolicy;

pub const SCOPE_ACCESS_AS_USER: &str = "access_as_user";
pub const ROLE_DATA_READ: &str = "Data.Read";
pub const ROLE_DATA_READ_WRITE: &str = "Data.ReadWrite";

/// List and search.
pub fn read() -> AuthorizationPolicy {
    AuthorizationPolicy::new(SCOPE_ACCESS_AS_USER, [ROLE_DATA_READ, ROLE_DATA_READ_WRITE])
}

/// Insert/update.
pub fn write() -> AuthorizationPolicy {
    AuthorizationPolicy::new(SCOPE_ACCESS_AS_USER, [ROLE_DATA_READ_WRITE])
}
