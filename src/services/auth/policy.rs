//! Role + scope authorization.
//!
//! `Start → RoleCheck → ScopeCheck → {Allow, Deny}`; a pure function of
//! (principal, policy).

use std::collections::BTreeSet;

use crate::services::auth::{error::AuthError, validator::ClaimsPrincipal};

/// Per-endpoint requirement: one exact scope and any one of `roles`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationPolicy {
    pub required_scope: String,
    pub roles: BTreeSet<String>,
}

impl AuthorizationPolicy {
    pub fn new<I, S>(required_scope: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required_scope: required_scope.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(AuthError),
}

pub fn evaluate(principal: Option<&ClaimsPrincipal>, policy: &AuthorizationPolicy) -> Decision {
    // Start: validation failed upstream (reason already logged there)
    let Some(principal) = principal else {
        return Decision::Deny(AuthError::TokenRejected);
    };

    // RoleCheck: any one acceptable role
    if principal.roles.is_disjoint(&policy.roles) {
        return Decision::Deny(AuthError::NoMatchingRole);
    }

    // ScopeCheck: whole claim value, case-insensitive
    match principal.scope.as_deref().filter(|s| !s.is_empty()) {
        None => Decision::Deny(AuthError::MissingScopeClaim),
        Some(scope) if scope.to_lowercase() == policy.required_scope.to_lowercase() => {
            Decision::Allow
        }
        Some(_) => Decision::Deny(AuthError::ScopeMismatch),
    }
}
