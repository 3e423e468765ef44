//! Request-level composition of the auth stages.
//!
//! header → validator (→ resolver) → policy. A deny at any stage
//! short-circuits; callers only learn "unauthorized".

use axum::http::HeaderMap;

use crate::services::auth::{
    error::AuthError,
    header::bearer_from_headers,
    policy::{AuthorizationPolicy, Decision, evaluate},
    validator::{ClaimsPrincipal, TokenValidator},
};

#[derive(Debug)]
pub struct AuthGate {
    validator: TokenValidator,
}

impl AuthGate {
    pub fn new(validator: TokenValidator) -> Self {
        Self { validator }
    }

    /// Allow → the validated principal; deny → the internal reason
    /// (for logs and tests only, never for the response).
    pub async fn authorize(
        &self,
        headers: &HeaderMap,
        policy: &AuthorizationPolicy,
    ) -> Result<ClaimsPrincipal, AuthError> {
        let token = bearer_from_headers(headers);
        if token.is_empty() {
            tracing::debug!("no bearer token on request");
            return Err(AuthError::MissingOrMalformedHeader);
        }

        // Rejections inside validation are logged by the validator.
        let principal = self.validator.validate(&token).await;

        match evaluate(principal.as_ref(), policy) {
            Decision::Allow => principal.ok_or(AuthError::TokenRejected),
            Decision::Deny(err) => {
                if let Some(principal) = &principal {
                    tracing::warn!(
                        reason = err.kind(),
                        subject = principal.subject.as_deref().unwrap_or("-"),
                        required_scope = %policy.required_scope,
                        token = %token.fingerprint(),
                        "access denied by policy"
                    );
                }
                Err(err)
            }
        }
    }
}
