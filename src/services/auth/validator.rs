//! Access-token validation against cached issuer metadata.
//!
//! Order of checks: empty → header/alg → signature (kid lookup, one
//! refresh-and-retry for unknown kids) → `iss` → `aud` → `exp`/`nbf`.
//! Only a token that passes all of them becomes a [`ClaimsPrincipal`].

use std::{
    collections::{BTreeSet, HashSet},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::services::auth::{
    error::AuthError,
    header::BearerToken,
    resolver::{MetadataResolver, MetadataSnapshot},
};

/// Claim type the scope is read from, as the identity platform names it.
pub const DEFAULT_SCOPE_CLAIM_TYPE: &str = "http://schemas.microsoft.com/identity/claims/scope";

/// Short claim name tokens actually carry for the scope.
const SHORT_SCOPE_CLAIM: &str = "scp";

const ROLES_CLAIM: &str = "roles";

const ALLOWED_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::EdDSA,
];

/// Validated caller identity. Only built from a fully validated token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimsPrincipal {
    pub issuer: String,
    /// The audience value that matched the accepted set.
    pub audience: String,
    pub expires_at: DateTime<Utc>,
    pub subject: Option<String>,
    pub roles: BTreeSet<String>,
    pub scope: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ValidatorSettings {
    /// Accepted `aud` values (client id and API audience).
    pub audiences: Vec<String>,
    pub scope_claim_type: String,
    pub leeway_seconds: u64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    fn values(&self) -> Vec<&str> {
        match self {
            Self::One(aud) => vec![aud.as_str()],
            Self::Many(auds) => auds.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenClaims {
    iss: String,
    aud: Audience,
    exp: i64,
    #[serde(default)]
    nbf: Option<i64>,
    #[serde(default)]
    sub: Option<String>,
    #[serde(flatten)]
    other: Map<String, Value>,
}

pub struct TokenValidator {
    resolver: Arc<MetadataResolver>,
    audiences: HashSet<String>,
    scope_claim_type: String,
    leeway_seconds: u64,
}

impl std::fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenValidator")
            .field("resolver", &self.resolver)
            .field("audiences", &self.audiences)
            .field("scope_claim_type", &self.scope_claim_type)
            .field("leeway_seconds", &self.leeway_seconds)
            .finish()
    }
}

impl TokenValidator {
    pub fn new(resolver: Arc<MetadataResolver>, settings: ValidatorSettings) -> Self {
        let audiences = settings
            .audiences
            .into_iter()
            .filter(|aud| !aud.trim().is_empty())
            .collect();

        Self {
            resolver,
            audiences,
            scope_claim_type: settings.scope_claim_type,
            leeway_seconds: settings.leeway_seconds,
        }
    }

    /// `Some(principal)` for a valid token, `None` otherwise.
    ///
    /// The failure reason is logged here and nowhere else.
    pub async fn validate(&self, token: &BearerToken) -> Option<ClaimsPrincipal> {
        match self.try_validate(token).await {
            Ok(principal) => Some(principal),
            Err(err) => {
                tracing::warn!(
                    reason = err.kind(),
                    error = %err,
                    token = %token.fingerprint(),
                    "access token rejected"
                );
                None
            }
        }
    }

    /// Same checks as [`validate`](Self::validate), keeping the reason.
    pub async fn try_validate(&self, token: &BearerToken) -> Result<ClaimsPrincipal, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingOrMalformedHeader);
        }

        let header = decode_header(token.as_str())
            .map_err(|e| AuthError::MalformedToken(format!("invalid header: {e}")))?;

        if !ALLOWED_ALGORITHMS.contains(&header.alg) {
            return Err(AuthError::UnsupportedAlgorithm(format!("{:?}", header.alg)));
        }

        let snapshot = self.resolver.resolve().await?;
        let (claims, snapshot) = match header.kid.as_deref() {
            Some(kid) => self.verify_with_kid(token, header.alg, kid, snapshot).await?,
            None => {
                let claims = verify_with_any_key(token, header.alg, &snapshot)?;
                (claims, snapshot)
            }
        };

        // Claims are checked against the metadata whose key verified the signature.
        self.check_claims(claims, &snapshot)
    }

    async fn verify_with_kid(
        &self,
        token: &BearerToken,
        alg: Algorithm,
        kid: &str,
        snapshot: MetadataSnapshot,
    ) -> Result<(TokenClaims, MetadataSnapshot), AuthError> {
        if let Some(key) = snapshot.metadata.key(kid) {
            let claims = verify_signature(token, alg, key)?;
            return Ok((claims, snapshot));
        }

        // Possibly rotated keys: one refresh, one retry.
        tracing::info!(kid = %kid, "signing key not in cached metadata; requesting refresh");
        let refreshed = self.resolver.refresh_for_unknown_key(&snapshot).await?;

        let claims = match refreshed.metadata.key(kid) {
            Some(key) => verify_signature(token, alg, key)?,
            None => {
                return Err(AuthError::UnknownSigningKey {
                    kid: kid.to_string(),
                });
            }
        };
        Ok((claims, refreshed))
    }

    fn check_claims(
        &self,
        claims: TokenClaims,
        snapshot: &MetadataSnapshot,
    ) -> Result<ClaimsPrincipal, AuthError> {
        if claims.iss != snapshot.metadata.issuer {
            return Err(AuthError::IssuerMismatch(claims.iss));
        }

        let audience = claims
            .aud
            .values()
            .into_iter()
            .find(|aud| self.audiences.contains(*aud))
            .map(str::to_string)
            .ok_or(AuthError::AudienceMismatch)?;

        let now = Utc::now().timestamp();
        let leeway = i64::try_from(self.leeway_seconds).unwrap_or(i64::MAX);

        if now >= claims.exp.saturating_add(leeway) {
            return Err(AuthError::TokenExpired);
        }
        if let Some(nbf) = claims.nbf
            && nbf > now.saturating_add(leeway)
        {
            return Err(AuthError::TokenNotYetValid);
        }

        let expires_at = DateTime::<Utc>::from_timestamp(claims.exp, 0)
            .ok_or_else(|| AuthError::MalformedToken("exp out of range".into()))?;

        let roles = claims
            .other
            .get(ROLES_CLAIM)
            .map(string_set)
            .unwrap_or_default();

        let scope = claims
            .other
            .get(&self.scope_claim_type)
            .or_else(|| claims.other.get(SHORT_SCOPE_CLAIM))
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(ClaimsPrincipal {
            issuer: claims.iss,
            audience,
            expires_at,
            subject: claims.sub,
            roles,
            scope,
        })
    }
}

fn validation_for(alg: Algorithm) -> Validation {
    // Signature only; registered claims are checked in `check_claims`
    // so each failure maps onto its own reason.
    let mut validation = Validation::new(alg);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();
    validation
}

fn verify_signature(
    token: &BearerToken,
    alg: Algorithm,
    key: &DecodingKey,
) -> Result<TokenClaims, AuthError> {
    let data = decode::<TokenClaims>(token.as_str(), key, &validation_for(alg))?;
    Ok(data.claims)
}

/// Tokens without `kid`: accept the first key whose signature verifies.
fn verify_with_any_key(
    token: &BearerToken,
    alg: Algorithm,
    snapshot: &MetadataSnapshot,
) -> Result<TokenClaims, AuthError> {
    let mut last_err = AuthError::UnknownSigningKey {
        kid: "<none>".to_string(),
    };

    for key in snapshot.metadata.keys() {
        match verify_signature(token, alg, key) {
            Ok(claims) => return Ok(claims),
            Err(err) => last_err = err,
        }
    }

    Err(last_err)
}

fn string_set(value: &Value) -> BTreeSet<String> {
    match value {
        Value::String(s) => BTreeSet::from([s.clone()]),
        Value::Array(values) => values
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => BTreeSet::new(),
    }
}
