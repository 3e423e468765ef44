use thiserror::Error;

/// Reasons the authorization gate denied a request.
///
/// These never leave the process: at the HTTP boundary every variant becomes
/// the same bare `401 Unauthorized`. They exist so deny paths are enumerable,
/// testable and loggable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing or malformed Authorization header")]
    MissingOrMalformedHeader,

    #[error("issuer metadata fetch failed: {0}")]
    MetadataFetchFailure(String),

    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("unknown signing key: {kid}")]
    UnknownSigningKey { kid: String },

    #[error("invalid token signature")]
    SignatureInvalid,

    #[error("issuer mismatch: {0}")]
    IssuerMismatch(String),

    #[error("audience mismatch")]
    AudienceMismatch,

    #[error("token expired")]
    TokenExpired,

    #[error("token not yet valid")]
    TokenNotYetValid,

    #[error("token rejected by validation")]
    TokenRejected,

    #[error("no matching role")]
    NoMatchingRole,

    #[error("missing scope claim")]
    MissingScopeClaim,

    #[error("scope mismatch")]
    ScopeMismatch,
}

impl AuthError {
    /// Short, stable label used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingOrMalformedHeader => "missing_or_malformed_header",
            Self::MetadataFetchFailure(_) => "metadata_fetch_failure",
            Self::MalformedToken(_) => "malformed_token",
            Self::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            Self::UnknownSigningKey { .. } => "unknown_signing_key",
            Self::SignatureInvalid => "signature_invalid",
            Self::IssuerMismatch(_) => "issuer_mismatch",
            Self::AudienceMismatch => "audience_mismatch",
            Self::TokenExpired => "token_expired",
            Self::TokenNotYetValid => "token_not_yet_valid",
            Self::TokenRejected => "token_rejected",
            Self::NoMatchingRole => "no_matching_role",
            Self::MissingScopeClaim => "missing_scope_claim",
            Self::ScopeMismatch => "scope_mismatch",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature => Self::SignatureInvalid,
            ErrorKind::ExpiredSignature => Self::TokenExpired,
            ErrorKind::ImmatureSignature => Self::TokenNotYetValid,
            ErrorKind::InvalidAudience => Self::AudienceMismatch,
            ErrorKind::InvalidIssuer => Self::IssuerMismatch("rejected by decoder".into()),
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                Self::UnsupportedAlgorithm(err.to_string())
            }
            _ => Self::MalformedToken(err.to_string()),
        }
    }
}
