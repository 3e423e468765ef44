//! `Authorization` header → bearer token.
//!
//! Malformed input is not an error here: it yields an empty token, which the
//! validator rejects before attempting any decoding.

use std::fmt;

use axum::http::{HeaderMap, header};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};

const BEARER_SCHEME: &str = "Bearer";

/// Raw bearer credential for a single request.
///
/// `Debug` prints a fingerprint, never the token itself.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First 12 chars of base64url(SHA-256(token)); safe to log.
    pub fn fingerprint(&self) -> String {
        if self.0.is_empty() {
            return "-".to_string();
        }
        let digest = Sha256::digest(self.0.as_bytes());
        let mut encoded = URL_SAFE_NO_PAD.encode(digest);
        encoded.truncate(12);
        encoded
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BearerToken")
            .field(&self.fingerprint())
            .finish()
    }
}

/// Parse a raw `Authorization` value.
///
/// The value is split on every whitespace character (empty pieces are kept,
/// so doubled or leading whitespace changes the part count). Exactly two
/// parts, the first being `Bearer` (case-sensitive), yield the second part;
/// anything else yields an empty token.
pub fn parse_authorization(raw: Option<&str>) -> BearerToken {
    let Some(raw) = raw else {
        return BearerToken::default();
    };

    let parts: Vec<&str> = raw.split(char::is_whitespace).collect();
    match parts.as_slice() {
        [scheme, token] if *scheme == BEARER_SCHEME => BearerToken::new(*token),
        _ => BearerToken::default(),
    }
}

/// Pull the bearer token out of request headers.
///
/// Non-UTF8 / non-visible-ASCII header values are treated as absent.
pub fn bearer_from_headers(headers: &HeaderMap) -> BearerToken {
    let raw = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    parse_authorization(raw)
}
