//! Issuer metadata: OIDC discovery document + signing keys.
//!
//! `MetadataSource` is the fetch seam. `HttpMetadataSource` talks to the
//! identity provider; the resolver (see `resolver.rs`) owns caching.

use std::{collections::HashMap, fmt, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{
    DecodingKey,
    jwk::{Jwk, JwkSet},
};
use serde::Deserialize;
use url::Url;

use crate::services::auth::error::AuthError;

/// Immutable snapshot of an issuer's identity and signing keys.
///
/// Shared via `Arc` and replaced wholesale on refresh.
pub struct IssuerMetadata {
    pub issuer: String,
    keys: HashMap<String, DecodingKey>,
    pub fetched_at: DateTime<Utc>,
}

impl fmt::Debug for IssuerMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Key ids only; key material stays out of logs
        let mut kids: Vec<&str> = self.keys.keys().map(String::as_str).collect();
        kids.sort_unstable();
        f.debug_struct("IssuerMetadata")
            .field("issuer", &self.issuer)
            .field("kids", &kids)
            .field("fetched_at", &self.fetched_at)
            .finish()
    }
}

impl IssuerMetadata {
    pub fn new(
        issuer: impl Into<String>,
        keys: HashMap<String, DecodingKey>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            keys,
            fetched_at,
        }
    }

    /// Build from a JWKS document. Keys without `kid`, or that cannot be
    /// turned into a verification key, are skipped.
    pub fn from_jwks(issuer: impl Into<String>, jwks: &JwkSet, fetched_at: DateTime<Utc>) -> Self {
        let mut keys = HashMap::with_capacity(jwks.keys.len());
        for jwk in &jwks.keys {
            if let Some((kid, key)) = usable_key(jwk) {
                keys.insert(kid, key);
            }
        }
        Self::new(issuer, keys, fetched_at)
    }

    pub fn key(&self, kid: &str) -> Option<&DecodingKey> {
        self.keys.get(kid)
    }

    pub fn keys(&self) -> impl Iterator<Item = &DecodingKey> {
        self.keys.values()
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub fn is_stale(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.fetched_at);
        match age.to_std() {
            Ok(age) => age >= ttl,
            // fetched_at in the future (clock went backwards); treat as fresh
            Err(_) => false,
        }
    }
}

fn usable_key(jwk: &Jwk) -> Option<(String, DecodingKey)> {
    let Some(kid) = jwk.common.key_id.clone() else {
        tracing::debug!("skipping jwk without kid");
        return None;
    };
    match DecodingKey::from_jwk(jwk) {
        Ok(key) => Some((kid, key)),
        Err(err) => {
            tracing::debug!(kid = %kid, error = %err, "skipping unusable jwk");
            None
        }
    }
}

/// Where issuer metadata comes from.
#[async_trait]
pub trait MetadataSource: Send + Sync + 'static {
    /// Fetch a complete, fresh snapshot. Must not return partial data.
    async fn fetch(&self) -> Result<IssuerMetadata, AuthError>;

    /// Human-readable location (for logs).
    fn describe(&self) -> String;
}

/// Subset of the OpenID Provider Configuration we care about.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryDocument {
    #[serde(default)]
    pub issuer: String,
    #[serde(default)]
    pub jwks_uri: String,
}

/// `{authority}/{tenant}/v2.0/.well-known/openid-configuration`
pub fn discovery_url(authority: &Url, tenant: &str) -> Result<Url, url::ParseError> {
    let base = authority.as_str().trim_end_matches('/');
    Url::parse(&format!(
        "{base}/{tenant}/v2.0/.well-known/openid-configuration"
    ))
}

/// Fetches the discovery document, then the JWKS it points at.
#[derive(Debug, Clone)]
pub struct HttpMetadataSource {
    http: reqwest::Client,
    discovery_url: Url,
}

impl HttpMetadataSource {
    pub fn new(discovery_url: Url, timeout: Duration) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                AuthError::MetadataFetchFailure(format!("failed to build http client: {e}"))
            })?;

        Ok(Self {
            http,
            discovery_url,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, AuthError> {
        let response =
            self.http.get(url).send().await.map_err(|e| {
                AuthError::MetadataFetchFailure(format!("GET {url} failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::MetadataFetchFailure(format!(
                "GET {url} returned {status}"
            )));
        }

        response.json::<T>().await.map_err(|e| {
            AuthError::MetadataFetchFailure(format!("invalid JSON from {url}: {e}"))
        })
    }
}

#[async_trait]
impl MetadataSource for HttpMetadataSource {
    async fn fetch(&self) -> Result<IssuerMetadata, AuthError> {
        let doc: DiscoveryDocument = self.get_json(self.discovery_url.as_str()).await?;

        if doc.issuer.trim().is_empty() {
            return Err(AuthError::MetadataFetchFailure(
                "discovery document has no issuer".into(),
            ));
        }
        if doc.jwks_uri.trim().is_empty() {
            return Err(AuthError::MetadataFetchFailure(
                "discovery document has no jwks_uri".into(),
            ));
        }

        let jwks: JwkSet = self.get_json(&doc.jwks_uri).await?;
        let metadata = IssuerMetadata::from_jwks(doc.issuer, &jwks, Utc::now());

        if metadata.key_count() == 0 {
            return Err(AuthError::MetadataFetchFailure(
                "jwks contains no usable signing keys".into(),
            ));
        }

        Ok(metadata)
    }

    fn describe(&self) -> String {
        self.discovery_url.to_string()
    }
}
