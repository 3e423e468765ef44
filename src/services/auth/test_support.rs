//! Test-only helpers: RSA signing keys, JWKS fixtures, a scripted metadata
//! source and a local identity-provider server.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::{Json, Router, extract::Path, http::StatusCode, routing::get};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, jwk::JwkSet};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use url::Url;

use crate::services::auth::{
    AuthGate,
    error::AuthError,
    metadata::{IssuerMetadata, MetadataSource},
    resolver::{MetadataResolver, ResolverPolicy},
    validator::{TokenValidator, ValidatorSettings},
};

pub const KID_A: &str = "key-a";
pub const KID_B: &str = "key-b";

pub const PEM_A: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/signing_key_a.pem"));
pub const PEM_B: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/signing_key_b.pem"));
pub const JWKS_A: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/jwks_key-a.json"));
pub const JWKS_B: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/jwks_key-b.json"));

pub const TENANT: &str = "test-tenant";
pub const ISSUER: &str = "https://login.example.test/test-tenant/v2.0";
pub const CLIENT_ID: &str = "6f1c2a9e-0c4b-4a7e-9d55-3c1f0e8b2a10";
pub const API_AUDIENCE: &str = "api://functionAPIDemo";
pub const SCOPE_CLAIM: &str = "http://schemas.microsoft.com/identity/claims/scope";

fn jwks_for(kid: &str) -> &'static str {
    match kid {
        KID_B => JWKS_B,
        _ => JWKS_A,
    }
}

fn pem_for(kid: &str) -> &'static str {
    match kid {
        KID_B => PEM_B,
        _ => PEM_A,
    }
}

/// JWKS document containing every listed key.
pub fn jwks_json(kids: &[&str]) -> String {
    let keys: Vec<Value> = kids
        .iter()
        .flat_map(|kid| {
            let set: Value = serde_json::from_str(jwks_for(kid)).unwrap();
            set["keys"].as_array().unwrap().clone()
        })
        .collect();
    json!({ "keys": keys }).to_string()
}

pub fn metadata_with(kids: &[&str]) -> IssuerMetadata {
    metadata_for(ISSUER, kids)
}

pub fn metadata_for(issuer: &str, kids: &[&str]) -> IssuerMetadata {
    let jwks: JwkSet = serde_json::from_str(&jwks_json(kids)).unwrap();
    let keys: HashMap<String, DecodingKey> = jwks
        .keys
        .iter()
        .map(|jwk| {
            (
                jwk.common.key_id.clone().unwrap(),
                DecodingKey::from_jwk(jwk).unwrap(),
            )
        })
        .collect();
    IssuerMetadata::new(issuer, keys, Utc::now())
}

/// Claims the way the identity provider shapes them (scope under `scp`).
pub fn claims(issuer: &str, aud: &str, exp_offset_secs: i64) -> Value {
    let now = Utc::now().timestamp();
    json!({
        "iss": issuer,
        "aud": aud,
        "sub": "user-123",
        "iat": now,
        "nbf": now - 5,
        "exp": now + exp_offset_secs,
        "roles": ["Data.Read"],
        "scp": "access_as_user",
    })
}

/// RS256-sign `claims`; `kid` selects the private key and is put in the header.
pub fn sign(kid: Option<&str>, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    let pem = pem_for(kid.unwrap_or(KID_A));
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap();
    jsonwebtoken::encode(&header, claims, &key).unwrap()
}

/// Sign with key B's private key while claiming `kid`.
pub fn sign_with_wrong_key(kid: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(PEM_B.as_bytes()).unwrap();
    jsonwebtoken::encode(&header, claims, &key).unwrap()
}

/// Gate over `source` accepting `CLIENT_ID` and `API_AUDIENCE`, no refresh cooldown.
pub fn gate_over(source: Arc<FakeSource>) -> AuthGate {
    let resolver = Arc::new(MetadataResolver::new(
        source,
        ResolverPolicy {
            ttl: Duration::from_secs(3600),
            min_refresh_interval: Duration::ZERO,
            fetch_timeout: Duration::from_secs(2),
        },
    ));
    AuthGate::new(TokenValidator::new(
        resolver,
        ValidatorSettings {
            audiences: vec![CLIENT_ID.into(), API_AUDIENCE.into()],
            scope_claim_type: SCOPE_CLAIM.into(),
            leeway_seconds: 0,
        },
    ))
}

/// Scripted `MetadataSource` that counts fetches.
pub struct FakeSource {
    kids: Mutex<Vec<&'static str>>,
    issuer: Mutex<String>,
    failing: AtomicBool,
    delay: Duration,
    age: Duration,
    fetches: AtomicUsize,
}

impl FakeSource {
    pub fn new(kids: &[&'static str]) -> Self {
        Self {
            kids: Mutex::new(kids.to_vec()),
            issuer: Mutex::new(ISSUER.to_string()),
            failing: AtomicBool::new(false),
            delay: Duration::ZERO,
            age: Duration::ZERO,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Served metadata claims to have been fetched `age` ago.
    pub fn backdated(mut self, age: Duration) -> Self {
        self.age = age;
        self
    }

    pub fn failing(self) -> Self {
        self.failing.store(true, Ordering::SeqCst);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_kids(&self, kids: &[&'static str]) {
        *self.kids.lock().unwrap() = kids.to_vec();
    }

    pub fn set_issuer(&self, issuer: &str) {
        *self.issuer.lock().unwrap() = issuer.to_string();
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataSource for FakeSource {
    async fn fetch(&self) -> Result<IssuerMetadata, AuthError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(AuthError::MetadataFetchFailure("scripted failure".into()));
        }
        let kids = self.kids.lock().unwrap().clone();
        let issuer = self.issuer.lock().unwrap().clone();
        let mut metadata = metadata_for(&issuer, &kids);
        metadata.fetched_at -= chrono::Duration::from_std(self.age).unwrap();
        Ok(metadata)
    }

    fn describe(&self) -> String {
        "fake".to_string()
    }
}

/// Local OIDC provider serving discovery + JWKS for `TENANT`.
pub struct IdpServer {
    base: String,
    discovery_hits: Arc<AtomicUsize>,
    jwks: Arc<Mutex<String>>,
    shutdown: tokio::sync::oneshot::Sender<()>,
}

impl IdpServer {
    pub fn issuer(&self) -> String {
        format!("{}/{TENANT}/v2.0", self.base)
    }

    pub fn discovery_url(&self) -> Url {
        Url::parse(&format!(
            "{}/{TENANT}/v2.0/.well-known/openid-configuration",
            self.base
        ))
        .unwrap()
    }

    pub fn discovery_hits(&self) -> usize {
        self.discovery_hits.load(Ordering::SeqCst)
    }

    pub fn set_jwks(&self, jwks: impl Into<String>) {
        *self.jwks.lock().unwrap() = jwks.into();
    }

    pub fn shutdown(self) {
        let _ = self.shutdown.send(());
    }
}

pub async fn spawn_idp(jwks: &str) -> IdpServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let base = format!("http://{addr}");

    let discovery_hits = Arc::new(AtomicUsize::new(0));
    let jwks = Arc::new(Mutex::new(jwks.to_string()));

    let discovery = {
        let base = base.clone();
        let hits = discovery_hits.clone();
        move |Path(tenant): Path<String>| {
            let base = base.clone();
            let hits = hits.clone();
            async move {
                if tenant != TENANT {
                    return Err(StatusCode::NOT_FOUND);
                }
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(Json(json!({
                    "issuer": format!("{base}/{TENANT}/v2.0"),
                    "jwks_uri": format!("{base}/discovery/v2.0/keys"),
                    "token_endpoint": format!("{base}/{TENANT}/oauth2/v2.0/token"),
                })))
            }
        }
    };

    let keys = {
        let jwks = jwks.clone();
        move || {
            let body = jwks.lock().unwrap().clone();
            async move {
                let value: Value = serde_json::from_str(&body).unwrap();
                Json(value)
            }
        }
    };

    let app = Router::new()
        .route("/{tenant}/v2.0/.well-known/openid-configuration", get(discovery))
        .route("/discovery/v2.0/keys", get(keys));

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    });

    IdpServer {
        base,
        discovery_hits,
        jwks,
        shutdown: tx,
    }
}
