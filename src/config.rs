/*
 * Responsibility
 * - 環境変数 (.env 含む) から Config を組み立てる
 * - 必須値の欠落・不正値は起動時に ConfigError で落とす
 */
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::services::auth::resolver::{
    DEFAULT_FETCH_TIMEOUT, DEFAULT_METADATA_TTL, DEFAULT_MIN_REFRESH_INTERVAL,
};

pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";
pub const DEFAULT_API_AUDIENCE: &str = "api://functionAPIDemo";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    fn parse(raw: Option<&str>) -> Self {
        match raw.unwrap_or("development").to_ascii_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    /// `None` → in-process store.
    pub database_url: Option<String>,

    pub app_env: AppEnv,
    pub cors_allowed_origins: Vec<String>,

    pub auth_authority: Url,
    pub auth_tenant: String,
    pub auth_client_id: String,
    pub auth_api_audience: String,
    pub auth_metadata_ttl: Duration,
    pub auth_metadata_min_refresh: Duration,
    pub auth_discovery_timeout: Duration,
    pub access_token_leeway_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Parse from an arbitrary key lookup (the process env in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port: u16 = match non_empty("PORT") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid("PORT"))?,
            None => 3000,
        };

        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let database_url = non_empty("DATABASE_URL");

        let app_env = AppEnv::parse(lookup("APP_ENV").as_deref());

        let cors_allowed_origins = lookup("CORS_ALLOWED_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        let auth_authority = Url::parse(
            non_empty("AZURE_AD_AUTHORITY")
                .as_deref()
                .unwrap_or(DEFAULT_AUTHORITY),
        )
        .map_err(|_| ConfigError::Invalid("AZURE_AD_AUTHORITY"))?;
        if !matches!(auth_authority.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid("AZURE_AD_AUTHORITY"));
        }

        let auth_tenant = non_empty("AZURE_AD_INSTANCE")
            .map(|v| v.trim().to_string())
            .ok_or(ConfigError::Missing("AZURE_AD_INSTANCE"))?;

        let auth_client_id = non_empty("AZURE_AD_CLIENT_ID")
            .map(|v| v.trim().to_string())
            .ok_or(ConfigError::Missing("AZURE_AD_CLIENT_ID"))?;

        let auth_api_audience = non_empty("AZURE_AD_API_AUDIENCE")
            .map(|v| v.trim().to_string())
            .unwrap_or_else(|| DEFAULT_API_AUDIENCE.to_string());

        let seconds = |key: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            match non_empty(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| ConfigError::Invalid(key)),
                None => Ok(default),
            }
        };

        let auth_metadata_ttl = seconds("AUTH_METADATA_TTL_SECONDS", DEFAULT_METADATA_TTL)?;
        let auth_metadata_min_refresh = seconds(
            "AUTH_METADATA_MIN_REFRESH_SECONDS",
            DEFAULT_MIN_REFRESH_INTERVAL,
        )?;
        let auth_discovery_timeout =
            seconds("AUTH_DISCOVERY_TIMEOUT_SECONDS", DEFAULT_FETCH_TIMEOUT)?;
        if auth_discovery_timeout.is_zero() {
            return Err(ConfigError::Invalid("AUTH_DISCOVERY_TIMEOUT_SECONDS"));
        }

        let access_token_leeway_seconds =
            seconds("ACCESS_TOKEN_LEEWAY_SECONDS", Duration::ZERO)?.as_secs();

        Ok(Self {
            addr,
            database_url,
            app_env,
            cors_allowed_origins,
            auth_authority,
            auth_tenant,
            auth_client_id,
            auth_api_audience,
            auth_metadata_ttl,
            auth_metadata_min_refresh,
            auth_discovery_timeout,
            access_token_leeway_seconds,
        })
    }
}
