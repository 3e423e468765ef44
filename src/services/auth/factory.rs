/// Factory: build the auth gate from application `Config`.
use std::sync::Arc;

use crate::config::Config;
use crate::services::auth::{
    AuthGate,
    error::AuthError,
    metadata::{HttpMetadataSource, discovery_url},
    resolver::{MetadataResolver, ResolverPolicy},
    validator::{DEFAULT_SCOPE_CLAIM_TYPE, TokenValidator, ValidatorSettings},
};

pub fn build_auth_gate(config: &Config) -> Result<Arc<AuthGate>, AuthError> {
    let url = discovery_url(&config.auth_authority, &config.auth_tenant).map_err(|e| {
        AuthError::MetadataFetchFailure(format!("invalid discovery url: {e}"))
    })?;

    let source = HttpMetadataSource::new(url, config.auth_discovery_timeout)?;

    let resolver = MetadataResolver::new(
        Arc::new(source),
        ResolverPolicy {
            ttl: config.auth_metadata_ttl,
            min_refresh_interval: config.auth_metadata_min_refresh,
            fetch_timeout: config.auth_discovery_timeout,
        },
    );

    let validator = TokenValidator::new(
        Arc::new(resolver),
        ValidatorSettings {
            audiences: vec![config.auth_client_id.clone(), config.auth_api_audience.clone()],
            scope_claim_type: DEFAULT_SCOPE_CLAIM_TYPE.to_string(),
            leeway_seconds: config.access_token_leeway_seconds,
        },
    );

    Ok(Arc::new(AuthGate::new(validator)))
}
