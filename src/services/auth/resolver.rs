//! Cached issuer metadata with coordinated (single-flight) refresh.
//!
//! ```text
//! resolve() ──fresh──▶ snapshot
//!     │ stale / empty
//!     ▼
//! refresh_lock ──another attempt finished while waiting──▶ its outcome
//!     │ first in line
//!     ▼
//! source.fetch() under timeout ──▶ slot replaced wholesale (or left untouched on failure)
//! ```
//!
//! The slot is written only after a complete fetch, so a dropped (cancelled)
//! refresh leaves the previous snapshot in place.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use crate::services::auth::{
    error::AuthError,
    metadata::{IssuerMetadata, MetadataSource},
};

/// Metadata older than this is refreshed before use.
pub const DEFAULT_METADATA_TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// Minimum time since the last refresh attempt before an unknown `kid` may force a refetch.
pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

/// Upper bound for one discovery + JWKS fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy)]
pub struct ResolverPolicy {
    pub ttl: Duration,
    pub min_refresh_interval: Duration,
    pub fetch_timeout: Duration,
}

impl Default for ResolverPolicy {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_METADATA_TTL,
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

/// Metadata handed to a validation, tagged with the refresh attempt it was
/// observed at so a later unknown-key refresh can tell whether someone else
/// already refreshed.
#[derive(Debug, Clone)]
pub struct MetadataSnapshot {
    pub metadata: Arc<IssuerMetadata>,
    attempt: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshReason {
    Stale,
    UnknownKey,
}

impl RefreshReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::Stale => "stale",
            Self::UnknownKey => "unknown_key",
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    current: Option<Arc<IssuerMetadata>>,
    // Completed refresh attempts, successful or not.
    attempts: u64,
    last_attempt_failed: bool,
    last_attempt_at: Option<DateTime<Utc>>,
}

impl Slot {
    fn attempted_within(&self, interval: Duration, now: DateTime<Utc>) -> bool {
        let Some(at) = self.last_attempt_at else {
            return false;
        };
        match now.signed_duration_since(at).to_std() {
            Ok(elapsed) => elapsed < interval,
            // attempt stamped in the future (clock went backwards)
            Err(_) => true,
        }
    }
}

pub struct MetadataResolver {
    source: Arc<dyn MetadataSource>,
    policy: ResolverPolicy,
    slot: RwLock<Slot>,
    refresh_lock: Mutex<()>,
}

impl std::fmt::Debug for MetadataResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataResolver")
            .field("source", &self.source.describe())
            .field("policy", &self.policy)
            .finish()
    }
}

impl MetadataResolver {
    pub fn new(source: Arc<dyn MetadataSource>, policy: ResolverPolicy) -> Self {
        Self {
            source,
            policy,
            slot: RwLock::new(Slot::default()),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Currently cached metadata, without triggering a fetch.
    #[cfg(test)]
    pub async fn cached(&self) -> Option<Arc<IssuerMetadata>> {
        self.slot.read().await.current.clone()
    }

    /// Fresh metadata, fetching (once, however many callers) when the cache
    /// is empty or older than the TTL.
    pub async fn resolve(&self) -> Result<MetadataSnapshot, AuthError> {
        let (current, attempt) = {
            let slot = self.slot.read().await;
            (slot.current.clone(), slot.attempts)
        };

        if let Some(metadata) = current
            && !metadata.is_stale(self.policy.ttl, Utc::now())
        {
            return Ok(MetadataSnapshot { metadata, attempt });
        }

        self.refresh(attempt, RefreshReason::Stale).await
    }

    /// Called when a token names a key id missing from `seen`.
    ///
    /// Returns newer metadata if a refresh happened (here or concurrently),
    /// or the cached metadata unchanged while the last attempt (successful
    /// or not) is younger than the minimum refresh interval.
    pub async fn refresh_for_unknown_key(
        &self,
        seen: &MetadataSnapshot,
    ) -> Result<MetadataSnapshot, AuthError> {
        self.refresh(seen.attempt, RefreshReason::UnknownKey).await
    }

    async fn refresh(
        &self,
        observed_attempt: u64,
        reason: RefreshReason,
    ) -> Result<MetadataSnapshot, AuthError> {
        let _guard = self.refresh_lock.lock().await;

        {
            let slot = self.slot.read().await;

            if slot.attempts != observed_attempt {
                // Someone finished an attempt while we waited; share its outcome.
                return match (&slot.current, slot.last_attempt_failed) {
                    (Some(metadata), false) => Ok(MetadataSnapshot {
                        metadata: metadata.clone(),
                        attempt: slot.attempts,
                    }),
                    _ => Err(AuthError::MetadataFetchFailure(
                        "concurrent refresh failed".into(),
                    )),
                };
            }

            if reason == RefreshReason::UnknownKey
                && let Some(metadata) = &slot.current
                && slot.attempted_within(self.policy.min_refresh_interval, Utc::now())
            {
                tracing::debug!(
                    fetched_at = %metadata.fetched_at,
                    last_attempt_failed = slot.last_attempt_failed,
                    "unknown signing key inside minimum refresh interval; not refetching"
                );
                return Ok(MetadataSnapshot {
                    metadata: metadata.clone(),
                    attempt: slot.attempts,
                });
            }
        }

        tracing::info!(
            source = %self.source.describe(),
            reason = reason.as_str(),
            "refreshing issuer metadata"
        );

        let outcome = match tokio::time::timeout(self.policy.fetch_timeout, self.source.fetch()).await
        {
            Ok(Ok(metadata)) => Ok(Arc::new(metadata)),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(AuthError::MetadataFetchFailure(format!(
                "timed out after {:?}",
                self.policy.fetch_timeout
            ))),
        };

        let mut slot = self.slot.write().await;
        slot.attempts += 1;
        slot.last_attempt_at = Some(Utc::now());

        match outcome {
            Ok(metadata) => {
                tracing::info!(
                    issuer = %metadata.issuer,
                    keys = metadata.key_count(),
                    "issuer metadata refreshed"
                );
                slot.current = Some(metadata.clone());
                slot.last_attempt_failed = false;
                Ok(MetadataSnapshot {
                    metadata,
                    attempt: slot.attempts,
                })
            }
            Err(err) => {
                tracing::warn!(
                    source = %self.source.describe(),
                    error = %err,
                    "issuer metadata refresh failed"
                );
                slot.last_attempt_failed = true;
                Err(err)
            }
        }
    }
}
