//! Credential lifecycle for the bureau conversation: a single-slot token
//! cache plus the reuse / revalidate / refresh decision around it.

pub mod expiry;

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use self::expiry::parse_expiry;
use super::bureau::{BureauError, BureauGateway};

/// One cached credential with its absolute expiry. Replaced wholesale on
/// every refresh, never mutated in place.
#[derive(Debug, Clone)]
pub struct TokenCacheEntry {
    pub token: String,
    pub expiry: DateTime<Utc>,
    pub cached_at: DateTime<Utc>,
    /// Raw upstream expiry stamp the absolute expiry was derived from.
    pub expiry_source: String,
}

impl TokenCacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry
    }

    pub fn time_to_expiry(&self, now: DateTime<Utc>) -> Duration {
        self.expiry - now
    }
}

/// Process-wide single-slot store for the bureau credential.
#[derive(Debug, Default)]
pub struct TokenStore {
    slot: Mutex<Option<TokenCacheEntry>>,
}

impl TokenStore {
    pub fn snapshot(&self) -> Option<TokenCacheEntry> {
        self.slot.lock().expect("token slot poisoned").clone()
    }

    pub fn replace(&self, entry: TokenCacheEntry) {
        *self.slot.lock().expect("token slot poisoned") = Some(entry);
    }

    pub fn clear(&self) {
        *self.slot.lock().expect("token slot poisoned") = None;
    }
}

/// Tuning knobs for the lifecycle decision.
#[derive(Debug, Clone)]
pub struct TokenPolicy {
    /// Inside this window before expiry the cached token is revalidated
    /// upstream instead of being trusted blindly.
    pub revalidate_buffer: Duration,
    /// TTL assigned when the upstream expiry stamp cannot be parsed; keeps
    /// the pipeline moving at the cost of expiry precision.
    pub fallback_ttl: Duration,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            revalidate_buffer: Duration::minutes(3),
            fallback_ttl: Duration::minutes(40),
        }
    }
}

/// Decides whether to reuse, revalidate, or refresh the cached credential.
///
/// Refresh is single-flight: concurrent callers racing on an empty or
/// expired slot serialize behind one mutex and all receive the result of a
/// single upstream issue call.
pub struct TokenManager<G> {
    gateway: Arc<G>,
    store: Arc<TokenStore>,
    policy: TokenPolicy,
    refresh_guard: tokio::sync::Mutex<()>,
}

impl<G: BureauGateway> TokenManager<G> {
    pub fn new(gateway: Arc<G>, policy: TokenPolicy) -> Self {
        Self {
            gateway,
            store: Arc::new(TokenStore::default()),
            policy,
            refresh_guard: tokio::sync::Mutex::new(()),
        }
    }

    /// Returns a token that is valid right now, refreshing only when the
    /// cached entry is absent, expired, or fails an upstream revalidation
    /// probe inside the buffer window.
    pub async fn valid_token(&self) -> Result<String, BureauError> {
        let now = Utc::now();

        if let Some(entry) = self.store.snapshot() {
            if !entry.is_expired(now) {
                if entry.time_to_expiry(now) > self.policy.revalidate_buffer {
                    return Ok(entry.token);
                }

                match self.gateway.validate_token(&entry.token).await {
                    Ok(true) => return Ok(entry.token),
                    Ok(false) => {
                        debug!("cached bureau token failed upstream validation, refreshing");
                    }
                    Err(err) => {
                        warn!(error = %err, "token validation probe failed, refreshing");
                    }
                }
            }
        }

        self.refresh_coalesced().await
    }

    /// Unconditionally issues a new token upstream and replaces the cache
    /// slot. Serialized so two explicit refreshes never interleave.
    pub async fn refresh(&self) -> Result<String, BureauError> {
        let _flight = self.refresh_guard.lock().await;
        self.issue_and_cache().await
    }

    /// Refresh path for `valid_token`: callers that lose the single-flight
    /// race reuse the winner's entry instead of issuing again.
    async fn refresh_coalesced(&self) -> Result<String, BureauError> {
        let _flight = self.refresh_guard.lock().await;

        let now = Utc::now();
        if let Some(entry) = self.store.snapshot() {
            if !entry.is_expired(now) && entry.time_to_expiry(now) > self.policy.revalidate_buffer {
                return Ok(entry.token);
            }
        }

        self.issue_and_cache().await
    }

    async fn issue_and_cache(&self) -> Result<String, BureauError> {
        let now = Utc::now();
        let grant = self.gateway.issue_token().await?;
        let expiry = match parse_expiry(&grant.expiry_raw) {
            Ok(expiry) => expiry,
            Err(err) => {
                warn!(
                    stamp = grant.expiry_raw.as_str(),
                    error = %err,
                    "unparseable token expiry stamp, applying fallback ttl"
                );
                now + self.policy.fallback_ttl
            }
        };

        let entry = TokenCacheEntry {
            token: grant.token.clone(),
            expiry,
            cached_at: now,
            expiry_source: grant.expiry_raw,
        };
        self.store.replace(entry);

        Ok(grant.token)
    }

    /// Clears the slot; the next `valid_token` call triggers a fresh issue.
    pub fn invalidate(&self) {
        self.store.clear();
    }

    pub fn is_valid(&self) -> bool {
        self.store
            .snapshot()
            .map(|entry| !entry.is_expired(Utc::now()))
            .unwrap_or(false)
    }

    pub fn inspect(&self) -> Option<TokenCacheEntry> {
        self.store.snapshot()
    }

    /// Used by tests and diagnostics to seed the slot directly.
    pub fn store(&self) -> &TokenStore {
        &self.store
    }
}
