//! Core admission engine.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::state::RateLimitState;
use crate::store::{MemoryStore, StateStore};

/// Default limit when none is configured.
const DEFAULT_LIMIT: u32 = 100;
/// Default window duration when none is configured.
const DEFAULT_WINDOW: Duration = Duration::from_secs(3600);

/// Clock source, overridable for deterministic tests.
type ClockFn = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Snapshot of a key's quota after an admission check, used to populate
/// response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    /// Configured limit for the window
    pub limit: u32,
    /// Requests left after this check's decrement
    pub remaining: u32,
    /// Whether the quota is global rather than route-scoped
    pub global: bool,
    /// When the current window resets
    pub reset_at: DateTime<Utc>,
}

impl Quota {
    /// Window reset time as milliseconds since the Unix epoch.
    pub fn reset_millis(&self) -> i64 {
        self.reset_at.timestamp_millis()
    }
}

/// The outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request is within quota and should be forwarded.
    Allowed(Quota),
    /// The quota is exhausted; the request must not be forwarded.
    Denied {
        /// Quota snapshot for the denial response headers
        quota: Quota,
        /// Time remaining until the window resets
        retry_after: Duration,
    },
}

impl Decision {
    /// Whether the request was admitted.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed(_))
    }

    /// The quota snapshot carried by either outcome.
    pub fn quota(&self) -> &Quota {
        match self {
            Decision::Allowed(quota) => quota,
            Decision::Denied { quota, .. } => quota,
        }
    }
}

/// The core rate limiter that decides per-key admission.
///
/// Shared across all request-handling tasks, typically behind an [`Arc`].
/// The read-roll-decrement-write cycle for a key runs under a per-key
/// async lock, so concurrent requests for the same key cannot race past
/// each other while requests for different keys never contend.
pub struct RateLimiter {
    store: Arc<dyn StateStore>,
    limit: u32,
    window: chrono::Duration,
    /// One lock per key, created lazily on first use
    locks: DashMap<String, Arc<Mutex<()>>>,
    clock: ClockFn,
}

impl RateLimiter {
    /// Create a rate limiter with default settings: 100 requests per hour
    /// backed by an in-memory store.
    pub fn new() -> Self {
        RateLimiterBuilder::new()
            .build()
            .unwrap_or_else(|_| unreachable!("default configuration is valid"))
    }

    /// Start building a rate limiter with custom settings.
    pub fn builder() -> RateLimiterBuilder {
        RateLimiterBuilder::new()
    }

    /// The configured per-window limit.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// The configured window duration.
    pub fn window(&self) -> Duration {
        self.window.to_std().unwrap_or(DEFAULT_WINDOW)
    }

    /// Check admission for one request attributed to `key`.
    ///
    /// Fetches the key's state (creating a fresh full-quota state when the
    /// key is unknown or its window has ended), applies the decrement, and
    /// persists the result. Storage failures are returned to the caller,
    /// never treated as "not limited".
    pub async fn check(&self, key: &str, global: bool) -> Result<Decision> {
        let lock = self.key_lock(key);
        let _guard = lock.lock().await;

        let now = (self.clock)();

        trace!(key = %key, "Checking admission");

        // Roll the window before evaluating exhaustion: an expired state
        // is stale, not a denial.
        let state = match self.store.get(key).await? {
            Some(state) if !state.is_expired_at(now) => state,
            previous => {
                debug!(
                    key = %key,
                    limit = self.limit,
                    rolled = previous.is_some(),
                    "Starting new rate limit window"
                );
                RateLimitState::new(self.limit, global, now + self.window)
            }
        };

        if state.is_exceeded_at(now) {
            debug!(key = %key, "Rate limit exceeded");

            // The saturated decrement leaves the stored state unchanged,
            // so the denial path skips the write.
            let retry_after = (state.reset_at - now).to_std().unwrap_or_default();
            return Ok(Decision::Denied {
                quota: self.quota_of(&state),
                retry_after,
            });
        }

        let state = state.decremented();
        self.store.upsert(key, state).await?;

        Ok(Decision::Allowed(self.quota_of(&state)))
    }

    /// Remove any stored state for `key`, returning whether an entry
    /// existed. The next request for the key starts a fresh window.
    pub async fn reset(&self, key: &str) -> Result<bool> {
        let lock = self.key_lock(key);
        let _guard = lock.lock().await;

        self.store.reset(key).await
    }

    /// Release the underlying store's resources.
    pub async fn close(&self) -> Result<()> {
        self.store.close().await
    }

    fn quota_of(&self, state: &RateLimitState) -> Quota {
        Quota {
            limit: state.limit,
            remaining: state.remaining,
            global: state.global,
            reset_at: state.reset_at,
        }
    }

    fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks.entry(key.to_owned()).or_default().clone()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

// The store and clock are trait objects, so Debug is written by hand.
impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("store", &self.store.name())
            .field("limit", &self.limit)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

/// Builder for [`RateLimiter`].
pub struct RateLimiterBuilder {
    limit: u32,
    window: Duration,
    store: Option<Arc<dyn StateStore>>,
    clock: Option<ClockFn>,
}

impl RateLimiterBuilder {
    /// Start from the defaults: 100 requests per hour, in-memory store.
    pub fn new() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            window: DEFAULT_WINDOW,
            store: None,
            clock: None,
        }
    }

    /// Set the number of requests allowed per window. Must be non-zero.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Set the window duration. Must be non-zero.
    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Use the given storage backend instead of the in-memory store.
    pub fn store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Override the clock source. Intended for tests that need to advance
    /// time deterministically.
    pub fn clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Validate the configuration and build the limiter.
    ///
    /// Fails with [`Error::Config`] when the limit or window is zero, so
    /// misconfiguration is caught at startup rather than per request.
    pub fn build(self) -> Result<RateLimiter> {
        if self.limit == 0 {
            return Err(Error::Config("limit must be greater than zero".into()));
        }
        if self.window.is_zero() {
            return Err(Error::Config("window must be greater than zero".into()));
        }

        let window = chrono::Duration::from_std(self.window)
            .map_err(|e| Error::Config(format!("window out of range: {e}")))?;

        Ok(RateLimiter {
            store: self.store.unwrap_or_else(|| Arc::new(MemoryStore::new())),
            limit: self.limit,
            window,
            locks: DashMap::new(),
            clock: self.clock.unwrap_or_else(|| Arc::new(Utc::now)),
        })
    }
}

impl Default for RateLimiterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
