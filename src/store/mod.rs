//! Pluggable persistence for per-key rate limit state.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::error::Result;
use crate::state::RateLimitState;

/// Trait for rate limit state storage backends.
///
/// Implementations range from the in-process [`MemoryStore`] to networked
/// key/value stores. The engine only assumes atomicity of single-key
/// operations; the read-modify-write cycle is serialized by the engine
/// itself, not by the store.
///
/// Backend failures must be surfaced through the returned `Result`, never
/// swallowed: the caller decides whether to fail the request open or closed.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Diagnostic identifier for this backend implementation.
    fn name(&self) -> &'static str;

    /// Return an independent copy of the state for `key`, or `None` if the
    /// key is unknown.
    async fn get(&self, key: &str) -> Result<Option<RateLimitState>>;

    /// Insert state for a key that must not already be present.
    ///
    /// Fails with [`crate::Error::DuplicateKey`] if the key already holds
    /// state, leaving the stored state unchanged. Callers that want
    /// last-write-wins semantics should use [`StateStore::upsert`].
    async fn put(&self, key: &str, state: RateLimitState) -> Result<()>;

    /// Atomically insert or replace the state for `key`.
    async fn upsert(&self, key: &str, state: RateLimitState) -> Result<()>;

    /// Remove the state for `key`, returning whether an entry existed.
    async fn reset(&self, key: &str) -> Result<bool>;

    /// Release backend resources (connections, handles). Idempotent.
    async fn close(&self) -> Result<()>;
}
