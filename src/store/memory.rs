//! In-memory state store implementation.
//!
//! Backed by a single process-wide concurrent map. Suitable for
//! single-node deployments and testing; state does not survive restarts
//! and is not shared across processes.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::{Error, Result};
use crate::state::RateLimitState;

use super::StateStore;

/// [`StateStore`] backed by an in-process [`DashMap`].
///
/// All operations are synchronous and non-blocking; this store never
/// reports [`Error::StoreUnavailable`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, RateLimitState>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently holding state, stale entries included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no state at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn get(&self, key: &str) -> Result<Option<RateLimitState>> {
        // Copy out so callers never hold a reference into the map.
        Ok(self.entries.get(key).map(|entry| *entry.value()))
    }

    async fn put(&self, key: &str, state: RateLimitState) -> Result<()> {
        match self.entries.entry(key.to_owned()) {
            Entry::Occupied(_) => Err(Error::DuplicateKey(key.to_owned())),
            Entry::Vacant(vacant) => {
                vacant.insert(state);
                Ok(())
            }
        }
    }

    async fn upsert(&self, key: &str, state: RateLimitState) -> Result<()> {
        self.entries.insert(key.to_owned(), state);
        Ok(())
    }

    async fn reset(&self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
