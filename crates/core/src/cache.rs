//! Cache store trait — the key-value collaborator behind session memory.
//!
//! Narrow by design: byte values, per-key TTL, delete. Session memory is the
//! only consumer.

use crate::error::CacheError;
use async_trait::async_trait;
use std::time::Duration;

/// A TTL-aware key-value store.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// The backend name (e.g., "redis", "in_memory").
    fn name(&self) -> &str;

    /// Fetch a value; `None` when the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store a value, overwriting any prior one, expiring after `ttl`.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError>;

    /// Remove a key. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}
