//! Cache backend trait definition

use std::time::Duration;

use async_trait::async_trait;

use super::error::CacheError;

/// Cache backend trait
///
/// Stores opaque bytes under string keys with an optional per-entry TTL.
/// Entry counts may lag behind recent writes and expiries.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get a value from the cache
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Set a value in the cache with optional TTL
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>)
    -> Result<(), CacheError>;

    /// Delete a key, returning whether it was present
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Drop every entry, returning how many were present
    async fn clear(&self) -> Result<u64, CacheError>;

    /// Approximate number of live entries
    async fn entry_count(&self) -> u64;

    /// Backend name for debugging/logging
    fn backend_name(&self) -> &'static str;
}
