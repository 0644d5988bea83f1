//! Response cache
//!
//! In-memory cache (moka) with typed MessagePack access and hit/miss counters.
//! When disabled, every lookup misses and writes are dropped.

mod backend;
mod error;
mod key;
mod memory;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use utoipa::ToSchema;

pub use backend::CacheBackend;
pub use error::CacheError;
pub use key::CacheKey;

use memory::InMemoryCache;

use crate::core::config::CacheConfig;

/// Point-in-time cache statistics
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CacheStats {
    pub enabled: bool,
    pub backend: String,
    pub entries: u64,
    pub hits: u64,
    pub misses: u64,
    /// Percentage of lookups served from cache
    pub hit_rate: f64,
}

/// Cache service providing typed access to the cache backend
pub struct CacheService {
    backend: Arc<dyn CacheBackend>,
    enabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for CacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheService")
            .field("backend", &self.backend.backend_name())
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl CacheService {
    /// Create a new cache service from configuration
    pub fn new(config: &CacheConfig) -> Result<Self, CacheError> {
        if config.enabled && config.max_entries == 0 {
            return Err(CacheError::Config(
                "max_entries must be greater than zero when the cache is enabled".into(),
            ));
        }

        tracing::debug!(
            enabled = config.enabled,
            max_entries = config.max_entries,
            ttl_secs = config.ttl.as_secs(),
            "Initializing in-memory cache"
        );

        Ok(Self {
            backend: Arc::new(InMemoryCache::new(config.max_entries.max(1))),
            enabled: config.enabled,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Get a typed value from cache
    ///
    /// Undecodable entries are treated as misses and evicted.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        if !self.enabled {
            return Ok(None);
        }

        let Some(bytes) = self.backend.get(key).await? else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        };

        match rmp_serde::from_slice(&bytes) {
            Ok(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(value))
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Dropping undecodable cache entry");
                self.backend.delete(key).await?;
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    /// Set a typed value in cache
    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        if !self.enabled {
            return Ok(());
        }
        let bytes =
            rmp_serde::to_vec_named(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.backend.set(key, bytes, ttl).await
    }

    /// Drop every entry, returning how many were removed
    pub async fn clear(&self) -> Result<u64, CacheError> {
        let removed = self.backend.clear().await?;
        tracing::info!(removed, "Cache cleared");
        Ok(removed)
    }

    pub async fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            enabled: self.enabled,
            backend: self.backend.backend_name().to_string(),
            entries: self.backend.entry_count().await,
            hits,
            misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 * 100.0 / lookups as f64
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> CacheConfig {
        CacheConfig {
            max_entries: 1000,
            ..Default::default()
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
    struct Entry {
        id: String,
        rows: Vec<serde_json::Value>,
    }

    #[tokio::test]
    async fn test_typed_get_set() {
        let service = CacheService::new(&test_config()).unwrap();
        let entry = Entry {
            id: "g1".into(),
            rows: vec![serde_json::json!({"day": "2024-01-01", "count": 3})],
        };

        service.set("k", &entry, None).await.unwrap();
        let fetched: Option<Entry> = service.get("k").await.unwrap();
        assert_eq!(fetched, Some(entry));
    }

    #[tokio::test]
    async fn test_hit_miss_counters() {
        let service = CacheService::new(&test_config()).unwrap();
        service.set("k", &1u32, None).await.unwrap();

        let _: Option<u32> = service.get("k").await.unwrap();
        let _: Option<u32> = service.get("missing").await.unwrap();

        let stats = service.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate, 50.0);
        assert_eq!(stats.entries, 1);
    }

    #[tokio::test]
    async fn test_disabled_cache_always_misses() {
        let service = CacheService::new(&CacheConfig {
            enabled: false,
            ..Default::default()
        })
        .unwrap();

        service.set("k", &1u32, None).await.unwrap();
        let value: Option<u32> = service.get("k").await.unwrap();
        assert_eq!(value, None);
        assert_eq!(service.stats().await.entries, 0);
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_a_miss() {
        let service = CacheService::new(&test_config()).unwrap();
        service.set("k", &"text", None).await.unwrap();

        let value: Option<Entry> = service.get("k").await.unwrap();
        assert_eq!(value, None);
        assert_eq!(service.stats().await.entries, 0);
    }

    #[tokio::test]
    async fn test_clear() {
        let service = CacheService::new(&test_config()).unwrap();
        service.set("a", &1u32, None).await.unwrap();
        service.set("b", &2u32, None).await.unwrap();

        assert_eq!(service.clear().await.unwrap(), 2);
        let value: Option<u32> = service.get("a").await.unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let result = CacheService::new(&CacheConfig {
            max_entries: 0,
            ..Default::default()
        });
        assert!(matches!(result, Err(CacheError::Config(_))));
    }
}
