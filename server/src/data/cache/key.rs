//! Versioned cache key builder

use crate::core::constants::CACHE_KEY_VERSION;
use crate::data::pendo::EntityKind;

/// Cache key builder
///
/// All keys carry a version prefix so a format change invalidates old entries.
pub struct CacheKey;

impl CacheKey {
    /// Key for an upstream response, independent of parameter order
    ///
    /// Parameters are sorted and hashed; the first 16 hex chars of the md5
    /// digest keep keys short.
    pub fn upstream<K, V>(endpoint: &str, params: &[(K, V)]) -> String
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut pairs: Vec<(&str, &str)> = params
            .iter()
            .map(|(k, v)| (k.as_ref(), v.as_ref()))
            .collect();
        pairs.sort_unstable();

        let canonical = pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        let digest = format!("{:x}", md5::compute(canonical.as_bytes()));

        format!(
            "{}:upstream:{}:{}",
            CACHE_KEY_VERSION,
            endpoint,
            &digest[..16]
        )
    }

    /// Key for an entity listing
    pub fn entities(kind: EntityKind) -> String {
        format!("{}:entities:{}", CACHE_KEY_VERSION, kind)
    }
}
