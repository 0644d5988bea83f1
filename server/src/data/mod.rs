//! Data access layer
//!
//! - `pendo` - Upstream analytics API client primitives
//! - `cache` - In-memory response cache

pub mod cache;
pub mod pendo;

pub use cache::{CacheError, CacheService};
pub use pendo::UpstreamError;
