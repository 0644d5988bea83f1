//! Domain logic for upstream analytics
//!
//! - `analytics` - Query facade, variant runner, normalization and fallback
//! - `resilience` - Circuit breaker, token bucket, retry and health

pub mod analytics;
pub mod resilience;

pub use analytics::AnalyticsClient;
pub use resilience::{HealthReport, HealthStatus};
