//! Pendo upstream access
//!
//! - `query` - Logical query types (entity kind, period, metric family)
//! - `variants` - Concrete request shapes for each logical query
//! - `transport` - Single-attempt HTTP calls and outcome classification
//! - `error` - Upstream error taxonomy

pub mod error;
pub mod query;
pub mod transport;
pub mod variants;

#[cfg(test)]
pub mod testing;

pub use error::{RateLimitOrigin, UpstreamError};
pub use query::{AnalyticsQuery, EntityKind, MetricFamily, Period, ResourceClass};
pub use transport::{FailureReason, HttpTransport, Payload, Transport, UpstreamOutcome};
pub use variants::{RequestVariant, entity_list_variant, variants_for};
