//! Analytics client
//!
//! - `client` - Facade combining cache, variants, resilience and fallback
//! - `runner` - Ordered variant attempts
//! - `normalize` - Upstream rows to normalized records
//! - `fallback` - Synthetic placeholder data
//! - `records` - Normalized record types

pub mod client;
pub mod fallback;
pub mod normalize;
pub mod records;
pub mod runner;

pub use client::{AnalyticsClient, AnalyticsResult, EntityPage, MetricsSnapshot, Overview};
pub use records::{
    DataSource, DeviceRecord, EntitySummary, GeoRecord, PollRecord, Records, StepRecord,
    TimeSeriesPoint,
};
pub use runner::AttemptRecord;
