//! Logical query types
//!
//! A logical query names what the dashboard wants (an entity, a period and a
//! metric family). Request variants translate it into upstream calls.

use std::fmt;
use std::str::FromStr;

use chrono::{Days, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::error::UpstreamError;
use crate::core::constants::{DEFAULT_PERIOD_DAYS, MAX_PERIOD_DAYS};

// =============================================================================
// Entity Kind
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Guide,
    Feature,
    Page,
    Report,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [Self::Guide, Self::Feature, Self::Page, Self::Report];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Guide => "guide",
            Self::Feature => "feature",
            Self::Page => "page",
            Self::Report => "report",
        }
    }

    /// Listing endpoint
    pub fn list_path(&self) -> String {
        format!("/api/v1/{}", self.as_str())
    }

    /// Field naming the entity inside event sources and filters
    pub fn id_field(&self) -> &'static str {
        match self {
            Self::Guide => "guideId",
            Self::Feature => "featureId",
            Self::Page => "pageId",
            Self::Report => "reportId",
        }
    }

    /// Aggregation event source for this kind
    pub fn event_source(&self) -> &'static str {
        match self {
            Self::Guide => "guideEvents",
            Self::Feature => "featureEvents",
            Self::Page => "pageEvents",
            Self::Report => "events",
        }
    }

    /// Event source name used by the flat request shape
    pub fn legacy_source(&self) -> &'static str {
        match self {
            Self::Guide => "guideEvent",
            Self::Feature => "featureEvent",
            Self::Page => "pageEvent",
            Self::Report => "event",
        }
    }

    /// Whether a metric family can be computed for this kind
    pub fn supports(&self, family: MetricFamily) -> bool {
        match (self, family) {
            (_, MetricFamily::TimeSeries) => true,
            (Self::Report, _) => false,
            (Self::Guide, _) => true,
            (_, MetricFamily::Steps | MetricFamily::Polls) => false,
            (_, MetricFamily::Devices | MetricFamily::Geography) => true,
        }
    }

    /// Families supported by this kind, in display order
    pub fn families(&self) -> Vec<MetricFamily> {
        MetricFamily::ALL
            .into_iter()
            .filter(|f| self.supports(*f))
            .collect()
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = UpstreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().trim_end_matches('s') {
            "guide" => Ok(Self::Guide),
            "feature" => Ok(Self::Feature),
            "page" => Ok(Self::Page),
            "report" => Ok(Self::Report),
            _ => Err(UpstreamError::Unsupported(format!(
                "unknown entity kind '{}'. Valid: guide, feature, page, report",
                s
            ))),
        }
    }
}

// =============================================================================
// Metric Family
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MetricFamily {
    TimeSeries,
    Steps,
    Devices,
    Geography,
    Polls,
}

impl MetricFamily {
    pub const ALL: [MetricFamily; 5] = [
        Self::TimeSeries,
        Self::Steps,
        Self::Devices,
        Self::Geography,
        Self::Polls,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TimeSeries => "time_series",
            Self::Steps => "steps",
            Self::Devices => "devices",
            Self::Geography => "geography",
            Self::Polls => "polls",
        }
    }
}

impl fmt::Display for MetricFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricFamily {
    type Err = UpstreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "time_series" | "timeseries" => Ok(Self::TimeSeries),
            "steps" | "step_breakdown" => Ok(Self::Steps),
            "devices" | "device_breakdown" => Ok(Self::Devices),
            "geography" | "geo" => Ok(Self::Geography),
            "polls" => Ok(Self::Polls),
            _ => Err(UpstreamError::Unsupported(format!(
                "unknown metric family '{}'. Valid: time_series, steps, devices, geography, polls",
                s
            ))),
        }
    }
}

// =============================================================================
// Resource Class
// =============================================================================

/// Upstream resource class; each has its own breaker, bucket and counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResourceClass {
    Entities,
    Aggregation,
    Reports,
}

impl ResourceClass {
    pub const ALL: [ResourceClass; 3] = [Self::Entities, Self::Aggregation, Self::Reports];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entities => "entities",
            Self::Aggregation => "aggregation",
            Self::Reports => "reports",
        }
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Period
// =============================================================================

/// Inclusive date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, UpstreamError> {
        if start > end {
            return Err(UpstreamError::Unsupported(format!(
                "period start {} is after end {}",
                start, end
            )));
        }
        let period = Self { start, end };
        if period.days() > MAX_PERIOD_DAYS {
            return Err(UpstreamError::Unsupported(format!(
                "period spans {} days; the maximum is {}",
                period.days(),
                MAX_PERIOD_DAYS
            )));
        }
        Ok(period)
    }

    /// The `days` days ending on `today` (inclusive)
    pub fn last_days(days: u32, today: NaiveDate) -> Result<Self, UpstreamError> {
        let days = days.max(1);
        let start = today
            .checked_sub_days(Days::new(u64::from(days - 1)))
            .ok_or_else(|| UpstreamError::Unsupported("period start out of range".into()))?;
        Self::new(start, today)
    }

    /// Default reporting window ending today (UTC)
    pub fn default_window() -> Self {
        let today = chrono::Utc::now().date_naive();
        Self::last_days(DEFAULT_PERIOD_DAYS, today).unwrap_or(Self {
            start: today,
            end: today,
        })
    }

    /// Number of days covered, inclusive
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Start of the first day in epoch milliseconds (UTC)
    pub fn start_millis(&self) -> i64 {
        self.start
            .and_time(NaiveTime::MIN)
            .and_utc()
            .timestamp_millis()
    }

    /// Every date in the period, ascending
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start.iter_days().take_while(move |d| *d <= self.end)
    }
}

// =============================================================================
// Analytics Query
// =============================================================================

/// One logical analytics request, immutable once built
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, ToSchema)]
pub struct AnalyticsQuery {
    pub kind: EntityKind,
    pub entity_id: String,
    pub period: Period,
    pub family: MetricFamily,
}

impl AnalyticsQuery {
    pub fn new(
        kind: EntityKind,
        entity_id: impl Into<String>,
        period: Period,
        family: MetricFamily,
    ) -> Result<Self, UpstreamError> {
        let entity_id = entity_id.into().trim().to_string();
        if entity_id.is_empty() {
            return Err(UpstreamError::Unsupported("entity id must not be empty".into()));
        }
        if matches!(entity_id.as_str(), "." | "..") {
            return Err(UpstreamError::Unsupported(format!(
                "'{}' is not a valid entity id",
                entity_id
            )));
        }
        if !kind.supports(family) {
            return Err(UpstreamError::Unsupported(format!(
                "{} analytics are not available for {}s",
                family, kind
            )));
        }
        Ok(Self {
            kind,
            entity_id,
            period,
            family,
        })
    }

    /// Parameters identifying this query for caching
    pub fn cache_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("kind", self.kind.as_str().to_string()),
            ("id", self.entity_id.clone()),
            ("family", self.family.as_str().to_string()),
            ("start", self.period.start.to_string()),
            ("end", self.period.end.to_string()),
        ]
    }
}
