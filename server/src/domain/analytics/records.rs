//! Normalized analytics records

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::data::pendo::{EntityKind, MetricFamily};

/// Where a result's data came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// Rows returned by the upstream API
    Real,
    /// Upstream answered but had no data for the period
    Empty,
    /// Locally generated placeholder values
    Synthetic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TimeSeriesPoint {
    pub date: NaiveDate,
    pub views: u64,
    pub completions: u64,
    pub dismissals: u64,
    pub unique_visitors: u64,
    pub drop_off_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StepRecord {
    pub step_index: u32,
    pub step_id: Option<String>,
    pub viewed: u64,
    pub completed: u64,
    pub drop_off_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DeviceRecord {
    pub device: String,
    pub browser: String,
    pub os: String,
    pub users: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeoRecord {
    pub country: String,
    pub region: String,
    pub users: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PollRecord {
    pub poll_id: String,
    pub response: String,
    pub count: u64,
}

/// Records for one metric family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "family", content = "records", rename_all = "snake_case")]
pub enum Records {
    TimeSeries(Vec<TimeSeriesPoint>),
    Steps(Vec<StepRecord>),
    Devices(Vec<DeviceRecord>),
    Geography(Vec<GeoRecord>),
    Polls(Vec<PollRecord>),
}

impl Records {
    pub fn empty(family: MetricFamily) -> Self {
        match family {
            MetricFamily::TimeSeries => Self::TimeSeries(Vec::new()),
            MetricFamily::Steps => Self::Steps(Vec::new()),
            MetricFamily::Devices => Self::Devices(Vec::new()),
            MetricFamily::Geography => Self::Geography(Vec::new()),
            MetricFamily::Polls => Self::Polls(Vec::new()),
        }
    }

    pub fn family(&self) -> MetricFamily {
        match self {
            Self::TimeSeries(_) => MetricFamily::TimeSeries,
            Self::Steps(_) => MetricFamily::Steps,
            Self::Devices(_) => MetricFamily::Devices,
            Self::Geography(_) => MetricFamily::Geography,
            Self::Polls(_) => MetricFamily::Polls,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::TimeSeries(r) => r.len(),
            Self::Steps(r) => r.len(),
            Self::Devices(r) => r.len(),
            Self::Geography(r) => r.len(),
            Self::Polls(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Entity listing entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EntitySummary {
    pub id: String,
    pub name: String,
    pub kind: EntityKind,
    pub state: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Share of viewers that did not complete, as a percentage rounded to 2 places
pub fn drop_off_rate(viewed: u64, completed: u64) -> f64 {
    let lost = viewed.saturating_sub(completed) as f64;
    let rate = lost / viewed.max(1) as f64 * 100.0;
    (rate * 100.0).round() / 100.0
}
