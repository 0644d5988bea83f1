//! Response normalization
//!
//! Upstream rows arrive in whichever dialect the successful variant spoke.
//! Each canonical field is read from the first present, non-null name in a
//! fixed priority list, so any dialect maps to the same records.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

use super::records::{
    DeviceRecord, EntitySummary, GeoRecord, PollRecord, Records, StepRecord, TimeSeriesPoint,
    drop_off_rate,
};
use crate::data::pendo::{EntityKind, MetricFamily};

const UNKNOWN: &str = "Unknown";

const DATE_FIELDS: &[&str] = &[
    "day",
    "date",
    "eventTime",
    "serverTime",
    "browserTime",
    "timestamp",
];
const USER_FIELDS: &[&str] = &["numUsers", "visitorId", "uniqueVisitors", "users", "visitors"];
const VIEW_FIELDS: &[&str] = &["views", "numViews", "viewCount", "totalViews"];
const COMPLETION_FIELDS: &[&str] = &["completions", "numCompleted", "completed"];
const DISMISSAL_FIELDS: &[&str] = &["dismissals", "numDismissed", "dismissed"];
const STEP_INDEX_FIELDS: &[&str] = &["guideStepNum", "stepIndex", "stepNumber"];
const STEP_ID_FIELDS: &[&str] = &["guideStepId", "stepId"];
const DEVICE_FIELDS: &[&str] = &["deviceType", "device"];
const BROWSER_FIELDS: &[&str] = &["browserName", "browser"];
const OS_FIELDS: &[&str] = &["osName", "os", "operatingSystem"];
const COUNTRY_FIELDS: &[&str] = &["country", "countryName", "countryCode"];
const REGION_FIELDS: &[&str] = &["region", "regionName", "state"];
const POLL_ID_FIELDS: &[&str] = &["pollId"];
const RESPONSE_FIELDS: &[&str] = &["pollResponse", "response", "answer"];
const POLL_COUNT_FIELDS: &[&str] = &["count", "numResponses", "numUsers", "visitorId"];

const VIEW_EVENTS: &[&str] = &["guideSeen", "pageView", "featureClick"];
const COMPLETION_EVENTS: &[&str] = &["guideCompleted", "guideAdvanced"];
const DISMISSAL_EVENTS: &[&str] = &["guideDismissed"];

// =============================================================================
// Field Helpers
// =============================================================================

/// First present, non-null value among `names`
fn field<'a>(row: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|name| row.get(*name))
        .find(|v| !v.is_null())
}

fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

/// First parseable count among `names`
fn count_of(row: &Value, names: &[&str]) -> Option<u64> {
    names
        .iter()
        .filter_map(|name| row.get(*name))
        .find_map(as_count)
}

fn text_of(row: &Value, names: &[&str]) -> Option<String> {
    match field(row, names)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn text_or_unknown(row: &Value, names: &[&str]) -> String {
    text_of(row, names).unwrap_or_else(|| UNKNOWN.to_string())
}

fn timestamp_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

/// Parse epoch milliseconds, RFC 3339, or a `YYYY-MM-DD` prefix
pub fn parse_datetime(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(timestamp_millis),
        Value::String(s) => {
            let s = s.trim();
            if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
                return s.parse::<i64>().ok().and_then(timestamp_millis);
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            s.get(..10)
                .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
        }
        _ => None,
    }
}

pub fn parse_date(value: &Value) -> Option<NaiveDate> {
    parse_datetime(value).map(|dt| dt.date_naive())
}

fn row_date(row: &Value) -> Option<NaiveDate> {
    DATE_FIELDS
        .iter()
        .filter_map(|name| row.get(*name))
        .find_map(parse_date)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventBucket {
    View,
    Completion,
    Dismissal,
    Other,
}

fn event_bucket(row: &Value) -> Option<EventBucket> {
    let kind = row.get("type")?.as_str()?;
    Some(if VIEW_EVENTS.contains(&kind) {
        EventBucket::View
    } else if COMPLETION_EVENTS.contains(&kind) {
        EventBucket::Completion
    } else if DISMISSAL_EVENTS.contains(&kind) {
        EventBucket::Dismissal
    } else {
        EventBucket::Other
    })
}

// =============================================================================
// Normalizers
// =============================================================================

/// Map upstream rows into records for `family`
pub fn normalize(family: MetricFamily, rows: &[Value]) -> Records {
    match family {
        MetricFamily::TimeSeries => Records::TimeSeries(time_series(rows)),
        MetricFamily::Steps => Records::Steps(steps(rows)),
        MetricFamily::Devices => Records::Devices(devices(rows)),
        MetricFamily::Geography => Records::Geography(geography(rows)),
        MetricFamily::Polls => Records::Polls(polls(rows)),
    }
}

#[derive(Default)]
struct DayTotals {
    views: u64,
    completions: u64,
    dismissals: u64,
    unique_visitors: u64,
}

fn time_series(rows: &[Value]) -> Vec<TimeSeriesPoint> {
    let mut days: BTreeMap<NaiveDate, DayTotals> = BTreeMap::new();

    for row in rows {
        let Some(date) = row_date(row) else {
            tracing::debug!(row = %row, "Dropping time series row without a parseable date");
            continue;
        };
        let users = count_of(row, USER_FIELDS).unwrap_or(0);
        let views = count_of(row, VIEW_FIELDS);
        let completions = count_of(row, COMPLETION_FIELDS);
        let dismissals = count_of(row, DISMISSAL_FIELDS);
        let totals = days.entry(date).or_default();

        match event_bucket(row) {
            Some(EventBucket::View) => {
                totals.views = totals.views.saturating_add(views.unwrap_or(users));
                totals.unique_visitors = totals.unique_visitors.saturating_add(users);
            }
            Some(EventBucket::Completion) => {
                totals.completions = totals.completions.saturating_add(completions.unwrap_or(users));
            }
            Some(EventBucket::Dismissal) => {
                totals.dismissals = totals.dismissals.saturating_add(dismissals.unwrap_or(users));
            }
            Some(EventBucket::Other) => {}
            None => {
                totals.views = totals.views.saturating_add(views.unwrap_or(users));
                totals.completions = totals.completions.saturating_add(completions.unwrap_or(0));
                totals.dismissals = totals.dismissals.saturating_add(dismissals.unwrap_or(0));
                totals.unique_visitors = totals.unique_visitors.saturating_add(users);
            }
        }
    }

    days.into_iter()
        .map(|(date, t)| TimeSeriesPoint {
            date,
            views: t.views,
            completions: t.completions,
            dismissals: t.dismissals,
            unique_visitors: t.unique_visitors,
            drop_off_rate: drop_off_rate(t.views, t.completions),
        })
        .collect()
}

#[derive(Default)]
struct StepTotals {
    index: Option<u32>,
    id: Option<String>,
    viewed: u64,
    completed: u64,
}

fn steps(rows: &[Value]) -> Vec<StepRecord> {
    let mut merged: HashMap<String, StepTotals> = HashMap::new();

    for row in rows {
        let index = count_of(row, STEP_INDEX_FIELDS).and_then(|i| u32::try_from(i).ok());
        let id = text_of(row, STEP_ID_FIELDS);
        let key = match (index, &id) {
            (Some(i), _) => format!("#{}", i),
            (None, Some(id)) => id.clone(),
            (None, None) => {
                tracing::debug!(row = %row, "Dropping step row without an index or id");
                continue;
            }
        };

        let users = count_of(row, USER_FIELDS).unwrap_or(0);
        let views = count_of(row, VIEW_FIELDS);
        let completions = count_of(row, COMPLETION_FIELDS);
        let totals = merged.entry(key).or_default();
        totals.index = totals.index.or(index);
        if totals.id.is_none() {
            totals.id = id;
        }

        match event_bucket(row) {
            Some(EventBucket::View) => {
                totals.viewed = totals.viewed.saturating_add(views.unwrap_or(users));
            }
            Some(EventBucket::Completion) => {
                totals.completed = totals.completed.saturating_add(completions.unwrap_or(users));
            }
            Some(EventBucket::Dismissal | EventBucket::Other) => {}
            None => {
                totals.viewed = totals.viewed.saturating_add(views.unwrap_or(users));
                totals.completed = totals.completed.saturating_add(completions.unwrap_or(0));
            }
        }
    }

    let mut steps: Vec<StepTotals> = merged.into_values().collect();
    steps.sort_by(|a, b| {
        (a.index.is_none(), a.index, &a.id).cmp(&(b.index.is_none(), b.index, &b.id))
    });

    steps
        .into_iter()
        .enumerate()
        .map(|(position, s)| StepRecord {
            step_index: s.index.unwrap_or(position as u32 + 1),
            step_id: s.id,
            viewed: s.viewed,
            completed: s.completed,
            drop_off_rate: drop_off_rate(s.viewed, s.completed),
        })
        .collect()
}

fn devices(rows: &[Value]) -> Vec<DeviceRecord> {
    let mut merged: HashMap<(String, String, String), u64> = HashMap::new();
    for row in rows {
        let key = (
            text_or_unknown(row, DEVICE_FIELDS),
            text_or_unknown(row, BROWSER_FIELDS),
            text_or_unknown(row, OS_FIELDS),
        );
        let total = merged.entry(key).or_default();
        *total = total.saturating_add(count_of(row, USER_FIELDS).unwrap_or(0));
    }

    let mut records: Vec<DeviceRecord> = merged
        .into_iter()
        .map(|((device, browser, os), users)| DeviceRecord {
            device,
            browser,
            os,
            users,
        })
        .collect();
    records.sort_by(|a, b| {
        b.users
            .cmp(&a.users)
            .then_with(|| (&a.device, &a.browser, &a.os).cmp(&(&b.device, &b.browser, &b.os)))
    });
    records
}

fn geography(rows: &[Value]) -> Vec<GeoRecord> {
    let mut merged: HashMap<(String, String), u64> = HashMap::new();
    for row in rows {
        let key = (
            text_or_unknown(row, COUNTRY_FIELDS),
            text_or_unknown(row, REGION_FIELDS),
        );
        let total = merged.entry(key).or_default();
        *total = total.saturating_add(count_of(row, USER_FIELDS).unwrap_or(0));
    }

    let mut records: Vec<GeoRecord> = merged
        .into_iter()
        .map(|((country, region), users)| GeoRecord {
            country,
            region,
            users,
        })
        .collect();
    records.sort_by(|a, b| {
        b.users
            .cmp(&a.users)
            .then_with(|| (&a.country, &a.region).cmp(&(&b.country, &b.region)))
    });
    records
}

fn polls(rows: &[Value]) -> Vec<PollRecord> {
    let mut merged: BTreeMap<(String, String), u64> = BTreeMap::new();
    for row in rows {
        let key = (
            text_or_unknown(row, POLL_ID_FIELDS),
            text_or_unknown(row, RESPONSE_FIELDS),
        );
        let total = merged.entry(key).or_default();
        *total = total.saturating_add(count_of(row, POLL_COUNT_FIELDS).unwrap_or(0));
    }

    let mut records: Vec<PollRecord> = merged
        .into_iter()
        .map(|((poll_id, response), count)| PollRecord {
            poll_id,
            response,
            count,
        })
        .collect();
    records.sort_by(|a, b| a.poll_id.cmp(&b.poll_id).then(b.count.cmp(&a.count)));
    records
}

/// Map an entity listing into summaries; rows without an id are skipped
pub fn normalize_entities(kind: EntityKind, rows: &[Value]) -> Vec<EntitySummary> {
    rows.iter()
        .filter_map(|row| {
            let id = text_of(row, &["id", kind.id_field()])?;
            Some(EntitySummary {
                name: text_of(row, &["name", "title"]).unwrap_or_else(|| id.clone()),
                kind,
                state: text_of(row, &["state", "status"]),
                last_updated: field(row, &["lastUpdatedAt", "updatedAt", "lastUpdated"])
                    .and_then(parse_datetime),
                id,
            })
        })
        .collect()
}
