//! Request variants
//!
//! The upstream API accepts the same logical question in several shapes and
//! field dialects, and which one a tenant answers varies. Each logical query
//! expands into an ordered list of concrete requests that are tried in turn.

use std::fmt;

use serde::Serialize;
use serde_json::{Value, json};

use super::query::{AnalyticsQuery, EntityKind, MetricFamily, ResourceClass};
use crate::core::constants::AGGREGATION_PATH;

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => f.write_str("GET"),
            Self::Post => f.write_str("POST"),
        }
    }
}

/// Field naming convention used when building a request body
#[derive(Debug, Clone, Copy)]
pub struct Dialect {
    pub time_field: &'static str,
    pub user_field: &'static str,
    pub step_field: &'static str,
    pub duration_field: &'static str,
}

impl Dialect {
    pub const CANONICAL: Dialect = Dialect {
        time_field: "eventTime",
        user_field: "visitorId",
        step_field: "guideStepId",
        duration_field: "duration",
    };

    pub const SERVER_TIME: Dialect = Dialect {
        time_field: "serverTime",
        user_field: "numUsers",
        step_field: "guideStepNum",
        duration_field: "timeOnPage",
    };
}

/// One concrete upstream request
#[derive(Debug, Clone, PartialEq)]
pub struct RequestVariant {
    /// Stable name reported in attempt logs and results
    pub label: String,
    pub method: HttpMethod,
    pub path: String,
    /// Trailing path segments, percent-encoded when the URL is built
    pub segments: Vec<String>,
    /// Query parameters (GET only)
    pub params: Vec<(String, Value)>,
    /// JSON body (POST only)
    pub body: Option<Value>,
    pub resource: ResourceClass,
}

impl RequestVariant {
    pub fn get(
        label: impl Into<String>,
        path: impl Into<String>,
        params: Vec<(String, Value)>,
        resource: ResourceClass,
    ) -> Self {
        Self {
            label: label.into(),
            method: HttpMethod::Get,
            path: path.into(),
            segments: Vec::new(),
            params,
            body: None,
            resource,
        }
    }

    pub fn post(
        label: impl Into<String>,
        path: impl Into<String>,
        body: Value,
        resource: ResourceClass,
    ) -> Self {
        Self {
            label: label.into(),
            method: HttpMethod::Post,
            path: path.into(),
            segments: Vec::new(),
            params: Vec::new(),
            body: Some(body),
            resource,
        }
    }

    fn with_segments<I, S>(mut self, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.segments = segments.into_iter().map(Into::into).collect();
        self
    }
}

// =============================================================================
// Variant Builders
// =============================================================================

/// Listing request for an entity kind
pub fn entity_list_variant(kind: EntityKind) -> RequestVariant {
    RequestVariant::get(
        format!("{}-list", kind),
        kind.list_path(),
        Vec::new(),
        ResourceClass::Entities,
    )
}

/// Ordered variants for an analytics query
///
/// Reports try their stored results first. Every other kind starts with the
/// canonical aggregation body, then the same body as GET parameters, then the
/// server-time dialect, and finally the flat legacy shape.
pub fn variants_for(query: &AnalyticsQuery) -> Vec<RequestVariant> {
    let mut variants = Vec::with_capacity(4);

    if query.kind == EntityKind::Report {
        variants.push(
            RequestVariant::get(
                "report-results",
                "/api/v1/report",
                Vec::new(),
                ResourceClass::Reports,
            )
            .with_segments([query.entity_id.as_str(), "results.json"]),
        );
        variants.push(RequestVariant::post(
            "canonical-post",
            AGGREGATION_PATH,
            aggregation_body(query, Dialect::CANONICAL),
            ResourceClass::Aggregation,
        ));
        variants.push(RequestVariant::post(
            "server-time-post",
            AGGREGATION_PATH,
            aggregation_body(query, Dialect::SERVER_TIME),
            ResourceClass::Aggregation,
        ));
        return variants;
    }

    let canonical = aggregation_body(query, Dialect::CANONICAL);
    let get_params = match &canonical {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        _ => Vec::new(),
    };

    variants.push(RequestVariant::post(
        "canonical-post",
        AGGREGATION_PATH,
        canonical,
        ResourceClass::Aggregation,
    ));
    variants.push(RequestVariant::get(
        "canonical-get",
        AGGREGATION_PATH,
        get_params,
        ResourceClass::Aggregation,
    ));
    variants.push(RequestVariant::post(
        "server-time-post",
        AGGREGATION_PATH,
        aggregation_body(query, Dialect::SERVER_TIME),
        ResourceClass::Aggregation,
    ));
    variants.push(RequestVariant::post(
        "legacy-flat-post",
        AGGREGATION_PATH,
        legacy_body(query),
        ResourceClass::Aggregation,
    ));

    variants
}

// =============================================================================
// Request Bodies
// =============================================================================

fn aggregation_body(query: &AnalyticsQuery, dialect: Dialect) -> Value {
    json!({
        "response": { "mimeType": "application/json" },
        "request": {
            "requestId": request_id(query),
            "pipeline": pipeline(query, dialect),
        }
    })
}

fn request_id(query: &AnalyticsQuery) -> String {
    format!("{}-{}-{}", query.kind, query.family, uuid::Uuid::new_v4())
}

fn time_series_window(query: &AnalyticsQuery) -> Value {
    json!({
        "period": "dayRange",
        "first": query.period.start_millis(),
        "count": query.period.days(),
    })
}

fn pipeline(query: &AnalyticsQuery, dialect: Dialect) -> Vec<Value> {
    let source_name = match query.family {
        MetricFamily::Polls => "pollEvents",
        _ => query.kind.event_source(),
    };

    let mut stages = vec![json!({
        "source": {
            source_name: { query.kind.id_field(): query.entity_id },
            "timeSeries": time_series_window(query),
        }
    })];

    let user_count = json!({ dialect.user_field: { "count": "visitorId" } });

    match query.family {
        MetricFamily::TimeSeries => {
            let mut fields = vec![user_count];
            if matches!(query.kind, EntityKind::Page | EntityKind::Feature) {
                fields.push(json!({ dialect.duration_field: { "sum": dialect.duration_field } }));
            }
            stages.push(json!({ "group": { "group": ["day", "type"], "fields": fields } }));
            stages.push(json!({ "select": {
                dialect.time_field: "day",
                "type": "type",
                dialect.user_field: dialect.user_field,
            }}));
            stages.push(json!({ "sort": [dialect.time_field] }));
        }
        MetricFamily::Steps => {
            stages.push(json!({
                "group": { "group": [dialect.step_field, "type"], "fields": [user_count] }
            }));
            stages.push(json!({ "sort": [dialect.step_field] }));
        }
        MetricFamily::Devices => {
            stages.push(json!({
                "group": {
                    "group": ["deviceType", "browserName", "osName"],
                    "fields": [user_count],
                }
            }));
        }
        MetricFamily::Geography => {
            stages.push(json!({
                "group": { "group": ["country", "region"], "fields": [user_count] }
            }));
        }
        MetricFamily::Polls => {
            stages.push(json!({
                "group": {
                    "group": ["pollId", "pollResponse"],
                    "fields": [{ "count": { "count": null } }],
                }
            }));
        }
    }

    stages
}

/// Flat shape accepted by older tenants
fn legacy_body(query: &AnalyticsQuery) -> Value {
    let group_by: Vec<&str> = match query.family {
        MetricFamily::TimeSeries => vec!["day", "type"],
        MetricFamily::Steps => vec![Dialect::CANONICAL.step_field, "type"],
        MetricFamily::Devices => vec!["deviceType", "browserName", "osName"],
        MetricFamily::Geography => vec!["country", "region"],
        MetricFamily::Polls => vec!["pollId", "pollResponse"],
    };

    json!({
        "source": query.kind.legacy_source(),
        "filter": format!(
            "{}=='{}'",
            query.kind.id_field(),
            query.entity_id.replace('\'', "\\'")
        ),
        "timeSeries": time_series_window(query),
        "groupBy": group_by,
        "requestId": request_id(query),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::pendo::query::Period;
    use chrono::NaiveDate;

    fn query(kind: EntityKind, family: MetricFamily) -> AnalyticsQuery {
        let period = Period::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 30).unwrap(),
        )
        .unwrap();
        AnalyticsQuery::new(kind, "abc123", period, family).unwrap()
    }

    fn labels(variants: &[RequestVariant]) -> Vec<&str> {
        variants.iter().map(|v| v.label.as_str()).collect()
    }

    #[test]
    fn test_guide_variant_order() {
        let variants = variants_for(&query(EntityKind::Guide, MetricFamily::TimeSeries));
        assert_eq!(
            labels(&variants),
            vec![
                "canonical-post",
                "canonical-get",
                "server-time-post",
                "legacy-flat-post"
            ]
        );
        assert!(
            variants
                .iter()
                .all(|v| v.resource == ResourceClass::Aggregation)
        );
        assert_eq!(variants[2].label, "server-time-post");
    }

    #[test]
    fn test_report_tries_stored_results_first() {
        let variants = variants_for(&query(EntityKind::Report, MetricFamily::TimeSeries));
        assert_eq!(variants[0].label, "report-results");
        assert_eq!(variants[0].path, "/api/v1/report");
        assert_eq!(variants[0].segments, vec!["abc123", "results.json"]);
        assert_eq!(variants[0].resource, ResourceClass::Reports);
        assert_eq!(variants[1].resource, ResourceClass::Aggregation);
    }

    #[test]
    fn test_canonical_pipeline_shape() {
        let variants = variants_for(&query(EntityKind::Guide, MetricFamily::TimeSeries));
        let body = variants[0].body.as_ref().unwrap();
        let pipeline = body["request"]["pipeline"].as_array().unwrap();

        let source = &pipeline[0]["source"];
        assert_eq!(source["guideEvents"]["guideId"], "abc123");
        assert_eq!(source["timeSeries"]["first"], 1_704_067_200_000i64);
        assert_eq!(source["timeSeries"]["count"], 30);
        assert_eq!(pipeline[2]["select"]["eventTime"], "day");
        assert_eq!(body["response"]["mimeType"], "application/json");
    }

    #[test]
    fn test_get_variant_carries_body_as_params() {
        let variants = variants_for(&query(EntityKind::Page, MetricFamily::Devices));
        let get = &variants[1];
        assert_eq!(get.method, HttpMethod::Get);
        assert!(get.body.is_none());
        let names: Vec<&str> = get.params.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["response", "request"]);
    }

    #[test]
    fn test_server_time_dialect_fields() {
        let variants = variants_for(&query(EntityKind::Guide, MetricFamily::Steps));
        let body = variants[2].body.as_ref().unwrap();
        let group = &body["request"]["pipeline"][1]["group"];
        assert_eq!(group["group"][0], "guideStepNum");
        assert!(group["fields"][0].get("numUsers").is_some());
    }

    #[test]
    fn test_legacy_filter_escapes_quotes() {
        let period = Period::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        )
        .unwrap();
        let q = AnalyticsQuery::new(EntityKind::Feature, "it's", period, MetricFamily::Geography)
            .unwrap();
        let body = legacy_body(&q);
        assert_eq!(body["filter"], "featureId=='it\\'s'");
        assert_eq!(body["source"], "featureEvent");
        assert_eq!(body["groupBy"][0], "country");
    }

    #[test]
    fn test_polls_use_poll_source() {
        let variants = variants_for(&query(EntityKind::Guide, MetricFamily::Polls));
        let body = variants[0].body.as_ref().unwrap();
        assert!(body["request"]["pipeline"][0]["source"]["pollEvents"].is_object());
    }

    #[test]
    fn test_entity_list_variant() {
        let variant = entity_list_variant(EntityKind::Feature);
        assert_eq!(variant.path, "/api/v1/feature");
        assert_eq!(variant.method, HttpMethod::Get);
        assert_eq!(variant.resource, ResourceClass::Entities);
    }
}
