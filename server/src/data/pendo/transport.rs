//! Upstream transport
//!
//! Sends exactly one HTTP request per call and classifies the response into
//! an [`UpstreamOutcome`]. No retries happen at this layer.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use reqwest::header::{ACCEPT, CONTENT_TYPE, ETAG, HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{RateLimitOrigin, UpstreamError};
use super::variants::{HttpMethod, RequestVariant};
use crate::core::config::PendoConfig;
use crate::core::constants::{
    DEFAULT_UPSTREAM_RETRY_AFTER_MS, MAX_ERROR_BODY_BYTES, MAX_RETRY_AFTER_SECS,
    PENDO_API_KEY_HEADER, RETRYABLE_STATUSES, USER_AGENT,
};
use crate::utils::string::truncate_bytes;

// =============================================================================
// Outcome Types
// =============================================================================

/// Rows returned by a successful call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub rows: Vec<Value>,
    pub etag: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Network,
    Timeout,
    Status,
    Decode,
    Request,
}

/// Why an attempt failed
#[derive(Debug, Clone, PartialEq)]
pub struct FailureReason {
    pub kind: FailureKind,
    pub message: String,
    pub status: Option<u16>,
    pub retry_after: Option<Duration>,
    /// Response body text for HTTP failures (truncated)
    pub body: Option<String>,
}

impl FailureReason {
    pub fn network(message: impl Into<String>) -> Self {
        Self::simple(FailureKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::simple(FailureKind::Timeout, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::simple(FailureKind::Decode, message)
    }

    pub fn request(message: impl Into<String>) -> Self {
        Self::simple(FailureKind::Request, message)
    }

    pub fn status(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        let body = truncate_bytes(body.trim(), MAX_ERROR_BODY_BYTES);
        Self {
            kind: FailureKind::Status,
            message: format!("HTTP {}", status),
            status: Some(status),
            retry_after,
            body: Some(body),
        }
    }

    fn simple(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            retry_after: None,
            body: None,
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        self.status == Some(429)
    }

    /// Convert into the error surfaced to callers
    pub fn into_error(self) -> UpstreamError {
        match self.kind {
            FailureKind::Status if self.is_rate_limit() => UpstreamError::RateLimited {
                retry_after: self
                    .retry_after
                    .unwrap_or(Duration::from_millis(DEFAULT_UPSTREAM_RETRY_AFTER_MS))
                    .min(Duration::from_secs(MAX_RETRY_AFTER_SECS)),
                origin: RateLimitOrigin::Upstream,
            },
            FailureKind::Status => UpstreamError::Http {
                status: self.status.unwrap_or_default(),
                body: self.body.unwrap_or_default(),
            },
            FailureKind::Network | FailureKind::Timeout => UpstreamError::Transport(self.message),
            FailureKind::Decode => UpstreamError::Decode(self.message),
            FailureKind::Request => UpstreamError::Config(self.message),
        }
    }
}

/// Result of one transport attempt
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamOutcome {
    Success(Payload),
    Empty,
    Retryable(FailureReason),
    Fatal(FailureReason),
}

impl UpstreamOutcome {
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Empty => "empty",
            Self::Retryable(_) => "retryable",
            Self::Fatal(_) => "fatal",
        }
    }

    /// Success and empty results both count as a healthy upstream
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Success(_) | Self::Empty)
    }
}

/// Classify an HTTP response
pub fn classify_response(
    status: u16,
    body: &str,
    retry_after: Option<Duration>,
    etag: Option<String>,
) -> UpstreamOutcome {
    if (200..300).contains(&status) {
        if body.trim().is_empty() {
            return UpstreamOutcome::Empty;
        }
        return match serde_json::from_str::<Value>(body) {
            Ok(value) => match extract_rows(value) {
                Some(rows) if !rows.is_empty() => UpstreamOutcome::Success(Payload { rows, etag }),
                _ => UpstreamOutcome::Empty,
            },
            Err(e) => UpstreamOutcome::Fatal(FailureReason::decode(format!(
                "invalid JSON in {} response: {}",
                status, e
            ))),
        };
    }

    let reason = FailureReason::status(status, body, retry_after);
    if RETRYABLE_STATUSES.contains(&status) {
        UpstreamOutcome::Retryable(reason)
    } else {
        UpstreamOutcome::Fatal(reason)
    }
}

/// Pull the result collection out of a response document
fn extract_rows(value: Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(rows) => Some(rows),
        Value::Object(mut map) => match map.remove("results") {
            Some(Value::Array(rows)) => Some(rows),
            _ => None,
        },
        _ => None,
    }
}

/// Parse a Retry-After header: delta seconds (integer or fractional) or an HTTP date
///
/// Values beyond [`MAX_RETRY_AFTER_SECS`] are clamped to it.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let max = Duration::from_secs(MAX_RETRY_AFTER_SECS);
    let value = value.trim();
    if let Ok(secs) = value.parse::<f64>() {
        if secs.is_nan() || secs < 0.0 {
            return None;
        }
        return Some(Duration::try_from_secs_f64(secs).map_or(max, |d| d.min(max)));
    }
    let at = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = at.with_timezone(&chrono::Utc) - chrono::Utc::now();
    Some(delta.to_std().unwrap_or(Duration::ZERO).min(max))
}

// =============================================================================
// Transport Trait
// =============================================================================

/// One upstream call per invocation
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, variant: &RequestVariant) -> UpstreamOutcome;
}

// =============================================================================
// HTTP Transport
// =============================================================================

/// reqwest-backed transport for the Pendo REST API
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(config: &PendoConfig) -> Result<Self, UpstreamError> {
        let mut key = HeaderValue::from_str(config.api_key.expose())
            .map_err(|_| UpstreamError::Config("API key contains invalid characters".into()))?;
        key.set_sensitive(true);

        let key_header = HeaderName::from_bytes(PENDO_API_KEY_HEADER.as_bytes())
            .map_err(|e| UpstreamError::Config(format!("invalid key header name: {}", e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(key_header, key);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| UpstreamError::Config(format!("failed to build HTTP client: {}", e)))?;

        let base_url = Url::parse(&config.base_url).map_err(|e| {
            UpstreamError::Config(format!("invalid base URL '{}': {}", config.base_url, e))
        })?;

        tracing::debug!(
            base_url = %base_url,
            timeout_secs = config.timeout.as_secs(),
            "Upstream HTTP transport initialized"
        );

        Ok(Self { client, base_url })
    }

    /// Resolve the variant's path and encode GET parameters
    fn build_url(&self, variant: &RequestVariant) -> Result<Url, UpstreamError> {
        let mut url = self
            .base_url
            .join(&variant.path)
            .map_err(|e| UpstreamError::Config(format!("invalid path '{}': {}", variant.path, e)))?;

        if !variant.segments.is_empty() {
            url.path_segments_mut()
                .map_err(|_| {
                    UpstreamError::Config(format!("base URL cannot take a path: {}", self.base_url))
                })?
                .pop_if_empty()
                .extend(&variant.segments);
        }

        if variant.method == HttpMethod::Get && !variant.params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &variant.params {
                pairs.append_pair(name, &encode_param(value));
            }
        }
        Ok(url)
    }
}

/// Objects and arrays travel as JSON text; scalars as their plain text
fn encode_param(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, variant: &RequestVariant) -> UpstreamOutcome {
        let url = match self.build_url(variant) {
            Ok(url) => url,
            Err(e) => return UpstreamOutcome::Fatal(FailureReason::request(e.to_string())),
        };

        tracing::trace!(method = %variant.method, url = %url, variant = %variant.label, "Sending upstream request");

        let request = match variant.method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => {
                let body = variant.body.clone().unwrap_or(Value::Object(Default::default()));
                self.client.post(url).json(&body)
            }
        };

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return UpstreamOutcome::Retryable(FailureReason::timeout(e.to_string()));
            }
            Err(e) if e.is_builder() => {
                return UpstreamOutcome::Fatal(FailureReason::request(e.to_string()));
            }
            Err(e) => return UpstreamOutcome::Retryable(FailureReason::network(e.to_string())),
        };

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) if e.is_timeout() => {
                return UpstreamOutcome::Retryable(FailureReason::timeout(e.to_string()));
            }
            Err(e) => return UpstreamOutcome::Retryable(FailureReason::network(e.to_string())),
        };

        classify_response(status, &body, retry_after, etag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ApiKey;
    use crate::data::pendo::query::{AnalyticsQuery, EntityKind, MetricFamily, Period};
    use crate::data::pendo::variants::{entity_list_variant, variants_for};
    use chrono::NaiveDate;
    use httpmock::Method::{GET, POST};
    use httpmock::MockServer;
    use serde_json::json;

    fn transport_for(server: &MockServer) -> HttpTransport {
        HttpTransport::new(&PendoConfig {
            base_url: server.base_url(),
            api_key: ApiKey::new("test-key"),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn test_classify_success_array() {
        let outcome = classify_response(200, r#"[{"id": "g1"}]"#, None, Some("\"abc\"".into()));
        match outcome {
            UpstreamOutcome::Success(payload) => {
                assert_eq!(payload.rows.len(), 1);
                assert_eq!(payload.etag.as_deref(), Some("\"abc\""));
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_results_envelope() {
        let outcome = classify_response(200, r#"{"results": [{"day": 1}]}"#, None, None);
        assert!(matches!(outcome, UpstreamOutcome::Success(_)));
    }

    #[test]
    fn test_classify_empty_collections_are_never_success() {
        assert_eq!(classify_response(200, "[]", None, None), UpstreamOutcome::Empty);
        assert_eq!(
            classify_response(200, r#"{"results": []}"#, None, None),
            UpstreamOutcome::Empty
        );
        assert_eq!(
            classify_response(200, r#"{"message": "ok"}"#, None, None),
            UpstreamOutcome::Empty
        );
        assert_eq!(classify_response(204, "", None, None), UpstreamOutcome::Empty);
    }

    #[test]
    fn test_classify_unparseable_success_is_fatal() {
        match classify_response(200, "<html>", None, None) {
            UpstreamOutcome::Fatal(reason) => assert_eq!(reason.kind, FailureKind::Decode),
            other => panic!("expected fatal, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_retryable_statuses() {
        for status in RETRYABLE_STATUSES {
            assert!(
                matches!(
                    classify_response(status, "busy", None, None),
                    UpstreamOutcome::Retryable(_)
                ),
                "status {} should be retryable",
                status
            );
        }
    }

    #[test]
    fn test_classify_client_errors_are_fatal_with_body() {
        match classify_response(400, "bad pipeline", None, None) {
            UpstreamOutcome::Fatal(reason) => {
                assert_eq!(reason.status, Some(400));
                assert_eq!(reason.body.as_deref(), Some("bad pipeline"));
                assert_eq!(
                    reason.into_error(),
                    UpstreamError::Http {
                        status: 400,
                        body: "bad pipeline".into()
                    }
                );
            }
            other => panic!("expected fatal, got {:?}", other),
        }
    }

    #[test]
    fn test_rate_limit_reason_into_error() {
        let reason = FailureReason::status(429, "", Some(Duration::from_secs(5)));
        assert_eq!(
            reason.into_error(),
            UpstreamError::RateLimited {
                retry_after: Duration::from_millis(5000),
                origin: RateLimitOrigin::Upstream,
            }
        );
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("5"), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after(" 1.5 "), Some(Duration::from_millis(1500)));
        assert_eq!(parse_retry_after("-1"), None);
        assert_eq!(parse_retry_after("soon"), None);
        assert_eq!(
            parse_retry_after("Mon, 01 Jan 2001 00:00:00 GMT"),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_parse_retry_after_clamps_huge_values() {
        let max = Duration::from_secs(MAX_RETRY_AFTER_SECS);
        assert_eq!(parse_retry_after("1e30"), Some(max));
        assert_eq!(parse_retry_after("1e400"), Some(max));
        assert_eq!(parse_retry_after("18446744073709551616"), Some(max));
        assert_eq!(parse_retry_after("NaN"), None);
        assert_eq!(parse_retry_after("01 Jan 9999 00:00:00 GMT"), Some(max));
    }

    #[test]
    fn test_rate_limit_error_clamps_retry_after() {
        let reason = FailureReason::status(429, "", Some(Duration::from_secs(u64::MAX)));
        assert_eq!(
            reason.into_error().retry_after(),
            Some(Duration::from_secs(MAX_RETRY_AFTER_SECS))
        );
    }

    fn report_url(transport: &HttpTransport, id: &str) -> Url {
        let period = Period::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 7).unwrap(),
        )
        .unwrap();
        let query = AnalyticsQuery::new(EntityKind::Report, id, period, MetricFamily::TimeSeries)
            .unwrap();
        transport.build_url(&variants_for(&query)[0]).unwrap()
    }

    #[test]
    fn test_report_id_is_encoded_as_one_segment() {
        let transport = HttpTransport::new(&PendoConfig {
            base_url: "https://app.pendo.io".into(),
            api_key: ApiKey::new("test-key"),
            timeout: Duration::from_secs(5),
        })
        .unwrap();

        let url = report_url(&transport, "abc123");
        assert_eq!(url.as_str(), "https://app.pendo.io/api/v1/report/abc123/results.json");

        let url = report_url(&transport, "abc?x=1");
        assert_eq!(url.path(), "/api/v1/report/abc%3Fx=1/results.json");
        assert_eq!(url.query(), None);

        let url = report_url(&transport, "a#frag");
        assert_eq!(url.path(), "/api/v1/report/a%23frag/results.json");
        assert_eq!(url.fragment(), None);

        let url = report_url(&transport, "a%2F..");
        assert_eq!(url.path(), "/api/v1/report/a%252F../results.json");
    }

    #[test]
    fn test_encode_param() {
        assert_eq!(encode_param(&json!("plain")), "plain");
        assert_eq!(encode_param(&json!(30)), "30");
        assert_eq!(encode_param(&json!({"a": 1})), r#"{"a":1}"#);
        assert_eq!(encode_param(&json!([1, 2])), "[1,2]");
    }

    #[tokio::test]
    async fn test_http_get_sends_key_header() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/v1/guide")
                    .header("x-pendo-integration-key", "test-key")
                    .header("accept", "application/json");
                then.status(200)
                    .header("content-type", "application/json")
                    .header("etag", "\"v1\"")
                    .json_body(json!([{"id": "g1", "name": "Welcome"}]));
            })
            .await;

        let transport = transport_for(&server);
        let outcome = transport
            .send(&entity_list_variant(EntityKind::Guide))
            .await;

        mock.assert_async().await;
        match outcome {
            UpstreamOutcome::Success(payload) => {
                assert_eq!(payload.rows[0]["id"], "g1");
                assert_eq!(payload.etag.as_deref(), Some("\"v1\""));
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_http_get_encodes_object_params() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/v1/aggregation")
                    .query_param("request", r#"{"pipeline":[]}"#)
                    .query_param("limit", "5");
                then.status(200).json_body(json!({"results": []}));
            })
            .await;

        let transport = transport_for(&server);
        let variant = RequestVariant::get(
            "encoded",
            "/api/v1/aggregation",
            vec![
                ("request".to_string(), json!({"pipeline": []})),
                ("limit".to_string(), json!(5)),
            ],
            crate::data::pendo::query::ResourceClass::Aggregation,
        );
        let outcome = transport.send(&variant).await;

        mock.assert_async().await;
        assert_eq!(outcome, UpstreamOutcome::Empty);
    }

    #[tokio::test]
    async fn test_http_post_sends_json_body() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/v1/aggregation")
                    .header("content-type", "application/json")
                    .json_body(json!({"request": {"pipeline": []}}));
                then.status(200)
                    .json_body(json!({"results": [{"day": 1704067200000u64, "numUsers": 3}]}));
            })
            .await;

        let transport = transport_for(&server);
        let variant = RequestVariant::post(
            "post",
            "/api/v1/aggregation",
            json!({"request": {"pipeline": []}}),
            crate::data::pendo::query::ResourceClass::Aggregation,
        );
        let outcome = transport.send(&variant).await;

        mock.assert_async().await;
        assert!(matches!(outcome, UpstreamOutcome::Success(_)));
    }

    #[tokio::test]
    async fn test_http_429_captures_retry_after() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/page");
                then.status(429).header("retry-after", "5").body("slow down");
            })
            .await;

        let transport = transport_for(&server);
        match transport.send(&entity_list_variant(EntityKind::Page)).await {
            UpstreamOutcome::Retryable(reason) => {
                assert_eq!(reason.status, Some(429));
                assert_eq!(reason.retry_after, Some(Duration::from_secs(5)));
                assert_eq!(reason.body.as_deref(), Some("slow down"));
            }
            other => panic!("expected retryable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_http_401_is_fatal() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/feature");
                then.status(401).body("invalid integration key");
            })
            .await;

        let transport = transport_for(&server);
        let outcome = transport
            .send(&entity_list_variant(EntityKind::Feature))
            .await;
        assert!(matches!(outcome, UpstreamOutcome::Fatal(r) if r.status == Some(401)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_retryable() {
        let transport = HttpTransport::new(&PendoConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            api_key: ApiKey::new("k"),
            timeout: Duration::from_secs(2),
        })
        .unwrap();
        let outcome = transport
            .send(&entity_list_variant(EntityKind::Guide))
            .await;
        assert!(matches!(outcome, UpstreamOutcome::Retryable(_)));
    }

    #[test]
    fn test_invalid_key_is_config_error() {
        let result = HttpTransport::new(&PendoConfig {
            base_url: "https://app.pendo.io".to_string(),
            api_key: ApiKey::new("bad\nkey"),
            timeout: Duration::from_secs(1),
        });
        assert!(matches!(result, Err(UpstreamError::Config(_))));
    }
}
