//! Variant runner
//!
//! Tries request variants in order through the resilience policy and stops
//! at the first one that returns rows.

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;

use crate::data::pendo::{FailureReason, Payload, RequestVariant, Transport, UpstreamError, UpstreamOutcome};
use crate::domain::resilience::ResilienceRegistry;

/// Diagnostic record of one variant attempt
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AttemptRecord {
    pub variant: String,
    pub outcome: String,
    pub status: Option<u16>,
    pub message: Option<String>,
}

impl AttemptRecord {
    fn new(variant: &RequestVariant, outcome: &UpstreamOutcome) -> Self {
        let (status, message) = match outcome {
            UpstreamOutcome::Retryable(r) | UpstreamOutcome::Fatal(r) => {
                (r.status, Some(r.message.clone()))
            }
            _ => (None, None),
        };
        Self {
            variant: variant.label.clone(),
            outcome: outcome.kind_str().to_string(),
            status,
            message,
        }
    }
}

#[derive(Debug)]
pub enum VariantRun {
    /// A variant returned rows
    Success {
        variant: String,
        payload: Payload,
        attempts: Vec<AttemptRecord>,
    },
    /// Every variant was tried without rows
    Exhausted {
        attempts: Vec<AttemptRecord>,
        /// At least one variant was rejected outright
        schema_mismatch: bool,
        last_failure: Option<FailureReason>,
    },
}

impl VariantRun {
    pub fn attempts(&self) -> &[AttemptRecord] {
        match self {
            Self::Success { attempts, .. } | Self::Exhausted { attempts, .. } => attempts,
        }
    }
}

/// Run `variants` in order, at most one transport call each
///
/// Rate-limit and circuit-open rejections and cancellation abort the run.
/// A run in which every variant failed retryably is an outage and comes back
/// as the last failure's error so the caller's retry policy can repeat it.
pub async fn run_variants(
    registry: &ResilienceRegistry,
    transport: &dyn Transport,
    variants: &[RequestVariant],
    cancel: &CancellationToken,
) -> Result<VariantRun, UpstreamError> {
    let mut attempts = Vec::with_capacity(variants.len());
    let mut saw_empty = false;
    let mut saw_fatal = false;
    let mut last_failure = None;

    for variant in variants {
        let policy = registry.policy(variant.resource);
        let outcome = policy.call(transport, variant, cancel).await?;
        attempts.push(AttemptRecord::new(variant, &outcome));

        match outcome {
            UpstreamOutcome::Success(payload) if !payload.rows.is_empty() => {
                tracing::debug!(variant = %variant.label, rows = payload.rows.len(), "Variant succeeded");
                return Ok(VariantRun::Success {
                    variant: variant.label.clone(),
                    payload,
                    attempts,
                });
            }
            UpstreamOutcome::Success(_) | UpstreamOutcome::Empty => saw_empty = true,
            UpstreamOutcome::Retryable(reason) => last_failure = Some(reason),
            UpstreamOutcome::Fatal(reason) => {
                saw_fatal = true;
                last_failure = Some(reason);
            }
        }
    }

    if !saw_empty
        && !saw_fatal
        && let Some(reason) = last_failure
    {
        return Err(reason.into_error());
    }

    Ok(VariantRun::Exhausted {
        attempts,
        schema_mismatch: saw_fatal,
        last_failure,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ResilienceConfig;
    use crate::data::pendo::testing::{MockTransport, bad_request, server_error, success};
    use crate::data::pendo::{AnalyticsQuery, EntityKind, MetricFamily, Period, variants_for};
    use chrono::NaiveDate;
    use serde_json::json;

    fn variants() -> Vec<RequestVariant> {
        let period = Period::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        )
        .unwrap();
        let query =
            AnalyticsQuery::new(EntityKind::Guide, "g1", period, MetricFamily::TimeSeries).unwrap();
        variants_for(&query)
    }

    fn registry() -> ResilienceRegistry {
        ResilienceRegistry::new(ResilienceConfig::default())
    }

    #[tokio::test]
    async fn test_stops_at_first_success() {
        let transport = MockTransport::new(vec![
            UpstreamOutcome::Empty,
            server_error(500),
            success(vec![json!({"eventTime": "2024-01-01", "visitorId": 5})]),
        ]);

        let run = run_variants(&registry(), &transport, &variants(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(transport.calls(), 3);
        assert_eq!(
            transport.labels(),
            vec!["canonical-post", "canonical-get", "server-time-post"]
        );
        match run {
            VariantRun::Success { variant, attempts, .. } => {
                assert_eq!(variant, "server-time-post");
                assert_eq!(attempts.len(), 3);
                assert_eq!(attempts[1].status, Some(500));
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_success_is_not_success() {
        let transport = MockTransport::always(success(Vec::new()));
        let run = run_variants(&registry(), &transport, &variants(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(transport.calls(), 4);
        assert!(matches!(
            run,
            VariantRun::Exhausted {
                schema_mismatch: false,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_fatal_attempts_mark_schema_mismatch() {
        let transport = MockTransport::new(vec![bad_request(), UpstreamOutcome::Empty]);
        let run = run_variants(&registry(), &transport, &variants(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(run.attempts().len(), 4);
        match run {
            VariantRun::Exhausted {
                schema_mismatch,
                last_failure,
                ..
            } => {
                assert!(schema_mismatch);
                assert_eq!(last_failure.and_then(|r| r.status), Some(400));
            }
            other => panic!("expected exhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_all_retryable_is_an_outage() {
        let transport = MockTransport::always(server_error(503));
        let err = run_variants(&registry(), &transport, &variants(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(transport.calls(), 4);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_circuit_open_aborts_run() {
        let registry = ResilienceRegistry::new(ResilienceConfig {
            circuit_breaker: crate::core::config::CircuitBreakerConfig {
                failure_threshold: 1,
                ..Default::default()
            },
            ..Default::default()
        });
        let transport = MockTransport::always(bad_request());

        let err = run_variants(&registry, &transport, &variants(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, UpstreamError::CircuitOpen { .. }));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_no_variants() {
        let transport = MockTransport::always(UpstreamOutcome::Empty);
        let run = run_variants(&registry(), &transport, &[], &CancellationToken::new())
            .await
            .unwrap();
        assert!(run.attempts().is_empty());
        assert_eq!(transport.calls(), 0);
    }
}
