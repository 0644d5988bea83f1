//! Resilience policy for upstream calls
//!
//! Every transport call passes through the policy of its resource class:
//!
//! ```text
//! breaker.try_acquire ──▶ bucket (bounded wait) ──▶ transport.send ──▶ record
//!        │                        │                        │
//!   CircuitOpen             RateLimited(local)     429 ▶ RateLimited(upstream)
//! ```
//!
//! - `circuit_breaker` - CLOSED / OPEN / HALF_OPEN guard
//! - `rate_limiter` - Token bucket with a per-minute ceiling
//! - `retry` - Exponential backoff with jitter
//! - `stats` - Request counters
//! - `health` - Health classification

pub mod circuit_breaker;
pub mod health;
pub mod rate_limiter;
pub mod retry;
pub mod stats;

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use health::{HealthReport, HealthStatus, ResourceHealth};
pub use rate_limiter::TokenBucket;
pub use retry::retry_with_backoff;
pub use stats::{RequestStats, StatsSnapshot};

use crate::core::config::{ResilienceConfig, RetryConfig};
use crate::core::constants::MAX_RETRY_AFTER_SECS;
use crate::data::pendo::{
    RateLimitOrigin, RequestVariant, ResourceClass, Transport, UpstreamError, UpstreamOutcome,
};

/// Current time on the tokio clock (honors a paused test clock)
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

// =============================================================================
// Policy
// =============================================================================

/// Breaker, bucket and counters for one resource class
pub struct ResiliencePolicy {
    resource: ResourceClass,
    breaker: CircuitBreaker,
    bucket: TokenBucket,
    stats: RequestStats,
    max_queue_wait: Duration,
}

impl ResiliencePolicy {
    pub fn new(resource: ResourceClass, config: &ResilienceConfig) -> Self {
        Self {
            resource,
            breaker: CircuitBreaker::new(config.circuit_breaker.clone()),
            bucket: TokenBucket::new(config.rate_limit.clone(), now()),
            stats: RequestStats::default(),
            max_queue_wait: config.rate_limit.max_queue_wait,
        }
    }

    /// Send one variant under breaker and bucket control
    ///
    /// Rejections, upstream 429s and cancellation come back as `Err`; every
    /// other response is returned as an outcome for the runner to judge.
    pub async fn call(
        &self,
        transport: &dyn Transport,
        variant: &RequestVariant,
        cancel: &CancellationToken,
    ) -> Result<UpstreamOutcome, UpstreamError> {
        if cancel.is_cancelled() {
            return Err(UpstreamError::Cancelled);
        }

        let permit = match self.breaker.try_acquire(now()) {
            Ok(permit) => permit,
            Err(retry_after) => {
                self.stats.record_circuit_rejection();
                tracing::debug!(
                    resource = %self.resource,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "Circuit open, rejecting request"
                );
                return Err(UpstreamError::CircuitOpen {
                    resource: self.resource,
                    retry_after,
                });
            }
        };

        if let Err(e) = self.acquire_token(cancel).await {
            self.breaker.abandon(permit);
            return Err(e);
        }

        let started = tokio::time::Instant::now();
        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            outcome = transport.send(variant) => Some(outcome),
        };
        let Some(outcome) = sent else {
            self.breaker.abandon(permit);
            tracing::debug!(resource = %self.resource, variant = %variant.label, "Upstream call cancelled");
            return Err(UpstreamError::Cancelled);
        };
        let elapsed = started.elapsed();

        self.stats.record_outcome(&outcome, elapsed);
        self.breaker.record(permit, outcome.is_ok(), now());

        tracing::debug!(
            resource = %self.resource,
            variant = %variant.label,
            outcome = outcome.kind_str(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Upstream call finished"
        );

        match &outcome {
            UpstreamOutcome::Retryable(reason) if reason.is_rate_limit() => {
                let err = reason.clone().into_error();
                let retry_after = err.retry_after().unwrap_or_default();
                let now = now();
                let max_pause = Duration::from_secs(MAX_RETRY_AFTER_SECS);
                let until = now
                    .checked_add(retry_after.min(max_pause))
                    .unwrap_or(now + max_pause);
                self.bucket.pause_until(until);
                self.stats.record_rate_limited(RateLimitOrigin::Upstream);
                tracing::warn!(
                    resource = %self.resource,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "Upstream rate limit hit"
                );
                Err(err)
            }
            UpstreamOutcome::Fatal(reason) => {
                tracing::warn!(
                    resource = %self.resource,
                    variant = %variant.label,
                    status = ?reason.status,
                    error = %reason.message,
                    body = reason.body.as_deref().unwrap_or(""),
                    "Upstream rejected request"
                );
                Ok(outcome)
            }
            _ => Ok(outcome),
        }
    }

    /// Wait for a token if it arrives within `max_queue_wait`
    async fn acquire_token(&self, cancel: &CancellationToken) -> Result<(), UpstreamError> {
        let deadline = tokio::time::Instant::now() + self.max_queue_wait;
        loop {
            let wait = match self.bucket.try_acquire(now()) {
                Ok(()) => return Ok(()),
                Err(wait) => wait,
            };

            if tokio::time::Instant::now() + wait > deadline {
                self.stats.record_rate_limited(RateLimitOrigin::Local);
                return Err(UpstreamError::RateLimited {
                    retry_after: wait,
                    origin: RateLimitOrigin::Local,
                });
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(UpstreamError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    pub fn record_retry(&self) {
        self.stats.record_retry();
    }

    pub fn state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn health(&self) -> ResourceHealth {
        let stats = self.stats.snapshot();
        let state = self.breaker.state();
        ResourceHealth {
            resource: self.resource,
            status: HealthStatus::evaluate(stats.success_rate, stats.average_response_time_ms, state),
            circuit_breaker_state: state,
            failure_count: self.breaker.failure_count(),
            circuit_trips: self.breaker.trips(),
            available_tokens: self.bucket.available_tokens(now()),
            stats,
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

/// One policy per resource class, created on first use
pub struct ResilienceRegistry {
    config: ResilienceConfig,
    policies: DashMap<ResourceClass, Arc<ResiliencePolicy>>,
}

impl ResilienceRegistry {
    pub fn new(config: ResilienceConfig) -> Self {
        Self {
            config,
            policies: DashMap::new(),
        }
    }

    pub fn policy(&self, resource: ResourceClass) -> Arc<ResiliencePolicy> {
        self.policies
            .entry(resource)
            .or_insert_with(|| Arc::new(ResiliencePolicy::new(resource, &self.config)))
            .clone()
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.config.retry
    }

    /// Health of every resource class
    pub fn health(&self) -> HealthReport {
        let resources = ResourceClass::ALL
            .iter()
            .map(|class| self.policy(*class).health())
            .collect();
        HealthReport::from_resources(resources)
    }

    pub fn stats(&self) -> Vec<(ResourceClass, StatsSnapshot)> {
        ResourceClass::ALL
            .iter()
            .map(|class| (*class, self.policy(*class).stats()))
            .collect()
    }
}
