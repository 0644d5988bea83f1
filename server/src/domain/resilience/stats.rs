//! Per-resource request counters

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use utoipa::ToSchema;

use crate::data::pendo::{RateLimitOrigin, UpstreamOutcome};

#[derive(Debug, Default)]
pub struct RequestStats {
    requests: AtomicU64,
    successes: AtomicU64,
    empty_results: AtomicU64,
    failures: AtomicU64,
    retries: AtomicU64,
    rate_limited_local: AtomicU64,
    rate_limited_upstream: AtomicU64,
    circuit_rejections: AtomicU64,
    total_response_ms: AtomicU64,
}

/// Counter values at one instant
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct StatsSnapshot {
    pub requests: u64,
    pub successes: u64,
    pub empty_results: u64,
    pub failures: u64,
    pub retries: u64,
    pub rate_limited_local: u64,
    pub rate_limited_upstream: u64,
    pub circuit_rejections: u64,
    pub total_response_time_ms: u64,
    /// Percentage of requests answered with data or an empty result
    pub success_rate: f64,
    pub average_response_time_ms: f64,
}

impl RequestStats {
    /// Count one transport attempt
    pub fn record_outcome(&self, outcome: &UpstreamOutcome, elapsed: Duration) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
        let counter = match outcome {
            UpstreamOutcome::Success(_) => &self.successes,
            UpstreamOutcome::Empty => &self.empty_results,
            UpstreamOutcome::Retryable(_) | UpstreamOutcome::Fatal(_) => &self.failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self, origin: RateLimitOrigin) {
        let counter = match origin {
            RateLimitOrigin::Local => &self.rate_limited_local,
            RateLimitOrigin::Upstream => &self.rate_limited_upstream,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_circuit_rejection(&self) {
        self.circuit_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let requests = self.requests.load(Ordering::Relaxed);
        let successes = self.successes.load(Ordering::Relaxed);
        let empty_results = self.empty_results.load(Ordering::Relaxed);
        let total_response_time_ms = self.total_response_ms.load(Ordering::Relaxed);

        StatsSnapshot {
            requests,
            successes,
            empty_results,
            failures: self.failures.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            rate_limited_local: self.rate_limited_local.load(Ordering::Relaxed),
            rate_limited_upstream: self.rate_limited_upstream.load(Ordering::Relaxed),
            circuit_rejections: self.circuit_rejections.load(Ordering::Relaxed),
            total_response_time_ms,
            success_rate: success_rate(successes + empty_results, requests),
            average_response_time_ms: average(total_response_time_ms, requests),
        }
    }
}

/// Percentage of `ok` in `total`; 100 when nothing has been sent
pub fn success_rate(ok: u64, total: u64) -> f64 {
    if total == 0 {
        100.0
    } else {
        ok as f64 * 100.0 / total as f64
    }
}

pub fn average(sum: u64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum as f64 / count as f64
    }
}
