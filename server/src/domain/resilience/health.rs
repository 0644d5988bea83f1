//! Health classification

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::circuit_breaker::CircuitState;
use super::stats::{StatsSnapshot, average, success_rate};
use crate::core::constants::{
    HEALTHY_MAX_LATENCY_MS, HEALTHY_MIN_SUCCESS_RATE, UNHEALTHY_LATENCY_MS, UNHEALTHY_SUCCESS_RATE,
};
use crate::data::pendo::ResourceClass;

/// Ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn evaluate(success_rate: f64, average_ms: f64, breaker: CircuitState) -> Self {
        if success_rate < UNHEALTHY_SUCCESS_RATE
            || average_ms > UNHEALTHY_LATENCY_MS
            || breaker == CircuitState::Open
        {
            Self::Unhealthy
        } else if success_rate >= HEALTHY_MIN_SUCCESS_RATE
            && average_ms <= HEALTHY_MAX_LATENCY_MS
            && breaker == CircuitState::Closed
        {
            Self::Healthy
        } else {
            Self::Degraded
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ResourceHealth {
    pub resource: ResourceClass,
    pub status: HealthStatus,
    pub circuit_breaker_state: CircuitState,
    pub failure_count: u32,
    pub circuit_trips: u64,
    pub available_tokens: u32,
    pub stats: StatsSnapshot,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub circuit_breaker_state: CircuitState,
    pub available_tokens: u32,
    pub success_rate: f64,
    pub average_response_time_ms: f64,
    pub resources: Vec<ResourceHealth>,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    /// Roll per-resource health up into one report; the worst resource wins
    pub fn from_resources(resources: Vec<ResourceHealth>) -> Self {
        let status = resources
            .iter()
            .map(|r| r.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);
        let circuit_breaker_state = resources
            .iter()
            .map(|r| r.circuit_breaker_state)
            .max_by_key(|s| severity(*s))
            .unwrap_or(CircuitState::Closed);
        let available_tokens = resources
            .iter()
            .map(|r| r.available_tokens)
            .min()
            .unwrap_or(0);

        let requests: u64 = resources.iter().map(|r| r.stats.requests).sum();
        let ok: u64 = resources
            .iter()
            .map(|r| r.stats.successes + r.stats.empty_results)
            .sum();
        let total_ms: u64 = resources
            .iter()
            .map(|r| r.stats.total_response_time_ms)
            .sum();

        Self {
            status,
            circuit_breaker_state,
            available_tokens,
            success_rate: success_rate(ok, requests),
            average_response_time_ms: average(total_ms, requests),
            resources,
            checked_at: Utc::now(),
        }
    }
}

fn severity(state: CircuitState) -> u8 {
    match state {
        CircuitState::Closed => 0,
        CircuitState::HalfOpen => 1,
        CircuitState::Open => 2,
    }
}
