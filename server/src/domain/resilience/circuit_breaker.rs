//! Three-state circuit breaker
//!
//! ```text
//!            failures >= threshold
//!   CLOSED ───────────────────────────▶ OPEN
//!     ▲                                  │
//!     │ probe ok        recovery elapsed │
//!     │                                  ▼
//!     └────────────── HALF_OPEN ◀────────┘
//!                        │
//!                        └── probe failed ──▶ OPEN
//! ```
//!
//! Callers pass `now` explicitly so transitions are deterministic under a
//! paused clock.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use utoipa::ToSchema;

use crate::core::config::CircuitBreakerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        }
    }
}

/// Admission granted by the breaker; must be settled with `record` or `abandon`
#[derive(Debug)]
#[must_use]
pub struct Permit {
    probe: bool,
}

impl Permit {
    pub fn is_probe(&self) -> bool {
        self.probe
    }
}

struct Inner {
    state: CircuitState,
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    probe_started: Option<Instant>,
    trips: u64,
}

pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: VecDeque::new(),
                opened_at: None,
                probe_started: None,
                trips: 0,
            }),
        }
    }

    /// Ask to send a request; `Err` carries the time until a probe is allowed
    pub fn try_acquire(&self, now: Instant) -> Result<Permit, Duration> {
        let mut inner = self.inner.lock();
        let recovery = self.config.recovery_timeout;

        match inner.state {
            CircuitState::Closed => Ok(Permit { probe: false }),
            CircuitState::Open => {
                let opened_at = inner.opened_at.unwrap_or(now);
                let elapsed = now.saturating_duration_since(opened_at);
                if elapsed >= recovery {
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_started = Some(now);
                    tracing::info!("Circuit breaker half-open, sending probe");
                    Ok(Permit { probe: true })
                } else {
                    Err(recovery - elapsed)
                }
            }
            CircuitState::HalfOpen => match inner.probe_started {
                Some(started) if now.saturating_duration_since(started) < recovery => {
                    Err(recovery - now.saturating_duration_since(started))
                }
                _ => {
                    // Previous probe never reported back
                    inner.probe_started = Some(now);
                    Ok(Permit { probe: true })
                }
            },
        }
    }

    /// Settle a permit with the outcome of its request
    pub fn record(&self, permit: Permit, success: bool, now: Instant) {
        let mut inner = self.inner.lock();

        if permit.probe {
            if inner.state != CircuitState::HalfOpen {
                return;
            }
            if success {
                inner.state = CircuitState::Closed;
                inner.failures.clear();
                inner.opened_at = None;
                inner.probe_started = None;
                tracing::info!("Circuit breaker closed after successful probe");
            } else {
                self.trip(&mut inner, now);
            }
            return;
        }

        // Late results from requests admitted before a trip don't count
        if inner.state != CircuitState::Closed {
            return;
        }

        if success {
            inner.failures.clear();
            return;
        }

        let window = self.config.monitoring_window;
        while let Some(oldest) = inner.failures.front() {
            if now.saturating_duration_since(*oldest) > window {
                inner.failures.pop_front();
            } else {
                break;
            }
        }
        inner.failures.push_back(now);

        if inner.failures.len() as u32 >= self.config.failure_threshold {
            self.trip(&mut inner, now);
        }
    }

    /// Give a permit back without an outcome (request was cancelled)
    pub fn abandon(&self, permit: Permit) {
        if permit.probe {
            let mut inner = self.inner.lock();
            if inner.state == CircuitState::HalfOpen {
                inner.probe_started = None;
            }
        }
    }

    fn trip(&self, inner: &mut Inner, now: Instant) {
        inner.state = CircuitState::Open;
        inner.opened_at = Some(now);
        inner.probe_started = None;
        inner.failures.clear();
        inner.trips += 1;
        tracing::warn!(
            recovery_ms = self.config.recovery_timeout.as_millis() as u64,
            trips = inner.trips,
            "Circuit breaker opened"
        );
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Failures currently counted toward the threshold
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failures.len() as u32
    }

    /// Number of CLOSED/HALF_OPEN to OPEN transitions
    pub fn trips(&self) -> u64 {
        self.inner.lock().trips
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
            monitoring_window: Duration::from_secs(60),
        })
    }

    fn fail(cb: &CircuitBreaker, now: Instant) {
        let permit = cb.try_acquire(now).unwrap();
        cb.record(permit, false, now);
    }

    #[test]
    fn test_opens_at_threshold() {
        let cb = breaker();
        let now = Instant::now();

        fail(&cb, now);
        fail(&cb, now);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 2);

        fail(&cb, now);
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.trips(), 1);

        let wait = cb.try_acquire(now + Duration::from_secs(10)).unwrap_err();
        assert_eq!(wait, Duration::from_secs(20));
    }

    #[test]
    fn test_success_resets_failures() {
        let cb = breaker();
        let now = Instant::now();

        fail(&cb, now);
        fail(&cb, now);
        let permit = cb.try_acquire(now).unwrap();
        cb.record(permit, true, now);
        assert_eq!(cb.failure_count(), 0);

        fail(&cb, now);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_failures_outside_window_expire() {
        let cb = breaker();
        let start = Instant::now();

        fail(&cb, start);
        fail(&cb, start);
        fail(&cb, start + Duration::from_secs(61));
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 1);
    }

    #[test]
    fn test_half_open_probe_success_closes() {
        let cb = breaker();
        let now = Instant::now();
        for _ in 0..3 {
            fail(&cb, now);
        }

        let later = now + Duration::from_secs(30);
        let probe = cb.try_acquire(later).unwrap();
        assert!(probe.is_probe());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        // Only one probe in flight
        assert!(cb.try_acquire(later).is_err());

        cb.record(probe, true, later);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[test]
    fn test_half_open_probe_failure_reopens() {
        let cb = breaker();
        let now = Instant::now();
        for _ in 0..3 {
            fail(&cb, now);
        }

        let later = now + Duration::from_secs(31);
        let probe = cb.try_acquire(later).unwrap();
        cb.record(probe, false, later);
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.trips(), 2);

        // Fresh recovery timer from the failed probe
        let wait = cb.try_acquire(later + Duration::from_secs(5)).unwrap_err();
        assert_eq!(wait, Duration::from_secs(25));
    }

    #[test]
    fn test_abandoned_probe_releases_slot() {
        let cb = breaker();
        let now = Instant::now();
        for _ in 0..3 {
            fail(&cb, now);
        }

        let later = now + Duration::from_secs(30);
        let probe = cb.try_acquire(later).unwrap();
        cb.abandon(probe);

        let retry = cb.try_acquire(later).unwrap();
        assert!(retry.is_probe());
    }

    #[test]
    fn test_stale_probe_is_replaced() {
        let cb = breaker();
        let now = Instant::now();
        for _ in 0..3 {
            fail(&cb, now);
        }

        let _lost = cb.try_acquire(now + Duration::from_secs(30)).unwrap();
        let replacement = cb.try_acquire(now + Duration::from_secs(60)).unwrap();
        assert!(replacement.is_probe());
    }

    #[test]
    fn test_late_results_ignored_while_open() {
        let cb = breaker();
        let now = Instant::now();
        let early = cb.try_acquire(now).unwrap();
        for _ in 0..3 {
            fail(&cb, now);
        }

        cb.record(early, true, now);
        assert_eq!(cb.state(), CircuitState::Open);
    }
}
