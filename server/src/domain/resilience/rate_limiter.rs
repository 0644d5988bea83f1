//! Token bucket with a per-minute ceiling

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::core::config::RateLimitConfig;

const MINUTE: Duration = Duration::from_secs(60);

struct BucketState {
    tokens: f64,
    last_refill: Instant,
    /// Grant times within the last minute
    granted: VecDeque<Instant>,
    /// Set after an upstream 429
    paused_until: Option<Instant>,
}

/// Bounds burst size, sustained rate and requests per minute
pub struct TokenBucket {
    config: RateLimitConfig,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(config: RateLimitConfig, now: Instant) -> Self {
        Self {
            state: Mutex::new(BucketState {
                tokens: f64::from(config.burst_limit),
                last_refill: now,
                granted: VecDeque::new(),
                paused_until: None,
            }),
            config,
        }
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        let rate = f64::from(self.config.requests_per_second);
        state.tokens = (state.tokens + elapsed * rate).min(f64::from(self.config.burst_limit));
        state.last_refill = now;

        while let Some(oldest) = state.granted.front() {
            if now.saturating_duration_since(*oldest) >= MINUTE {
                state.granted.pop_front();
            } else {
                break;
            }
        }
    }

    /// Take one token, or report how long until one is available
    pub fn try_acquire(&self, now: Instant) -> Result<(), Duration> {
        let mut state = self.state.lock();

        if let Some(until) = state.paused_until {
            if now < until {
                return Err(until - now);
            }
            state.paused_until = None;
        }

        self.refill(&mut state, now);

        if state.granted.len() as u32 >= self.config.requests_per_minute
            && let Some(oldest) = state.granted.front()
        {
            return Err(MINUTE.saturating_sub(now.saturating_duration_since(*oldest)));
        }

        if state.tokens < 1.0 {
            let rate = f64::from(self.config.requests_per_second.max(1));
            return Err(Duration::from_secs_f64((1.0 - state.tokens) / rate));
        }

        state.tokens -= 1.0;
        state.granted.push_back(now);
        Ok(())
    }

    /// Whole tokens available right now
    pub fn available_tokens(&self, now: Instant) -> u32 {
        let mut state = self.state.lock();
        if state.paused_until.is_some_and(|until| now < until) {
            return 0;
        }
        self.refill(&mut state, now);
        state.tokens.floor() as u32
    }

    /// Stop granting until `until` (upstream asked us to back off)
    pub fn pause_until(&self, until: Instant) {
        let mut state = self.state.lock();
        state.paused_until = Some(state.paused_until.map_or(until, |p| p.max(until)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(rps: u32, burst: u32, rpm: u32) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_second: rps,
            burst_limit: burst,
            requests_per_minute: rpm,
            max_queue_wait: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_burst_then_reject() {
        let now = Instant::now();
        let bucket = TokenBucket::new(config(10, 20, 600), now);

        for _ in 0..20 {
            assert!(bucket.try_acquire(now).is_ok());
        }
        let wait = bucket.try_acquire(now).unwrap_err();
        assert_eq!(wait, Duration::from_millis(100));
    }

    #[test]
    fn test_refill_grants_exactly_one() {
        let now = Instant::now();
        let bucket = TokenBucket::new(config(10, 20, 600), now);
        for _ in 0..20 {
            bucket.try_acquire(now).unwrap();
        }

        let later = now + Duration::from_millis(100);
        assert!(bucket.try_acquire(later).is_ok());
        assert!(bucket.try_acquire(later).is_err());
    }

    #[test]
    fn test_refill_caps_at_burst() {
        let now = Instant::now();
        let bucket = TokenBucket::new(config(10, 5, 600), now);
        assert_eq!(bucket.available_tokens(now + Duration::from_secs(60)), 5);
    }

    #[test]
    fn test_minute_ceiling() {
        let now = Instant::now();
        let bucket = TokenBucket::new(config(100, 100, 3), now);
        for _ in 0..3 {
            bucket.try_acquire(now).unwrap();
        }

        let wait = bucket
            .try_acquire(now + Duration::from_secs(20))
            .unwrap_err();
        assert_eq!(wait, Duration::from_secs(40));
        assert!(bucket.try_acquire(now + Duration::from_secs(60)).is_ok());
    }

    #[test]
    fn test_pause_until() {
        let now = Instant::now();
        let bucket = TokenBucket::new(config(10, 20, 600), now);

        bucket.pause_until(now + Duration::from_secs(5));
        assert_eq!(bucket.available_tokens(now), 0);
        assert_eq!(
            bucket.try_acquire(now + Duration::from_secs(2)).unwrap_err(),
            Duration::from_secs(3)
        );
        assert!(bucket.try_acquire(now + Duration::from_secs(5)).is_ok());
    }
}
