//! Exponential backoff with jitter

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::core::config::RetryConfig;
use crate::data::pendo::UpstreamError;

/// Delay before retry number `attempt + 1`, without jitter
///
/// `base_delay * backoff_multiplier^attempt`, capped at `max_delay`.
pub fn nominal_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let millis = config.base_delay.as_millis() as f64 * config.backoff_multiplier.powi(exponent);
    let capped = millis.min(config.max_delay.as_millis() as f64);
    Duration::from_millis(capped.max(0.0) as u64)
}

/// Nominal delay spread by up to `jitter_ratio` in either direction
pub fn backoff_delay<R: Rng + ?Sized>(config: &RetryConfig, attempt: u32, rng: &mut R) -> Duration {
    let nominal = nominal_delay(config, attempt);
    let spread = nominal.as_millis() as f64 * config.jitter_ratio;
    if spread < 1.0 {
        return nominal;
    }
    let jittered = nominal.as_millis() as f64 + rng.gen_range(-spread..=spread);
    Duration::from_millis(jittered.max(0.0) as u64)
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// `max_attempts` is reached.
///
/// The closure receives the zero-based attempt number. `on_retry` fires
/// before each backoff sleep. Cancellation interrupts the sleep.
pub async fn retry_with_backoff<T, F, Fut>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut on_retry: impl FnMut(u32, &UpstreamError),
    mut operation: F,
) -> Result<T, UpstreamError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, UpstreamError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                let delay = backoff_delay(config, attempt, &mut rand::thread_rng());
                on_retry(attempt + 1, &e);
                tracing::warn!(
                    error = %e,
                    attempt = attempt + 1,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying after transient upstream error"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(UpstreamError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
