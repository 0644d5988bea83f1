//! Upstream error types

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use super::query::ResourceClass;
use crate::core::constants::RETRYABLE_STATUSES;

/// Which limiter rejected the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitOrigin {
    /// Local token bucket
    Local,
    /// Upstream answered 429
    Upstream,
}

impl fmt::Display for RateLimitOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Upstream => write!(f, "upstream"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum UpstreamError {
    #[error("Upstream transport error: {0}")]
    Transport(String),

    #[error("Upstream returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Rate limit exceeded ({origin}), retry after {}ms", .retry_after.as_millis())]
    RateLimited {
        retry_after: Duration,
        origin: RateLimitOrigin,
    },

    #[error("Circuit breaker open for {resource}, retry after {}ms", .retry_after.as_millis())]
    CircuitOpen {
        resource: ResourceClass,
        retry_after: Duration,
    },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Failed to decode upstream response: {0}")]
    Decode(String),

    #[error("Unsupported query: {0}")]
    Unsupported(String),

    #[error("Upstream client configuration error: {0}")]
    Config(String),
}

impl UpstreamError {
    /// Transient failures that the retry policy may repeat
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Http { status, .. } => RETRYABLE_STATUSES.contains(status),
            _ => false,
        }
    }

    /// Suggested wait before the caller tries again
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } | Self::CircuitOpen { retry_after, .. } => {
                Some(*retry_after)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_display() {
        let err = UpstreamError::RateLimited {
            retry_after: Duration::from_secs(5),
            origin: RateLimitOrigin::Upstream,
        };
        assert_eq!(
            err.to_string(),
            "Rate limit exceeded (upstream), retry after 5000ms"
        );
        assert_eq!(err.retry_after(), Some(Duration::from_millis(5000)));
    }

    #[test]
    fn test_circuit_open_display() {
        let err = UpstreamError::CircuitOpen {
            resource: ResourceClass::Aggregation,
            retry_after: Duration::from_millis(1500),
        };
        assert_eq!(
            err.to_string(),
            "Circuit breaker open for aggregation, retry after 1500ms"
        );
    }

    #[test]
    fn test_http_error_display() {
        let err = UpstreamError::Http {
            status: 503,
            body: "maintenance".to_string(),
        };
        assert_eq!(err.to_string(), "Upstream returned HTTP 503: maintenance");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(UpstreamError::Transport("reset".into()).is_retryable());
        assert!(
            UpstreamError::Http {
                status: 502,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(
            !UpstreamError::Http {
                status: 404,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(
            !UpstreamError::RateLimited {
                retry_after: Duration::from_secs(1),
                origin: RateLimitOrigin::Local
            }
            .is_retryable()
        );
        assert!(!UpstreamError::Cancelled.is_retryable());
        assert!(!UpstreamError::Decode("bad".into()).is_retryable());
    }
}
