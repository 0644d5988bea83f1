//! Shared API types
//!
//! Error responses, pagination and upstream error mapping.

use std::time::Duration;

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;
use validator::ValidationError;

use crate::data::cache::CacheError;
use crate::data::pendo::UpstreamError;

/// Maximum items per page for paginated endpoints
pub const MAX_PAGE_LIMIT: u32 = 500;
/// Maximum page number
pub const MAX_PAGE: u32 = 100;
/// Default page number
pub const DEFAULT_PAGE: u32 = 1;
/// Default items per page
pub const DEFAULT_LIMIT: u32 = 50;

/// Validator function for page parameter
pub fn validate_page(page: u32) -> Result<(), ValidationError> {
    if page < 1 {
        return Err(ValidationError::new("page_min").with_message("Page must be >= 1".into()));
    }
    if page > MAX_PAGE {
        return Err(ValidationError::new("page_max")
            .with_message(format!("Page must be <= {}", MAX_PAGE).into()));
    }
    Ok(())
}

/// Validator function for limit parameter
pub fn validate_limit(limit: u32) -> Result<(), ValidationError> {
    if limit == 0 || limit > MAX_PAGE_LIMIT {
        return Err(ValidationError::new("limit_range")
            .with_message(format!("Limit must be between 1 and {}", MAX_PAGE_LIMIT).into()));
    }
    Ok(())
}

/// Standard API error response
#[derive(Debug)]
pub enum ApiError {
    BadRequest { code: String, message: String },
    NotFound { code: String, message: String },
    TooManyRequests { message: String, retry_after: Duration },
    BadGateway { message: String },
    ServiceUnavailable {
        message: String,
        retry_after: Option<Duration>,
    },
    Internal { message: String },
}

impl ApiError {
    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NotFound {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn from_cache(e: CacheError) -> Self {
        tracing::error!(error = %e, "Cache error");
        Self::Internal {
            message: "Cache operation failed".to_string(),
        }
    }
}

impl From<UpstreamError> for ApiError {
    fn from(e: UpstreamError) -> Self {
        let message = e.to_string();
        match e {
            UpstreamError::RateLimited { retry_after, .. } => Self::TooManyRequests {
                message,
                retry_after,
            },
            UpstreamError::CircuitOpen { retry_after, .. } => Self::ServiceUnavailable {
                message,
                retry_after: Some(retry_after),
            },
            UpstreamError::Transport(_) | UpstreamError::Http { .. } | UpstreamError::Decode(_) => {
                tracing::warn!(error = %message, "Upstream request failed");
                Self::BadGateway { message }
            }
            UpstreamError::Unsupported(_) => Self::bad_request("UNSUPPORTED_QUERY", message),
            UpstreamError::Cancelled => Self::service_unavailable(message),
            UpstreamError::Config(_) => {
                tracing::error!(error = %message, "Upstream client misconfigured");
                Self::internal(message)
            }
        }
    }
}

/// Whole seconds for a Retry-After header, rounded up
fn retry_after_header(retry_after: Duration) -> HeaderValue {
    let secs = retry_after.as_millis().div_ceil(1000).max(1);
    HeaderValue::from(secs as u64)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut retry_after = None;
        let (status, error_type, code, message) = match self {
            Self::BadRequest { code, message } => {
                (StatusCode::BAD_REQUEST, "bad_request", code, message)
            }
            Self::NotFound { code, message } => (StatusCode::NOT_FOUND, "not_found", code, message),
            Self::TooManyRequests {
                message,
                retry_after: wait,
            } => {
                retry_after = Some(wait);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    "rate_limited",
                    "RATE_LIMITED".to_string(),
                    message,
                )
            }
            Self::BadGateway { message } => (
                StatusCode::BAD_GATEWAY,
                "bad_gateway",
                "UPSTREAM_ERROR".to_string(),
                message,
            ),
            Self::ServiceUnavailable {
                message,
                retry_after: wait,
            } => {
                retry_after = wait;
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "service_unavailable",
                    "SERVICE_UNAVAILABLE".to_string(),
                    message,
                )
            }
            Self::Internal { message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "INTERNAL".to_string(),
                message,
            ),
        };
        let mut response = (
            status,
            Json(serde_json::json!({
                "error": error_type,
                "code": code,
                "message": message
            })),
        )
            .into_response();
        if let Some(wait) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, retry_after_header(wait));
        }
        response
    }
}

pub fn default_page() -> u32 {
    DEFAULT_PAGE
}

pub fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

/// Pagination metadata in response
#[derive(Debug, Serialize, ToSchema)]
pub struct PaginationMeta {
    pub page: u32,
    pub limit: u32,
    pub total_items: u64,
    pub total_pages: u64,
}

impl PaginationMeta {
    pub fn new(page: u32, limit: u32, total_items: u64) -> Self {
        Self {
            page,
            limit,
            total_items,
            total_pages: total_items.div_ceil(u64::from(limit.max(1))),
        }
    }
}

/// Generic paginated response wrapper
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub meta: PaginationMeta,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, page: u32, limit: u32, total_items: u64) -> Self {
        Self {
            data,
            meta: PaginationMeta::new(page, limit, total_items),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::pendo::{RateLimitOrigin, ResourceClass};

    #[test]
    fn test_rate_limited_maps_to_429_with_retry_after() {
        let response = ApiError::from(UpstreamError::RateLimited {
            retry_after: Duration::from_millis(5000),
            origin: RateLimitOrigin::Upstream,
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "5");
    }

    #[test]
    fn test_circuit_open_maps_to_503() {
        let response = ApiError::from(UpstreamError::CircuitOpen {
            resource: ResourceClass::Aggregation,
            retry_after: Duration::from_millis(1500),
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "2");
    }

    #[test]
    fn test_upstream_failures_map_to_502() {
        for err in [
            UpstreamError::Transport("connection refused".into()),
            UpstreamError::Http {
                status: 503,
                body: String::new(),
            },
            UpstreamError::Decode("expected value".into()),
        ] {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        }
    }

    #[test]
    fn test_unsupported_maps_to_400() {
        let response =
            ApiError::from(UpstreamError::Unsupported("no polls for pages".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
    }

    #[test]
    fn test_pagination_meta() {
        let meta = PaginationMeta::new(2, 50, 101);
        assert_eq!(meta.total_pages, 3);
        assert_eq!(PaginationMeta::new(1, 50, 0).total_pages, 0);
    }

    #[test]
    fn test_page_and_limit_validation() {
        assert!(validate_page(0).is_err());
        assert!(validate_page(MAX_PAGE + 1).is_err());
        assert!(validate_page(1).is_ok());
        assert!(validate_limit(0).is_err());
        assert!(validate_limit(MAX_PAGE_LIMIT).is_ok());
    }
}
