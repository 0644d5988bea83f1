//! Path and validation extractors for API routes
//!
//! ## HTTP Caching Strategy
//!
//! | Endpoint Type        | Cache-Control         | Additional        |
//! |----------------------|-----------------------|-------------------|
//! | Entity listings      | `private, max-age=60` | -                 |
//! | Analytics / overview | `no-cache`            | ETag (upstream)   |
//! | Health / metrics     | `no-store`            | -                 |

use std::ops::Deref;

use axum::Json;
use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{FromRequestParts, Path, Query};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::data::pendo::{EntityKind, MetricFamily};

/// Maximum length for entity IDs
pub const MAX_ID_LENGTH: usize = 256;

/// Validate entity ID: 1-256 printable chars without path separators or dot segments
pub fn is_valid_id(id: &str) -> bool {
    !matches!(id.trim(), "" | "." | "..")
        && id.len() <= MAX_ID_LENGTH
        && !id.chars().any(|c| c.is_control() || c == '/')
}

fn parse_kind(raw: &str) -> Result<EntityKind, ValidationRejection> {
    raw.parse()
        .map_err(|_| ValidationRejection::InvalidKind(raw.to_string()))
}

/// Raw path extractor for kind-scoped routes (internal use)
#[derive(Debug, Deserialize)]
struct KindPathRaw {
    kind: String,
}

/// Validated `{kind}` path extractor
#[derive(Debug)]
pub struct KindPath {
    pub kind: EntityKind,
}

impl<S> FromRequestParts<S> for KindPath
where
    S: Send + Sync,
{
    type Rejection = ValidationRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<KindPathRaw>::from_request_parts(parts, state)
            .await
            .map_err(ValidationRejection::Path)?;

        Ok(Self {
            kind: parse_kind(&raw.kind)?,
        })
    }
}

// ============================================================================
// Compound Path Extractors
// ============================================================================

/// Raw path extractor for entity routes (internal use)
#[derive(Debug, Deserialize)]
struct EntityPathRaw {
    kind: String,
    id: String,
}

/// Validated `{kind}/{id}` path extractor
#[derive(Debug)]
pub struct EntityPath {
    pub kind: EntityKind,
    pub id: String,
}

impl<S> FromRequestParts<S> for EntityPath
where
    S: Send + Sync,
{
    type Rejection = ValidationRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<EntityPathRaw>::from_request_parts(parts, state)
            .await
            .map_err(ValidationRejection::Path)?;

        let kind = parse_kind(&raw.kind)?;
        if !is_valid_id(&raw.id) {
            return Err(ValidationRejection::InvalidId);
        }

        Ok(Self { kind, id: raw.id })
    }
}

/// Raw path extractor for metric routes (internal use)
#[derive(Debug, Deserialize)]
struct MetricPathRaw {
    kind: String,
    id: String,
    metric: String,
}

/// Validated `{kind}/{id}/analytics/{metric}` path extractor
#[derive(Debug)]
pub struct MetricPath {
    pub kind: EntityKind,
    pub id: String,
    pub family: MetricFamily,
}

impl<S> FromRequestParts<S> for MetricPath
where
    S: Send + Sync,
{
    type Rejection = ValidationRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<MetricPathRaw>::from_request_parts(parts, state)
            .await
            .map_err(ValidationRejection::Path)?;

        let kind = parse_kind(&raw.kind)?;
        if !is_valid_id(&raw.id) {
            return Err(ValidationRejection::InvalidId);
        }
        let family = raw
            .metric
            .parse()
            .map_err(|_| ValidationRejection::InvalidMetric(raw.metric.clone()))?;

        Ok(Self {
            kind,
            id: raw.id,
            family,
        })
    }
}

/// Validation rejection with structured error response
pub enum ValidationRejection {
    /// Failed to parse path parameters
    Path(PathRejection),
    /// Unknown entity kind
    InvalidKind(String),
    /// Invalid entity id format
    InvalidId,
    /// Unknown metric family
    InvalidMetric(String),
    /// Failed to parse query string
    Query(QueryRejection),
    /// Validation constraints not satisfied
    Validation(validator::ValidationErrors),
}

impl IntoResponse for ValidationRejection {
    fn into_response(self) -> Response {
        let (code, message) = match self {
            Self::Path(rejection) => ("PATH_PARSE_ERROR", rejection.body_text()),
            Self::InvalidKind(kind) => (
                "INVALID_KIND",
                format!(
                    "Unknown entity kind '{}'. Valid: guide, feature, page, report",
                    kind
                ),
            ),
            Self::InvalidId => (
                "INVALID_ID",
                format!("Invalid id: must be 1-{} characters", MAX_ID_LENGTH),
            ),
            Self::InvalidMetric(metric) => (
                "INVALID_METRIC",
                format!(
                    "Unknown metric '{}'. Valid: time_series, steps, devices, geography, polls",
                    metric
                ),
            ),
            Self::Query(rejection) => ("QUERY_PARSE_ERROR", rejection.body_text()),
            Self::Validation(errors) => ("VALIDATION_ERROR", format_validation_errors(&errors)),
        };
        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "bad_request",
                "code": code,
                "message": message
            })),
        )
            .into_response()
    }
}

fn format_validation_errors(errors: &validator::ValidationErrors) -> String {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{}: validation failed", field))
            })
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Query extractor with automatic validation.
///
/// Deserializes query parameters and validates them using the `validator` crate.
/// Returns a `ValidationRejection` on parse or validation failure.
#[derive(Debug)]
pub struct ValidatedQuery<T>(pub T);

impl<T> Deref for ValidatedQuery<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<S, T> FromRequestParts<S> for ValidatedQuery<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ValidationRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(ValidationRejection::Query)?;
        value.validate().map_err(ValidationRejection::Validation)?;
        Ok(Self(value))
    }
}
