//! Entity listing and analytics endpoints

pub mod types;

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};

use crate::api::extractors::{EntityPath, KindPath, MetricPath, ValidatedQuery};
use crate::api::types::{ApiError, PaginatedResponse};
use crate::data::pendo::AnalyticsQuery;
use crate::domain::analytics::{AnalyticsClient, AnalyticsResult, Overview};

use types::{ListEntitiesQuery, PeriodQuery};

/// Shared state for entity endpoints
#[derive(Clone)]
pub struct EntitiesApiState {
    pub client: Arc<AnalyticsClient>,
}

/// Build entity API routes
pub fn routes(client: Arc<AnalyticsClient>) -> Router<()> {
    let state = EntitiesApiState { client };

    Router::new()
        .route("/{kind}", get(list_entities))
        .route("/{kind}/{id}/overview", get(get_overview))
        .route("/{kind}/{id}/analytics/{metric}", get(get_analytics))
        .with_state(state)
}

/// List entities of one kind
#[utoipa::path(
    get,
    path = "/api/v1/entities/{kind}",
    tag = "entities",
    params(
        ("kind" = String, Path, description = "guide, feature, page or report"),
        ("page" = Option<u32>, Query, description = "Page number (1-100)"),
        ("limit" = Option<u32>, Query, description = "Items per page (1-500)")
    ),
    responses(
        (status = 200, description = "Entities with pagination metadata"),
        (status = 400, description = "Invalid kind or pagination"),
        (status = 429, description = "Rate limited"),
        (status = 502, description = "Upstream failure"),
        (status = 503, description = "Circuit open")
    )
)]
pub async fn list_entities(
    State(state): State<EntitiesApiState>,
    path: KindPath,
    ValidatedQuery(query): ValidatedQuery<ListEntitiesQuery>,
) -> Result<Response, ApiError> {
    let page = state
        .client
        .list_entities(path.kind, query.page, query.limit)
        .await?;

    let body = PaginatedResponse::new(page.entities, query.page, query.limit, page.total);
    Ok((
        [(header::CACHE_CONTROL, "private, max-age=60")],
        Json(body),
    )
        .into_response())
}

/// One metric family for one entity
#[utoipa::path(
    get,
    path = "/api/v1/entities/{kind}/{id}/analytics/{metric}",
    tag = "entities",
    params(
        ("kind" = String, Path, description = "guide, feature, page or report"),
        ("id" = String, Path, description = "Entity ID"),
        ("metric" = String, Path, description = "time_series, steps, devices, geography or polls"),
        ("start" = Option<String>, Query, description = "First day (YYYY-MM-DD)"),
        ("end" = Option<String>, Query, description = "Last day (YYYY-MM-DD), default today"),
        ("days" = Option<u32>, Query, description = "Window length when start is omitted")
    ),
    responses(
        (status = 200, description = "Analytics result", body = AnalyticsResult),
        (status = 304, description = "Not modified"),
        (status = 400, description = "Unsupported kind/metric combination or invalid period"),
        (status = 429, description = "Rate limited"),
        (status = 502, description = "Upstream failure"),
        (status = 503, description = "Circuit open")
    )
)]
pub async fn get_analytics(
    State(state): State<EntitiesApiState>,
    path: MetricPath,
    headers: HeaderMap,
    ValidatedQuery(query): ValidatedQuery<PeriodQuery>,
) -> Result<Response, ApiError> {
    let period = query.to_period()?;
    let query = AnalyticsQuery::new(path.kind, path.id, period, path.family)?;
    let result = state.client.get_analytics(&query).await?;

    let etag = result
        .etag
        .as_deref()
        .and_then(|tag| HeaderValue::from_str(tag).ok());

    if let Some(etag) = &etag
        && headers.get(header::IF_NONE_MATCH) == Some(etag)
    {
        return Ok(StatusCode::NOT_MODIFIED.into_response());
    }

    let mut response = ([(header::CACHE_CONTROL, "no-cache")], Json(result)).into_response();
    if let Some(etag) = etag {
        response.headers_mut().insert(header::ETAG, etag);
    }
    Ok(response)
}

/// Every supported metric family for one entity
#[utoipa::path(
    get,
    path = "/api/v1/entities/{kind}/{id}/overview",
    tag = "entities",
    params(
        ("kind" = String, Path, description = "guide, feature, page or report"),
        ("id" = String, Path, description = "Entity ID"),
        ("start" = Option<String>, Query, description = "First day (YYYY-MM-DD)"),
        ("end" = Option<String>, Query, description = "Last day (YYYY-MM-DD), default today"),
        ("days" = Option<u32>, Query, description = "Window length when start is omitted")
    ),
    responses(
        (status = 200, description = "Overview", body = Overview),
        (status = 400, description = "Invalid period")
    )
)]
pub async fn get_overview(
    State(state): State<EntitiesApiState>,
    path: EntityPath,
    ValidatedQuery(query): ValidatedQuery<PeriodQuery>,
) -> Result<Json<Overview>, ApiError> {
    let period = query.to_period()?;
    let overview = state
        .client
        .get_overview(path.kind, &path.id, period)
        .await?;
    Ok(Json(overview))
}
