//! Cache administration endpoint

use std::sync::Arc;

use axum::extract::State;
use axum::routing::delete;
use axum::{Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::types::ApiError;
use crate::domain::analytics::AnalyticsClient;

#[derive(Clone)]
pub struct CacheApiState {
    pub client: Arc<AnalyticsClient>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ClearCacheResponse {
    /// Number of entries removed
    pub removed: u64,
}

pub fn routes(client: Arc<AnalyticsClient>) -> Router<()> {
    Router::new()
        .route("/", delete(clear_cache))
        .with_state(CacheApiState { client })
}

/// Drop every cached upstream response
#[utoipa::path(
    delete,
    path = "/api/v1/cache",
    tag = "cache",
    responses(
        (status = 200, description = "Cache cleared", body = ClearCacheResponse)
    )
)]
pub async fn clear_cache(
    State(state): State<CacheApiState>,
) -> Result<Json<ClearCacheResponse>, ApiError> {
    let removed = state
        .client
        .clear_cache()
        .await
        .map_err(ApiError::from_cache)?;
    Ok(Json(ClearCacheResponse { removed }))
}
