//! Client metrics endpoint

use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::domain::analytics::{AnalyticsClient, MetricsSnapshot};

#[derive(Clone)]
pub struct MetricsApiState {
    pub client: Arc<AnalyticsClient>,
}

pub fn routes(client: Arc<AnalyticsClient>) -> Router<()> {
    Router::new()
        .route("/", get(get_metrics))
        .with_state(MetricsApiState { client })
}

/// Per-resource request counters and cache statistics
#[utoipa::path(
    get,
    path = "/api/v1/metrics",
    tag = "metrics",
    responses(
        (status = 200, description = "Metrics snapshot", body = MetricsSnapshot)
    )
)]
pub async fn get_metrics(State(state): State<MetricsApiState>) -> impl IntoResponse {
    let snapshot = state.client.get_metrics().await;
    ([(header::CACHE_CONTROL, "no-store")], Json(snapshot))
}
