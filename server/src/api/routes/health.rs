//! Health check endpoint

use std::sync::Arc;

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::domain::analytics::AnalyticsClient;
use crate::domain::resilience::{HealthReport, HealthStatus};

#[derive(Clone)]
pub struct HealthApiState {
    pub client: Arc<AnalyticsClient>,
}

pub fn routes(client: Arc<AnalyticsClient>) -> Router<()> {
    Router::new()
        .route("/", get(health))
        .with_state(HealthApiState { client })
}

/// Upstream health report
///
/// Degraded still answers 200 so load balancers keep routing; unhealthy is 503.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "health",
    responses(
        (status = 200, description = "Upstream healthy or degraded", body = HealthReport),
        (status = 503, description = "Upstream unhealthy", body = HealthReport)
    )
)]
pub async fn health(State(state): State<HealthApiState>) -> impl IntoResponse {
    let report = state.client.health_check();
    let status = match report.status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
    };
    (status, [(header::CACHE_CONTROL, "no-store")], Json(report))
}
