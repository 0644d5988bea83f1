//! OpenAPI specification and Swagger UI

use axum::http::header;
use axum::response::{Html, IntoResponse, Json};
use utoipa::OpenApi;

use crate::api::routes::entities::types::{ListEntitiesQuery, PeriodQuery};
use crate::api::routes::{cache, entities, health, metrics};
use crate::api::types::PaginationMeta;
use crate::data::cache::CacheStats;
use crate::data::pendo::{AnalyticsQuery, EntityKind, MetricFamily, Period, ResourceClass};
use crate::domain::analytics::{
    AnalyticsResult, AttemptRecord, DataSource, DeviceRecord, EntitySummary, GeoRecord,
    MetricsSnapshot, Overview, PollRecord, Records, StepRecord, TimeSeriesPoint,
};
use crate::domain::resilience::{
    CircuitState, HealthReport, HealthStatus, ResourceHealth, StatsSnapshot,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Pendo Insights API",
        version = env!("CARGO_PKG_VERSION"),
        description = "Resilient analytics gateway for the Pendo API"
    ),
    tags(
        (name = "health", description = "Upstream health"),
        (name = "metrics", description = "Request counters and cache statistics"),
        (name = "cache", description = "Cache administration"),
        (name = "entities", description = "Entity listings and analytics")
    ),
    paths(
        health::health,
        metrics::get_metrics,
        cache::clear_cache,
        entities::list_entities,
        entities::get_analytics,
        entities::get_overview,
    ),
    components(schemas(
        // API types
        PaginationMeta,
        ListEntitiesQuery,
        PeriodQuery,
        cache::ClearCacheResponse,
        // Queries
        EntityKind,
        MetricFamily,
        ResourceClass,
        Period,
        AnalyticsQuery,
        // Results
        AnalyticsResult,
        AttemptRecord,
        DataSource,
        Records,
        TimeSeriesPoint,
        StepRecord,
        DeviceRecord,
        GeoRecord,
        PollRecord,
        EntitySummary,
        Overview,
        // Health and metrics
        HealthReport,
        HealthStatus,
        ResourceHealth,
        CircuitState,
        StatsSnapshot,
        MetricsSnapshot,
        CacheStats,
    ))
)]
pub struct ApiDoc;

/// Serve OpenAPI JSON specification
pub async fn openapi_json() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/json")],
        Json(ApiDoc::openapi()),
    )
}

/// Serve Swagger UI from CDN
pub async fn swagger_ui_html() -> Html<&'static str> {
    Html(SWAGGER_UI_HTML)
}

const SWAGGER_UI_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Pendo Insights API Documentation</title>
    <link rel="stylesheet" type="text/css" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css">
    <style>
        html { box-sizing: border-box; overflow-y: scroll; }
        *, *:before, *:after { box-sizing: inherit; }
        body { margin: 0; background: #fafafa; }
    </style>
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-standalone-preset.js"></script>
    <script>
        window.onload = () => {
            window.ui = SwaggerUIBundle({
                url: "/api/openapi.json",
                dom_id: '#swagger-ui',
                presets: [
                    SwaggerUIBundle.presets.apis,
                    SwaggerUIStandalonePreset
                ],
                layout: "StandaloneLayout",
                deepLinking: true,
                showExtensions: true,
                showCommonExtensions: true
            });
        };
    </script>
</body>
</html>"#;
