//! Analytics client facade
//!
//! Owns the transport, resilience registry, response cache and fallback
//! generator. Every query runs under a child of the client's root
//! cancellation token, so shutdown aborts in-flight upstream calls.

use std::slice;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;

use super::fallback::FallbackGenerator;
use super::normalize::{normalize, normalize_entities};
use super::records::{DataSource, EntitySummary, Records};
use super::runner::{AttemptRecord, VariantRun, run_variants};
use crate::core::config::{AppConfig, CacheConfig, FallbackConfig, ResilienceConfig};
use crate::core::constants::HEALTH_MONITOR_INTERVAL_SECS;
use crate::data::cache::{CacheError, CacheKey, CacheService, CacheStats};
use crate::data::pendo::{
    AnalyticsQuery, EntityKind, HttpTransport, Period, RequestVariant, ResourceClass, Transport,
    UpstreamError, entity_list_variant, variants_for,
};
use crate::domain::resilience::{
    HealthReport, HealthStatus, ResilienceRegistry, ResourceHealth, retry_with_backoff,
};

// =============================================================================
// Result Types
// =============================================================================

/// One analytics answer
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AnalyticsResult {
    pub query: AnalyticsQuery,
    pub data: Records,
    pub source: DataSource,
    /// Variant that produced the rows
    pub variant: Option<String>,
    pub attempts: Vec<AttemptRecord>,
    pub cached: bool,
    pub etag: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub warning: Option<String>,
}

/// Every supported metric family for one entity
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Overview {
    pub kind: EntityKind,
    pub entity_id: String,
    pub period: Period,
    pub results: Vec<AnalyticsResult>,
    pub generated_at: DateTime<Utc>,
}

/// One page of an entity listing
#[derive(Debug, Clone)]
pub struct EntityPage {
    pub entities: Vec<EntitySummary>,
    pub total: u64,
    pub cached: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MetricsSnapshot {
    pub resources: Vec<ResourceHealth>,
    pub cache: CacheStats,
    pub fallbacks_served: u64,
    pub collected_at: DateTime<Utc>,
}

/// Cached form of a non-synthetic analytics result
#[derive(Debug, Serialize, Deserialize)]
struct CachedAnalytics {
    data: Records,
    source: DataSource,
    variant: Option<String>,
    etag: Option<String>,
    generated_at: DateTime<Utc>,
}

// =============================================================================
// Client
// =============================================================================

pub struct AnalyticsClient {
    transport: Arc<dyn Transport>,
    registry: ResilienceRegistry,
    cache: CacheService,
    fallback: FallbackGenerator,
    fallback_enabled: bool,
    analytics_ttl: Duration,
    entity_ttl: Duration,
    cancel: CancellationToken,
    fallbacks_served: AtomicU64,
}

impl AnalyticsClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        resilience: ResilienceConfig,
        cache: &CacheConfig,
        fallback: &FallbackConfig,
    ) -> Result<Self, UpstreamError> {
        let cache_service =
            CacheService::new(cache).map_err(|e| UpstreamError::Config(e.to_string()))?;
        Ok(Self {
            transport,
            registry: ResilienceRegistry::new(resilience),
            cache: cache_service,
            fallback: FallbackGenerator::new(fallback),
            fallback_enabled: fallback.enabled,
            analytics_ttl: cache.ttl,
            entity_ttl: cache.entity_ttl,
            cancel: CancellationToken::new(),
            fallbacks_served: AtomicU64::new(0),
        })
    }

    /// Run every query under children of `cancel` instead of a private root
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Build a client that talks to the configured upstream over HTTP
    pub fn from_config(config: &AppConfig) -> Result<Self, UpstreamError> {
        let transport = Arc::new(HttpTransport::new(&config.pendo)?);
        Self::new(
            transport,
            config.resilience.clone(),
            &config.cache,
            &config.fallback,
        )
    }

    /// Run variants with the retry policy applied to whole-run outages
    async fn fetch(
        &self,
        variants: &[RequestVariant],
        cancel: &CancellationToken,
    ) -> Result<VariantRun, UpstreamError> {
        let resource = variants
            .first()
            .map_or(ResourceClass::Aggregation, |v| v.resource);
        let policy = self.registry.policy(resource);

        retry_with_backoff(
            self.registry.retry_config(),
            cancel,
            |_, _| policy.record_retry(),
            move |_| run_variants(&self.registry, self.transport.as_ref(), variants, cancel),
        )
        .await
    }

    async fn cache_get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.cache.get(key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed");
                None
            }
        }
    }

    async fn cache_set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        if let Err(e) = self.cache.set(key, value, Some(ttl)).await {
            tracing::warn!(key = %key, error = %e, "Cache write failed");
        }
    }

    // =========================================================================
    // Entities
    // =========================================================================

    /// List entities of one kind, one page at a time
    pub async fn list_entities(
        &self,
        kind: EntityKind,
        page: u32,
        limit: u32,
    ) -> Result<EntityPage, UpstreamError> {
        let key = CacheKey::entities(kind);
        let (entities, cached) = match self.cache_get::<Vec<EntitySummary>>(&key).await {
            Some(entities) => (entities, true),
            None => {
                let entities = self.fetch_entities(kind).await?;
                self.cache_set(&key, &entities, self.entity_ttl).await;
                (entities, false)
            }
        };

        let total = entities.len() as u64;
        let offset = (page.saturating_sub(1) as usize).saturating_mul(limit as usize);
        let entities = entities
            .into_iter()
            .skip(offset)
            .take(limit as usize)
            .collect();

        Ok(EntityPage {
            entities,
            total,
            cached,
        })
    }

    async fn fetch_entities(&self, kind: EntityKind) -> Result<Vec<EntitySummary>, UpstreamError> {
        let cancel = self.cancel.child_token();
        let variant = entity_list_variant(kind);

        match self.fetch(slice::from_ref(&variant), &cancel).await? {
            VariantRun::Success { payload, .. } => Ok(normalize_entities(kind, &payload.rows)),
            VariantRun::Exhausted {
                last_failure: Some(reason),
                schema_mismatch: true,
                ..
            } => Err(reason.into_error()),
            VariantRun::Exhausted { .. } => Ok(Vec::new()),
        }
    }

    // =========================================================================
    // Analytics
    // =========================================================================

    /// Fetch one metric family for one entity
    ///
    /// Upstream outages, rate limits and open circuits are returned as
    /// errors. A schema mismatch resolves to fallback data.
    pub async fn get_analytics(
        &self,
        query: &AnalyticsQuery,
    ) -> Result<AnalyticsResult, UpstreamError> {
        let key = CacheKey::upstream("analytics", &query.cache_params());
        if let Some(hit) = self.cache_get::<CachedAnalytics>(&key).await {
            tracing::debug!(kind = %query.kind, id = %query.entity_id, family = %query.family, "Analytics cache hit");
            return Ok(AnalyticsResult {
                query: query.clone(),
                data: hit.data,
                source: hit.source,
                variant: hit.variant,
                attempts: Vec::new(),
                cached: true,
                etag: hit.etag,
                generated_at: hit.generated_at,
                warning: None,
            });
        }

        let cancel = self.cancel.child_token();
        let variants = variants_for(query);

        let result = match self.fetch(&variants, &cancel).await? {
            VariantRun::Success {
                variant,
                payload,
                attempts,
            } => {
                let data = normalize(query.family, &payload.rows);
                if data.is_empty() {
                    tracing::warn!(
                        kind = %query.kind,
                        id = %query.entity_id,
                        family = %query.family,
                        variant = %variant,
                        rows = payload.rows.len(),
                        "Upstream rows could not be normalized"
                    );
                    return Ok(self.fallback_result(
                        query,
                        attempts,
                        "Upstream returned rows in an unrecognized shape",
                    ));
                }
                AnalyticsResult {
                    query: query.clone(),
                    data,
                    source: DataSource::Real,
                    variant: Some(variant),
                    attempts,
                    cached: false,
                    etag: payload.etag,
                    generated_at: Utc::now(),
                    warning: None,
                }
            }
            VariantRun::Exhausted {
                attempts,
                schema_mismatch: true,
                ..
            } => {
                tracing::warn!(
                    kind = %query.kind,
                    id = %query.entity_id,
                    family = %query.family,
                    attempts = attempts.len(),
                    "All request variants rejected, serving fallback"
                );
                return Ok(self.fallback_result(
                    query,
                    attempts,
                    "Upstream rejected every request shape",
                ));
            }
            VariantRun::Exhausted { attempts, .. } => AnalyticsResult {
                query: query.clone(),
                data: Records::empty(query.family),
                source: DataSource::Empty,
                variant: None,
                attempts,
                cached: false,
                etag: None,
                generated_at: Utc::now(),
                warning: None,
            },
        };

        let entry = CachedAnalytics {
            data: result.data.clone(),
            source: result.source,
            variant: result.variant.clone(),
            etag: result.etag.clone(),
            generated_at: result.generated_at,
        };
        self.cache_set(&key, &entry, self.analytics_ttl).await;

        Ok(result)
    }

    /// Synthetic data when enabled, otherwise an empty result; never cached
    fn fallback_result(
        &self,
        query: &AnalyticsQuery,
        attempts: Vec<AttemptRecord>,
        warning: impl Into<String>,
    ) -> AnalyticsResult {
        let (data, source) = if self.fallback_enabled {
            self.fallbacks_served.fetch_add(1, Ordering::Relaxed);
            (
                self.fallback.generate(query.family, &query.period),
                DataSource::Synthetic,
            )
        } else {
            (Records::empty(query.family), DataSource::Empty)
        };

        AnalyticsResult {
            query: query.clone(),
            data,
            source,
            variant: None,
            attempts,
            cached: false,
            etag: None,
            generated_at: Utc::now(),
            warning: Some(warning.into()),
        }
    }

    /// Every supported family for one entity, fetched concurrently
    ///
    /// A failing branch becomes a fallback result carrying the error as a
    /// warning; the other branches are unaffected.
    pub async fn get_overview(
        &self,
        kind: EntityKind,
        entity_id: &str,
        period: Period,
    ) -> Result<Overview, UpstreamError> {
        let queries = kind
            .families()
            .into_iter()
            .map(|family| AnalyticsQuery::new(kind, entity_id, period, family))
            .collect::<Result<Vec<_>, _>>()?;

        let outcomes = join_all(queries.iter().map(|q| self.get_analytics(q))).await;

        let mut results = Vec::with_capacity(queries.len());
        for (query, outcome) in queries.iter().zip(outcomes) {
            match outcome {
                Ok(result) => results.push(result),
                Err(UpstreamError::Cancelled) => return Err(UpstreamError::Cancelled),
                Err(e) => {
                    tracing::warn!(
                        kind = %kind,
                        id = %entity_id,
                        family = %query.family,
                        error = %e,
                        "Overview branch failed, serving fallback"
                    );
                    results.push(self.fallback_result(query, Vec::new(), e.to_string()));
                }
            }
        }

        Ok(Overview {
            kind,
            entity_id: entity_id.trim().to_string(),
            period,
            results,
            generated_at: Utc::now(),
        })
    }

    // =========================================================================
    // Operations
    // =========================================================================

    pub fn health_check(&self) -> HealthReport {
        self.registry.health()
    }

    pub async fn get_metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            resources: self.registry.health().resources,
            cache: self.cache.stats().await,
            fallbacks_served: self.fallbacks_served.load(Ordering::Relaxed),
            collected_at: Utc::now(),
        }
    }

    pub async fn clear_cache(&self) -> Result<u64, CacheError> {
        self.cache.clear().await
    }

    /// Abort every in-flight upstream call
    pub fn cancel_all(&self) {
        self.cancel.cancel();
    }

    /// Periodically log health status transitions
    pub fn start_health_monitor(
        self: &Arc<Self>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let client = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(HEALTH_MONITOR_INTERVAL_SECS));
            let mut last = HealthStatus::Healthy;
            loop {
                tokio::select! {
                    biased;
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            tracing::debug!("Health monitor shutting down");
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        let report = client.health_check();
                        if report.status != last {
                            let level_up = report.status > last;
                            if level_up {
                                tracing::warn!(
                                    from = last.as_str(),
                                    to = report.status.as_str(),
                                    success_rate = report.success_rate,
                                    circuit = report.circuit_breaker_state.as_str(),
                                    "Upstream health degraded"
                                );
                            } else {
                                tracing::info!(
                                    from = last.as_str(),
                                    to = report.status.as_str(),
                                    "Upstream health recovered"
                                );
                            }
                            last = report.status;
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::CircuitBreakerConfig;
    use crate::data::pendo::testing::{
        MockTransport, bad_request, rate_limited, server_error, success,
    };
    use crate::data::pendo::{MetricFamily, RateLimitOrigin, UpstreamOutcome};
    use chrono::NaiveDate;
    use serde_json::json;

    fn period() -> Period {
        Period::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 7).unwrap(),
        )
        .unwrap()
    }

    fn query(family: MetricFamily) -> AnalyticsQuery {
        AnalyticsQuery::new(EntityKind::Guide, "g1", period(), family).unwrap()
    }

    fn resilience(failure_threshold: u32) -> ResilienceConfig {
        ResilienceConfig {
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn client(transport: Arc<MockTransport>) -> AnalyticsClient {
        AnalyticsClient::new(
            transport,
            resilience(100),
            &CacheConfig::default(),
            &FallbackConfig {
                enabled: true,
                size: 5,
                seed: Some(1),
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_empty_then_500_then_success() {
        let transport = Arc::new(MockTransport::new(vec![
            UpstreamOutcome::Empty,
            server_error(500),
            success(vec![json!({"eventTime": "2024-01-01", "visitorId": 5})]),
        ]));
        let client = client(transport.clone());

        let result = client.get_analytics(&query(MetricFamily::TimeSeries)).await.unwrap();

        assert_eq!(transport.calls(), 3);
        assert_eq!(result.source, DataSource::Real);
        assert_eq!(result.variant.as_deref(), Some("server-time-post"));
        let Records::TimeSeries(points) = &result.data else {
            panic!("expected time series");
        };
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(points[0].views, 5);
    }

    #[tokio::test]
    async fn test_second_call_is_served_from_cache() {
        let transport = Arc::new(MockTransport::always(success(vec![
            json!({"country": "Japan", "region": "Tokyo", "numUsers": 4}),
        ])));
        let client = client(transport.clone());
        let q = query(MetricFamily::Geography);

        let first = client.get_analytics(&q).await.unwrap();
        let second = client.get_analytics(&q).await.unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.data, second.data);
        assert_eq!(transport.calls(), 1);
        assert_eq!(client.get_metrics().await.cache.hits, 1);
    }

    #[tokio::test]
    async fn test_no_data_is_empty_not_synthetic() {
        let transport = Arc::new(MockTransport::always(UpstreamOutcome::Empty));
        let client = client(transport.clone());

        let result = client.get_analytics(&query(MetricFamily::Devices)).await.unwrap();
        assert_eq!(result.source, DataSource::Empty);
        assert!(result.data.is_empty());
        assert_eq!(result.attempts.len(), 4);
    }

    #[tokio::test]
    async fn test_schema_mismatch_serves_uncached_fallback() {
        let transport = Arc::new(MockTransport::always(bad_request()));
        let client = client(transport.clone());
        let q = query(MetricFamily::Steps);

        let result = client.get_analytics(&q).await.unwrap();
        assert_eq!(result.source, DataSource::Synthetic);
        assert!(result.warning.is_some());
        assert_eq!(result.data.len(), 5);

        let again = client.get_analytics(&q).await.unwrap();
        assert!(!again.cached);
        assert_eq!(client.get_metrics().await.fallbacks_served, 2);
    }

    #[tokio::test]
    async fn test_unrecognized_rows_fall_back() {
        let transport = Arc::new(MockTransport::always(success(vec![json!({"foo": "bar"})])));
        let client = client(transport);

        let result = client.get_analytics(&query(MetricFamily::TimeSeries)).await.unwrap();
        assert_eq!(result.source, DataSource::Synthetic);
    }

    #[tokio::test]
    async fn test_fallback_disabled_yields_empty() {
        let transport = Arc::new(MockTransport::always(bad_request()));
        let client = AnalyticsClient::new(
            transport,
            ResilienceConfig::default(),
            &CacheConfig::default(),
            &FallbackConfig {
                enabled: false,
                ..Default::default()
            },
        )
        .unwrap();

        let result = client.get_analytics(&query(MetricFamily::Polls)).await.unwrap();
        assert_eq!(result.source, DataSource::Empty);
        assert!(result.warning.is_some());
    }

    #[tokio::test]
    async fn test_rate_limit_surfaces_immediately() {
        let transport = Arc::new(MockTransport::new(vec![rate_limited(Duration::from_secs(5))]));
        let client = client(transport.clone());

        let err = client
            .get_analytics(&query(MetricFamily::TimeSeries))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            UpstreamError::RateLimited {
                retry_after: Duration::from_millis(5000),
                origin: RateLimitOrigin::Upstream,
            }
        );
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_outage_is_retried_then_surfaced() {
        let transport = Arc::new(MockTransport::always(server_error(503)));
        let client = client(transport.clone());

        let err = client
            .get_analytics(&query(MetricFamily::TimeSeries))
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Http { status: 503, .. }));
        // Three runs of four variants
        assert_eq!(transport.calls(), 12);
    }

    #[tokio::test]
    async fn test_overview_isolates_failing_branches() {
        // The first rejection trips the breaker; every later branch is refused
        let transport = Arc::new(MockTransport::always(bad_request()));
        let client = AnalyticsClient::new(
            transport,
            resilience(1),
            &CacheConfig::default(),
            &FallbackConfig {
                enabled: true,
                size: 3,
                seed: Some(5),
            },
        )
        .unwrap();

        let overview = client
            .get_overview(EntityKind::Guide, "g1", period())
            .await
            .unwrap();

        assert_eq!(overview.results.len(), 5);
        assert!(
            overview
                .results
                .iter()
                .all(|r| r.source == DataSource::Synthetic && r.warning.is_some())
        );
        assert!(
            overview
                .results
                .iter()
                .any(|r| r.warning.as_deref().is_some_and(|w| w.contains("Circuit breaker open")))
        );
    }

    #[tokio::test]
    async fn test_overview_covers_supported_families() {
        let transport = Arc::new(MockTransport::always(UpstreamOutcome::Empty));
        let client = client(transport);

        let overview = client
            .get_overview(EntityKind::Page, " p1 ", period())
            .await
            .unwrap();

        let families: Vec<_> = overview.results.iter().map(|r| r.data.family()).collect();
        assert_eq!(
            families,
            vec![
                MetricFamily::TimeSeries,
                MetricFamily::Devices,
                MetricFamily::Geography
            ]
        );
        assert_eq!(overview.entity_id, "p1");
    }

    #[tokio::test]
    async fn test_list_entities_paginates_and_caches() {
        let rows = (1..=7)
            .map(|i| json!({"id": format!("g{}", i), "name": format!("Guide {}", i)}))
            .collect();
        let transport = Arc::new(MockTransport::always(success(rows)));
        let client = client(transport.clone());

        let first = client.list_entities(EntityKind::Guide, 1, 5).await.unwrap();
        assert_eq!(first.total, 7);
        assert_eq!(first.entities.len(), 5);
        assert!(!first.cached);

        let second = client.list_entities(EntityKind::Guide, 2, 5).await.unwrap();
        assert_eq!(second.entities.len(), 2);
        assert_eq!(second.entities[0].id, "g6");
        assert!(second.cached);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_list_entities_fatal_is_an_error() {
        let transport = Arc::new(MockTransport::always(bad_request()));
        let client = client(transport);

        let err = client.list_entities(EntityKind::Page, 1, 10).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Http { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_cancel_all_aborts_queries() {
        let transport = Arc::new(MockTransport::always(UpstreamOutcome::Empty));
        let client = client(transport.clone());
        client.cancel_all();

        let err = client
            .get_analytics(&query(MetricFamily::TimeSeries))
            .await
            .unwrap_err();
        assert_eq!(err, UpstreamError::Cancelled);
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_clear_cache() {
        let transport = Arc::new(MockTransport::always(success(vec![json!({"id": "f1"})])));
        let client = client(transport);
        client.list_entities(EntityKind::Feature, 1, 10).await.unwrap();

        assert_eq!(client.clear_cache().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_health_starts_healthy() {
        let client = client(Arc::new(MockTransport::always(UpstreamOutcome::Empty)));
        let report = client.health_check();
        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.success_rate, 100.0);
    }

    #[tokio::test]
    async fn test_health_monitor_stops_on_shutdown() {
        let client = Arc::new(client(Arc::new(MockTransport::always(UpstreamOutcome::Empty))));
        let (tx, rx) = watch::channel(false);
        let handle = client.start_health_monitor(rx);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
