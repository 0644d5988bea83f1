// =============================================================================
// Application Identity
// =============================================================================

/// Application name in title case (for display)
pub const APP_NAME: &str = "Pendo Insights";

/// Application name in lowercase (for paths and identifiers)
pub const APP_NAME_LOWER: &str = "pendo-insights";

/// Crate name as it appears in tracing targets
pub const LOG_TARGET: &str = "pendo_insights_server";

/// Unix-style dotfile folder name
pub const APP_DOT_FOLDER: &str = ".pendo-insights";

/// User agent sent with every upstream request
pub const USER_AGENT: &str = concat!("PendoInsights/", env!("CARGO_PKG_VERSION"));

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name
pub const CONFIG_FILE_NAME: &str = "pendo-insights.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "PENDO_INSIGHTS_CONFIG";

// =============================================================================
// Environment Variables - Server
// =============================================================================

/// Environment variable for server host
pub const ENV_HOST: &str = "PENDO_INSIGHTS_HOST";

/// Environment variable for server port
pub const ENV_PORT: &str = "PENDO_INSIGHTS_PORT";

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "PENDO_INSIGHTS_LOG";

// =============================================================================
// Environment Variables - Upstream
// =============================================================================

/// Pendo integration key
pub const ENV_PENDO_API_KEY: &str = "PENDO_API_KEY";

/// Pendo API base URL (regional hosts, proxies)
pub const ENV_PENDO_BASE_URL: &str = "PENDO_BASE_URL";

/// Per-request timeout in seconds
pub const ENV_PENDO_TIMEOUT_SECS: &str = "PENDO_INSIGHTS_TIMEOUT_SECS";

/// Enable or disable the response cache
pub const ENV_CACHE_ENABLED: &str = "PENDO_INSIGHTS_CACHE_ENABLED";

/// Maximum number of cached upstream responses
pub const ENV_CACHE_MAX_ENTRIES: &str = "PENDO_INSIGHTS_CACHE_MAX_ENTRIES";

/// Enable or disable synthetic fallback data
pub const ENV_FALLBACK_ENABLED: &str = "PENDO_INSIGHTS_FALLBACK_ENABLED";

/// Fixed seed for synthetic fallback data
pub const ENV_FALLBACK_SEED: &str = "PENDO_INSIGHTS_FALLBACK_SEED";

/// Sustained upstream request rate
pub const ENV_RATE_LIMIT_RPS: &str = "PENDO_INSIGHTS_RATE_LIMIT_RPS";

// =============================================================================
// Server Defaults
// =============================================================================

/// Default server host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default server port
pub const DEFAULT_PORT: u16 = 5390;

/// Default request body limit (1 MB); the API only accepts small bodies
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

/// Maximum time to wait for background tasks during shutdown
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Interval between health monitor checks
pub const HEALTH_MONITOR_INTERVAL_SECS: u64 = 30;

// =============================================================================
// Upstream Defaults
// =============================================================================

/// Default Pendo API host
pub const DEFAULT_PENDO_BASE_URL: &str = "https://app.pendo.io";

/// Header carrying the integration key
pub const PENDO_API_KEY_HEADER: &str = "X-Pendo-Integration-Key";

/// Default per-request timeout
pub const DEFAULT_PENDO_TIMEOUT_SECS: u64 = 15;

/// Aggregation endpoint path
pub const AGGREGATION_PATH: &str = "/api/v1/aggregation";

/// HTTP statuses treated as transient
pub const RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Cap on response body text kept in failure reasons
pub const MAX_ERROR_BODY_BYTES: usize = 2048;

/// Retry-After used when an upstream 429 carries no hint
pub const DEFAULT_UPSTREAM_RETRY_AFTER_MS: u64 = 1000;

/// Longest upstream Retry-After honored; larger hints are clamped
pub const MAX_RETRY_AFTER_SECS: u64 = 3600;

// =============================================================================
// Resilience Defaults
// =============================================================================

/// Failures within the monitoring window that open the breaker
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Time the breaker stays open before admitting a probe
pub const DEFAULT_RECOVERY_TIMEOUT_MS: u64 = 30_000;

/// Rolling window for counting failures
pub const DEFAULT_MONITORING_WINDOW_MS: u64 = 60_000;

/// Token refill rate
pub const DEFAULT_REQUESTS_PER_SECOND: u32 = 10;

/// Token bucket capacity
pub const DEFAULT_BURST_LIMIT: u32 = 20;

/// Hard ceiling over a sliding minute
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 600;

/// Longest a caller waits for a token before failing fast
pub const DEFAULT_MAX_QUEUE_WAIT_MS: u64 = 1000;

/// Retry attempts for transient outages (including the first)
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;

/// First backoff delay
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1000;

/// Backoff ceiling
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 30_000;

/// Backoff growth factor
pub const DEFAULT_RETRY_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Jitter applied to each delay, as a fraction of it
pub const DEFAULT_RETRY_JITTER_RATIO: f64 = 0.1;

// =============================================================================
// Health Thresholds
// =============================================================================

/// Minimum success rate (percent) for a healthy resource
pub const HEALTHY_MIN_SUCCESS_RATE: f64 = 95.0;

/// Maximum average latency for a healthy resource
pub const HEALTHY_MAX_LATENCY_MS: f64 = 2000.0;

/// Success rate (percent) below which a resource is unhealthy
pub const UNHEALTHY_SUCCESS_RATE: f64 = 90.0;

/// Average latency above which a resource is unhealthy
pub const UNHEALTHY_LATENCY_MS: f64 = 5000.0;

// =============================================================================
// Cache Defaults
// =============================================================================

/// Default maximum cache entries
pub const DEFAULT_CACHE_MAX_ENTRIES: u64 = 10_000;

/// Default TTL for analytics responses
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Default TTL for entity listings
pub const DEFAULT_ENTITY_CACHE_TTL_SECS: u64 = 900;

/// Cache key version prefix
/// Increment when cached payload format changes
pub const CACHE_KEY_VERSION: &str = "v1";

// =============================================================================
// Query Defaults
// =============================================================================

/// Period used when a request names no dates
pub const DEFAULT_PERIOD_DAYS: u32 = 30;

/// Longest accepted period
pub const MAX_PERIOD_DAYS: i64 = 366;

/// Default number of synthetic records for non-time-series families
pub const DEFAULT_FALLBACK_SIZE: usize = 5;
