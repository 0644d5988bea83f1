use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::utils::file::expand_path;

use super::cli::CliConfig;
use super::constants::{
    APP_DOT_FOLDER, CONFIG_FILE_NAME, DEFAULT_BURST_LIMIT, DEFAULT_CACHE_MAX_ENTRIES,
    DEFAULT_CACHE_TTL_SECS, DEFAULT_ENTITY_CACHE_TTL_SECS, DEFAULT_FAILURE_THRESHOLD,
    DEFAULT_FALLBACK_SIZE, DEFAULT_HOST, DEFAULT_MAX_QUEUE_WAIT_MS, DEFAULT_MONITORING_WINDOW_MS,
    DEFAULT_PENDO_BASE_URL, DEFAULT_PENDO_TIMEOUT_SECS, DEFAULT_PORT, DEFAULT_RECOVERY_TIMEOUT_MS,
    DEFAULT_REQUESTS_PER_MINUTE, DEFAULT_REQUESTS_PER_SECOND, DEFAULT_RETRY_BACKOFF_MULTIPLIER,
    DEFAULT_RETRY_BASE_DELAY_MS, DEFAULT_RETRY_JITTER_RATIO, DEFAULT_RETRY_MAX_ATTEMPTS,
    DEFAULT_RETRY_MAX_DELAY_MS, ENV_PENDO_API_KEY,
};

// =============================================================================
// API Key
// =============================================================================

/// Pendo integration key. Never printed in full.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into().trim().to_string())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "ApiKey(<empty>)")
        } else {
            write!(f, "ApiKey(<redacted>)")
        }
    }
}

// =============================================================================
// File Config Structs (JSON deserialization)
// =============================================================================

/// Server configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ServerFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Extra origins allowed to call the API (dashboard dev servers)
    pub cors_origins: Option<Vec<String>>,
}

/// Upstream API section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct PendoFileConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Circuit breaker section (nested under resilience)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct CircuitBreakerFileConfig {
    pub failure_threshold: Option<u32>,
    pub recovery_timeout_ms: Option<u64>,
    pub monitoring_window_ms: Option<u64>,
}

/// Token bucket section (nested under resilience)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct RateLimitFileConfig {
    pub requests_per_second: Option<u32>,
    pub burst_limit: Option<u32>,
    pub requests_per_minute: Option<u32>,
    pub max_queue_wait_ms: Option<u64>,
}

/// Retry section (nested under resilience)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct RetryFileConfig {
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub backoff_multiplier: Option<f64>,
    pub jitter_ratio: Option<f64>,
}

/// Resilience section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ResilienceFileConfig {
    pub circuit_breaker: Option<CircuitBreakerFileConfig>,
    pub rate_limit: Option<RateLimitFileConfig>,
    pub retry: Option<RetryFileConfig>,
}

/// Response cache section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct CacheFileConfig {
    pub enabled: Option<bool>,
    pub max_entries: Option<u64>,
    pub ttl_secs: Option<u64>,
    pub entity_ttl_secs: Option<u64>,
}

/// Synthetic fallback section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct FallbackFileConfig {
    pub enabled: Option<bool>,
    pub size: Option<usize>,
    pub seed: Option<u64>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub server: Option<ServerFileConfig>,
    pub pendo: Option<PendoFileConfig>,
    pub resilience: Option<ResilienceFileConfig>,
    pub cache: Option<CacheFileConfig>,
    pub fallback: Option<FallbackFileConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

/// Overwrite `target` with `source` when the source field is set
macro_rules! merge_fields {
    ($target:expr, $source:expr, $section:literal, [$($field:ident),+ $(,)?]) => {
        $(
            if $source.$field.is_some() {
                tracing::trace!(value = ?$source.$field, "Merging {}.{}", $section, stringify!($field));
                $target.$field = $source.$field;
            }
        )+
    };
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Warn about unknown top-level fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }

    /// Merge another FileConfig into this one (other takes precedence)
    fn merge(&mut self, other: FileConfig) {
        if let Some(server) = other.server {
            let current = self.server.get_or_insert_with(ServerFileConfig::default);
            merge_fields!(current, server, "server", [host, port, cors_origins]);
        }

        if let Some(pendo) = other.pendo {
            let current = self.pendo.get_or_insert_with(PendoFileConfig::default);
            merge_fields!(current, pendo, "pendo", [base_url, api_key, timeout_secs]);
        }

        if let Some(resilience) = other.resilience {
            let current = self
                .resilience
                .get_or_insert_with(ResilienceFileConfig::default);

            if let Some(breaker) = resilience.circuit_breaker {
                let target = current
                    .circuit_breaker
                    .get_or_insert_with(CircuitBreakerFileConfig::default);
                merge_fields!(
                    target,
                    breaker,
                    "resilience.circuit_breaker",
                    [failure_threshold, recovery_timeout_ms, monitoring_window_ms]
                );
            }

            if let Some(rate_limit) = resilience.rate_limit {
                let target = current
                    .rate_limit
                    .get_or_insert_with(RateLimitFileConfig::default);
                merge_fields!(
                    target,
                    rate_limit,
                    "resilience.rate_limit",
                    [
                        requests_per_second,
                        burst_limit,
                        requests_per_minute,
                        max_queue_wait_ms
                    ]
                );
            }

            if let Some(retry) = resilience.retry {
                let target = current.retry.get_or_insert_with(RetryFileConfig::default);
                merge_fields!(
                    target,
                    retry,
                    "resilience.retry",
                    [
                        max_attempts,
                        base_delay_ms,
                        max_delay_ms,
                        backoff_multiplier,
                        jitter_ratio
                    ]
                );
            }
        }

        if let Some(cache) = other.cache {
            let current = self.cache.get_or_insert_with(CacheFileConfig::default);
            merge_fields!(
                current,
                cache,
                "cache",
                [enabled, max_entries, ttl_secs, entity_ttl_secs]
            );
        }

        if let Some(fallback) = other.fallback {
            let current = self.fallback.get_or_insert_with(FallbackFileConfig::default);
            merge_fields!(current, fallback, "fallback", [enabled, size, seed]);
        }
    }
}

// =============================================================================
// Runtime Config Structs (final merged configuration)
// =============================================================================

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

/// Upstream API configuration
#[derive(Debug, Clone)]
pub struct PendoConfig {
    pub base_url: String,
    pub api_key: ApiKey,
    pub timeout: Duration,
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub monitoring_window: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout: Duration::from_millis(DEFAULT_RECOVERY_TIMEOUT_MS),
            monitoring_window: Duration::from_millis(DEFAULT_MONITORING_WINDOW_MS),
        }
    }
}

/// Token bucket configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    pub burst_limit: u32,
    pub requests_per_minute: u32,
    pub max_queue_wait: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
            burst_limit: DEFAULT_BURST_LIMIT,
            requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE,
            max_queue_wait: Duration::from_millis(DEFAULT_MAX_QUEUE_WAIT_MS),
        }
    }
}

/// Retry/backoff configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter_ratio: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_RETRY_MAX_DELAY_MS),
            backoff_multiplier: DEFAULT_RETRY_BACKOFF_MULTIPLIER,
            jitter_ratio: DEFAULT_RETRY_JITTER_RATIO,
        }
    }
}

/// Resilience policy configuration, shared by every resource class
#[derive(Debug, Clone, Default)]
pub struct ResilienceConfig {
    pub circuit_breaker: CircuitBreakerConfig,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
}

/// Response cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: u64,
    pub ttl: Duration,
    pub entity_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            entity_ttl: Duration::from_secs(DEFAULT_ENTITY_CACHE_TTL_SECS),
        }
    }
}

/// Synthetic fallback configuration
#[derive(Debug, Clone)]
pub struct FallbackConfig {
    pub enabled: bool,
    pub size: usize,
    pub seed: Option<u64>,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            size: DEFAULT_FALLBACK_SIZE,
            seed: None,
        }
    }
}

/// Final merged application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub pendo: PendoConfig,
    pub resilience: ResilienceConfig,
    pub cache: CacheConfig,
    pub fallback: FallbackConfig,
}

impl AppConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. Profile directory config (~/.pendo-insights/pendo-insights.json)
    /// 3. Local directory config OR CLI-specified config path
    /// 4. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading application configuration");
        tracing::trace!(cli = ?cli, "CLI config");

        let mut file_config = FileConfig::default();
        let mut found_configs: Vec<String> = Vec::new();

        if let Some(profile_path) = get_profile_config_path()
            && profile_path.exists()
        {
            let profile_config = FileConfig::load_from_file(&profile_path)?;
            profile_config.warn_unknown_fields();
            file_config.merge(profile_config);
            found_configs.push(profile_path.display().to_string());
        }

        let overlay_path = if let Some(ref path) = cli.config {
            let expanded = expand_path(&path.to_string_lossy());
            if !expanded.exists() {
                anyhow::bail!("Config file not found: {}", expanded.display());
            }
            Some(expanded)
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        if let Some(path) = overlay_path {
            let overlay_config = FileConfig::load_from_file(&path)?;
            overlay_config.warn_unknown_fields();
            file_config.merge(overlay_config);
            found_configs.push(path.display().to_string());
        }

        tracing::debug!(configs = ?found_configs, "Config files loaded");

        let config = Self::from_layers(file_config, cli);
        config.validate()?;
        Ok(config)
    }

    /// Layer defaults, file values and CLI/env overrides
    fn from_layers(file_config: FileConfig, cli: &CliConfig) -> Self {
        let file_server = file_config.server.unwrap_or_default();
        let file_pendo = file_config.pendo.unwrap_or_default();
        let file_resilience = file_config.resilience.unwrap_or_default();
        let file_breaker = file_resilience.circuit_breaker.unwrap_or_default();
        let file_rate_limit = file_resilience.rate_limit.unwrap_or_default();
        let file_retry = file_resilience.retry.unwrap_or_default();
        let file_cache = file_config.cache.unwrap_or_default();
        let file_fallback = file_config.fallback.unwrap_or_default();

        let server = ServerConfig {
            host: cli
                .host
                .clone()
                .or(file_server.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: cli.port.or(file_server.port).unwrap_or(DEFAULT_PORT),
            cors_origins: file_server.cors_origins.unwrap_or_default(),
        };

        let pendo = PendoConfig {
            base_url: cli
                .pendo_base_url
                .clone()
                .or(file_pendo.base_url)
                .unwrap_or_else(|| DEFAULT_PENDO_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: cli
                .pendo_api_key
                .clone()
                .or_else(|| file_pendo.api_key.map(ApiKey::new))
                .unwrap_or_default(),
            timeout: Duration::from_secs(
                cli.pendo_timeout_secs
                    .or(file_pendo.timeout_secs)
                    .unwrap_or(DEFAULT_PENDO_TIMEOUT_SECS),
            ),
        };

        let breaker_defaults = CircuitBreakerConfig::default();
        let circuit_breaker = CircuitBreakerConfig {
            failure_threshold: file_breaker
                .failure_threshold
                .unwrap_or(breaker_defaults.failure_threshold),
            recovery_timeout: file_breaker
                .recovery_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(breaker_defaults.recovery_timeout),
            monitoring_window: file_breaker
                .monitoring_window_ms
                .map(Duration::from_millis)
                .unwrap_or(breaker_defaults.monitoring_window),
        };

        let rate_defaults = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            requests_per_second: cli
                .rate_limit_rps
                .or(file_rate_limit.requests_per_second)
                .unwrap_or(rate_defaults.requests_per_second),
            burst_limit: file_rate_limit
                .burst_limit
                .unwrap_or(rate_defaults.burst_limit),
            requests_per_minute: file_rate_limit
                .requests_per_minute
                .unwrap_or(rate_defaults.requests_per_minute),
            max_queue_wait: file_rate_limit
                .max_queue_wait_ms
                .map(Duration::from_millis)
                .unwrap_or(rate_defaults.max_queue_wait),
        };

        let retry_defaults = RetryConfig::default();
        let retry = RetryConfig {
            max_attempts: file_retry
                .max_attempts
                .unwrap_or(retry_defaults.max_attempts),
            base_delay: file_retry
                .base_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(retry_defaults.base_delay),
            max_delay: file_retry
                .max_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(retry_defaults.max_delay),
            backoff_multiplier: file_retry
                .backoff_multiplier
                .unwrap_or(retry_defaults.backoff_multiplier),
            jitter_ratio: file_retry
                .jitter_ratio
                .unwrap_or(retry_defaults.jitter_ratio),
        };

        let cache_defaults = CacheConfig::default();
        let cache = CacheConfig {
            enabled: cli
                .cache_enabled
                .or(file_cache.enabled)
                .unwrap_or(cache_defaults.enabled),
            max_entries: cli
                .cache_max_entries
                .or(file_cache.max_entries)
                .unwrap_or(cache_defaults.max_entries),
            ttl: file_cache
                .ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(cache_defaults.ttl),
            entity_ttl: file_cache
                .entity_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(cache_defaults.entity_ttl),
        };

        let fallback_defaults = FallbackConfig::default();
        let fallback = FallbackConfig {
            enabled: cli
                .fallback_enabled
                .or(file_fallback.enabled)
                .unwrap_or(fallback_defaults.enabled),
            size: file_fallback.size.unwrap_or(fallback_defaults.size),
            seed: cli.fallback_seed.or(file_fallback.seed),
        };

        Self {
            server,
            pendo,
            resilience: ResilienceConfig {
                circuit_breaker,
                rate_limit,
                retry,
            },
            cache,
            fallback,
        }
    }

    /// Validate the merged configuration
    fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            anyhow::bail!("Configuration error: server.host must not be empty");
        }
        if self.server.port == 0 {
            anyhow::bail!("Configuration error: server.port must be greater than 0");
        }

        if self.pendo.api_key.is_empty() {
            anyhow::bail!(
                "Configuration error: pendo.api_key is required (set {} or pass --pendo-api-key)",
                ENV_PENDO_API_KEY
            );
        }
        if !self.pendo.base_url.starts_with("http://") && !self.pendo.base_url.starts_with("https://")
        {
            anyhow::bail!(
                "Configuration error: pendo.base_url must be an http(s) URL, got '{}'",
                self.pendo.base_url
            );
        }
        if self.pendo.timeout.is_zero() {
            anyhow::bail!("Configuration error: pendo.timeout_secs must be greater than 0");
        }

        let breaker = &self.resilience.circuit_breaker;
        if breaker.failure_threshold == 0 {
            anyhow::bail!(
                "Configuration error: resilience.circuit_breaker.failure_threshold must be greater than 0"
            );
        }
        if breaker.monitoring_window.is_zero() {
            anyhow::bail!(
                "Configuration error: resilience.circuit_breaker.monitoring_window_ms must be greater than 0"
            );
        }

        let rate_limit = &self.resilience.rate_limit;
        if rate_limit.requests_per_second == 0 || rate_limit.burst_limit == 0 {
            anyhow::bail!(
                "Configuration error: resilience.rate_limit.requests_per_second and burst_limit must be greater than 0"
            );
        }
        if rate_limit.requests_per_minute < rate_limit.burst_limit {
            anyhow::bail!(
                "Configuration error: resilience.rate_limit.requests_per_minute ({}) must be at least burst_limit ({})",
                rate_limit.requests_per_minute,
                rate_limit.burst_limit
            );
        }

        let retry = &self.resilience.retry;
        if retry.max_attempts == 0 {
            anyhow::bail!("Configuration error: resilience.retry.max_attempts must be at least 1");
        }
        if retry.backoff_multiplier < 1.0 {
            anyhow::bail!(
                "Configuration error: resilience.retry.backoff_multiplier must be >= 1.0"
            );
        }
        if !(0.0..1.0).contains(&retry.jitter_ratio) {
            anyhow::bail!(
                "Configuration error: resilience.retry.jitter_ratio must be in [0.0, 1.0)"
            );
        }
        if retry.max_delay < retry.base_delay {
            anyhow::bail!(
                "Configuration error: resilience.retry.max_delay_ms must be >= base_delay_ms"
            );
        }

        if self.cache.enabled && self.cache.max_entries == 0 {
            anyhow::bail!("Configuration error: cache.max_entries must be greater than 0");
        }
        if self.fallback.size == 0 {
            anyhow::bail!("Configuration error: fallback.size must be greater than 0");
        }

        if is_all_interfaces(&self.server.host) {
            tracing::warn!(
                host = %self.server.host,
                "Server bound to all interfaces; the API has no authentication"
            );
        }

        Ok(())
    }
}

/// Get the profile config path (~/.pendo-insights/pendo-insights.json)
fn get_profile_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(APP_DOT_FOLDER).join(CONFIG_FILE_NAME))
}

/// Check if host binds to all network interfaces
pub fn is_all_interfaces(host: &str) -> bool {
    matches!(host, "0.0.0.0" | "::" | "[::]")
}
