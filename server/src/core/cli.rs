use clap::{Parser, Subcommand};

use std::path::PathBuf;

use super::config::ApiKey;
use super::constants::{
    ENV_CACHE_ENABLED, ENV_CACHE_MAX_ENTRIES, ENV_CONFIG, ENV_FALLBACK_ENABLED, ENV_FALLBACK_SEED,
    ENV_HOST, ENV_PENDO_API_KEY, ENV_PENDO_BASE_URL, ENV_PENDO_TIMEOUT_SECS, ENV_PORT,
    ENV_RATE_LIMIT_RPS,
};

#[derive(Parser)]
#[command(name = "pendo-insights")]
#[command(version, about = "Resilient Pendo analytics service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Server host address
    #[arg(long, short = 'H', global = true, env = ENV_HOST)]
    pub host: Option<String>,

    /// Server port
    #[arg(long, short = 'p', global = true, env = ENV_PORT)]
    pub port: Option<u16>,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Pendo integration key
    #[arg(long, global = true, env = ENV_PENDO_API_KEY, hide_env_values = true)]
    pub pendo_api_key: Option<String>,

    /// Pendo API base URL
    #[arg(long, global = true, env = ENV_PENDO_BASE_URL)]
    pub pendo_base_url: Option<String>,

    /// Upstream request timeout in seconds
    #[arg(long, global = true, env = ENV_PENDO_TIMEOUT_SECS)]
    pub pendo_timeout_secs: Option<u64>,

    /// Sustained upstream requests per second
    #[arg(long, global = true, env = ENV_RATE_LIMIT_RPS)]
    pub rate_limit_rps: Option<u32>,

    /// Enable or disable the response cache
    #[arg(long, global = true, env = ENV_CACHE_ENABLED)]
    pub cache_enabled: Option<bool>,

    /// Maximum number of cached responses
    #[arg(long, global = true, env = ENV_CACHE_MAX_ENTRIES)]
    pub cache_max_entries: Option<u64>,

    /// Serve synthetic data when the upstream shape cannot be read
    #[arg(long, global = true, env = ENV_FALLBACK_ENABLED)]
    pub fallback_enabled: Option<bool>,

    /// Fixed seed for synthetic data (reproducible demos)
    #[arg(long, global = true, env = ENV_FALLBACK_SEED)]
    pub fallback_seed: Option<u64>,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Start the server (default command)
    Start,
    /// List guides once and print the upstream health report
    Check,
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub config: Option<PathBuf>,
    pub pendo_api_key: Option<ApiKey>,
    pub pendo_base_url: Option<String>,
    pub pendo_timeout_secs: Option<u64>,
    pub rate_limit_rps: Option<u32>,
    pub cache_enabled: Option<bool>,
    pub cache_max_entries: Option<u64>,
    pub fallback_enabled: Option<bool>,
    pub fallback_seed: Option<u64>,
}

impl From<Cli> for CliConfig {
    fn from(cli: Cli) -> Self {
        Self {
            host: cli.host,
            port: cli.port,
            config: cli.config,
            pendo_api_key: cli.pendo_api_key.map(ApiKey::new),
            pendo_base_url: cli.pendo_base_url,
            pendo_timeout_secs: cli.pendo_timeout_secs,
            rate_limit_rps: cli.rate_limit_rps,
            cache_enabled: cli.cache_enabled,
            cache_max_entries: cli.cache_max_entries,
            fallback_enabled: cli.fallback_enabled,
            fallback_seed: cli.fallback_seed,
        }
    }
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Option<Commands>) {
    let mut cli = Cli::parse();
    let command = cli.command.take();
    (CliConfig::from(cli), command)
}
