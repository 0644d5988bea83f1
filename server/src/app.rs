//! Core application

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::api::ApiServer;
use crate::core::banner;
use crate::core::cli::{self, CliConfig, Commands};
use crate::core::config::AppConfig;
use crate::core::constants::{APP_NAME_LOWER, ENV_LOG};
use crate::core::shutdown::ShutdownService;
use crate::data::pendo::EntityKind;
use crate::domain::analytics::AnalyticsClient;

/// Guides fetched by `check`
const CHECK_PAGE_SIZE: u32 = 10;

pub struct CoreApp {
    pub shutdown: ShutdownService,
    pub config: AppConfig,
    pub client: Arc<AnalyticsClient>,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Application starting");

        let (cli_config, command) = cli::parse();
        tracing::trace!(command = ?command, "Parsed command");

        let app = Self::init(&cli_config)?;
        match command {
            Some(Commands::Check) => app.check().await,
            Some(Commands::Start) | None => Self::start_server(app).await,
        }
    }

    fn init(cli: &CliConfig) -> Result<Self> {
        let config = AppConfig::load(cli)?;
        let shutdown = ShutdownService::new();

        let client = AnalyticsClient::from_config(&config)
            .context("Failed to initialize analytics client")?
            .with_cancellation(shutdown.cancellation_token());

        tracing::debug!(
            base_url = %config.pendo.base_url,
            cache = config.cache.enabled,
            fallback = config.fallback.enabled,
            "Analytics client initialized"
        );

        Ok(Self {
            shutdown,
            config,
            client: Arc::new(client),
        })
    }

    /// One upstream round trip followed by the health report
    async fn check(&self) -> Result<()> {
        let listing = self
            .client
            .list_entities(EntityKind::Guide, 1, CHECK_PAGE_SIZE)
            .await;

        match &listing {
            Ok(page) => {
                println!("Connected to {}", self.config.pendo.base_url);
                println!("  {} guides available", page.total);
                for guide in &page.entities {
                    println!("  - {} ({})", guide.name, guide.id);
                }
            }
            Err(e) => println!("Upstream check failed: {}", e),
        }

        let report = self.client.health_check();
        println!();
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to render health report")?
        );

        listing
            .map(|_| ())
            .with_context(|| format!("Could not list guides from {}", self.config.pendo.base_url))
    }

    fn init_logging() {
        let default_filter = format!("info,{}=info", APP_NAME_LOWER.replace('-', "_"));

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }

    async fn start_server(app: Self) -> Result<()> {
        // Install signal handlers FIRST (before any blocking calls)
        app.shutdown.install_signal_handlers();

        app.start_background_tasks().await;

        banner::print_banner(&app.config);

        let server = ApiServer::new(app);
        let app = server.start().await?;
        app.shutdown.shutdown().await;

        Ok(())
    }

    pub async fn start_background_tasks(&self) {
        self.shutdown
            .register(self.client.start_health_monitor(self.shutdown.subscribe()))
            .await;

        tracing::debug!("Background tasks started");
    }
}
