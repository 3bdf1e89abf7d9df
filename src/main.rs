//! Pitwall
//!
//! Runs the cache coordinator as a process: connects both tiers, registers
//! the supported seasons, sweeps old session results on an interval and
//! serves health and metrics endpoints until interrupted.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            Pitwall                               │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │    Health    │───▶│ Coordinator  │───▶│  Retention   │       │
//! │  │    Server    │    │              │    │    Sweep     │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pitwall::server::{self, ServerState};
use pitwall::{Config, Coordinator, Result};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Pitwall - tiered cache for motorsport session timing data
///
/// Flags that shape [`Config`] are read as raw strings and parsed by
/// [`Config::from_lookup`], so unset flags fall back to its defaults.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Volatile cache (Redis) URL [default: redis://localhost:6379]
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Default TTL for cached entries in seconds [default: 3600]
    #[arg(long, env = "CACHE_TTL_SECONDS")]
    cache_ttl_seconds: Option<String>,

    /// Durable store path [default: pitwall.db]
    #[arg(long, env = "PITWALL_DB_PATH")]
    db_path: Option<String>,

    /// Cache key namespace [default: pitwall]
    #[arg(long, env = "PITWALL_NAMESPACE")]
    namespace: Option<String>,

    /// Deadline for each tier call in milliseconds [default: 2000]
    #[arg(long, env = "PITWALL_OP_TIMEOUT_MS")]
    op_timeout_ms: Option<String>,

    /// Current season [default: the current UTC year]
    #[arg(long, env = "PITWALL_CURRENT_SEASON")]
    current_season: Option<String>,

    /// First season registered at startup [default: 2021]
    #[arg(long, env = "PITWALL_FIRST_SEASON")]
    first_season: Option<String>,

    /// Session results older than this many days are swept [default: 30]
    #[arg(long, env = "PITWALL_RETENTION_DAYS")]
    retention_days: Option<String>,

    /// Interval between retention sweeps in seconds
    #[arg(long, env = "PITWALL_SWEEP_INTERVAL_SECS", default_value = "3600")]
    sweep_interval_secs: u64,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    /// Raw value for one configuration variable, flag or environment
    fn lookup(&self, name: &str) -> Option<String> {
        let value = match name {
            "REDIS_URL" => &self.redis_url,
            "CACHE_TTL_SECONDS" => &self.cache_ttl_seconds,
            "PITWALL_DB_PATH" => &self.db_path,
            "PITWALL_NAMESPACE" => &self.namespace,
            "PITWALL_OP_TIMEOUT_MS" => &self.op_timeout_ms,
            "PITWALL_CURRENT_SEASON" => &self.current_season,
            "PITWALL_FIRST_SEASON" => &self.first_season,
            "PITWALL_RETENTION_DAYS" => &self.retention_days,
            _ => return None,
        };
        value.clone()
    }

    fn config(&self) -> Result<Config> {
        Config::from_lookup(|name| self.lookup(name))
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    let config = args.config()?;
    info!("Starting Pitwall");
    info!("  Durable store: {}", config.db_path.display());
    info!("  Namespace: {}", config.namespace);
    info!("  Default TTL: {}s", config.default_ttl.as_secs());
    info!(
        "  Seasons: {}-{}",
        config.first_season, config.current_season
    );

    let coordinator = Arc::new(Coordinator::connect(config.clone()).await?);
    if !coordinator.volatile().is_connected() {
        warn!("Volatile cache unreachable; running on the in-process fallback");
    }

    // Seed supported seasons
    coordinator.register_seasons(&config.seasons()).await;

    // Start retention sweeps
    let sweeper = Arc::clone(&coordinator);
    let retention_days = config.retention_days;
    let sweep_interval = Duration::from_secs(args.sweep_interval_secs.max(1));
    let sweep_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            let purged = sweeper.purge_stale_sessions(retention_days).await;
            if purged > 0 {
                info!("Retention sweep removed {} session results", purged);
            }
        }
    });

    // Start health server
    let state = Arc::new(ServerState::new(Arc::clone(&coordinator))?);
    let listener = server::bind(&args.health_addr).await?;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server::serve(listener, state).await {
            error!("Health server error: {}", e);
        }
    });

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }

    sweep_handle.abort();
    server_handle.abort();
    coordinator.shutdown().await;

    info!("Pitwall shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = ["hyper=warn", "redis=warn"]
        .iter()
        .filter_map(|directive| directive.parse().ok())
        .fold(
            EnvFilter::from_default_env().add_directive(level.into()),
            EnvFilter::add_directive,
        );

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
