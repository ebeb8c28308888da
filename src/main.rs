//! Agent arena betting engine entry point.

use std::net::SocketAddr;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use arena_betting::api::{create_router, AppState};
use arena_betting::config::Config;
use arena_betting::metrics;
use arena_betting::scheduler::{Scheduler, SweepIntervals};
use arena_betting::utils::{format_millis, now_millis, shutdown_signal};
use arena_betting::{ArenaError, Engine};

/// Agent arena betting engine.
#[derive(Parser, Debug)]
#[command(name = "arena-betting")]
#[command(about = "Pooled-stake betting and settlement for AI agent sandboxes")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true, env = "VERBOSE")]
    verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API and background sweeps (default).
    Serve {
        /// HTTP server port (overrides PORT).
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Check configuration validity.
    CheckConfig,

    /// Run the timeout and bet-window sweeps once and exit.
    Sweep,

    /// Print the current odds of one market.
    Odds {
        /// Sandbox or challenge id.
        entity_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    let filter = if args.verbose {
        EnvFilter::new("arena_betting=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if args.log_json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }

    // Handle subcommands
    match args.command {
        Some(Command::Serve { port }) => cmd_serve(port).await,
        Some(Command::CheckConfig) => cmd_check_config(),
        Some(Command::Sweep) => cmd_sweep(),
        Some(Command::Odds { entity_id }) => cmd_odds(&entity_id),
        None => cmd_serve(None).await,
    }
}

fn load_config() -> arena_betting::Result<Config> {
    let config = Config::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        ArenaError::from(e)
    })?;

    config.validate().map_err(|e| {
        error!("Invalid configuration: {}", e);
        ArenaError::InvalidConfig(e)
    })?;

    Ok(config)
}

fn cmd_check_config() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("ARENA BETTING - CONFIGURATION CHECK");
    println!("======================================================================");

    print!("Loading configuration... ");
    let config = match Config::load() {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration load failed"));
        }
    };

    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    print!("Opening database... ");
    match Engine::from_config(&config) {
        Ok(_) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Database open failed"));
        }
    }

    println!();
    println!("Database:           {}", config.database_path);
    println!("Port:               {}", config.port);
    println!("Starting balance:   {}", config.starting_balance);
    println!("Auto-settle every:  {}s", config.auto_settle_interval_seconds);
    println!("Window sweep every: {}s", config.window_sweep_interval_seconds);
    println!("Odds snapshot:      {}s", config.odds_snapshot_interval_seconds);
    println!("======================================================================");
    Ok(())
}

fn cmd_sweep() -> anyhow::Result<()> {
    let config = load_config()?;
    let engine = Engine::from_config(&config)?;
    info!("Running sweeps at {}", format_millis(now_millis()));

    let expired = engine.auto_settle_expired()?;
    let closed = engine.close_due_markets()?;

    println!("{}", serde_json::to_string_pretty(&expired)?);
    println!("{}", serde_json::to_string_pretty(&closed)?);

    if !expired.failures.is_empty() || !closed.failures.is_empty() {
        warn!(
            failures = expired.failures.len() + closed.failures.len(),
            "Sweep finished with failures"
        );
    }
    Ok(())
}

fn cmd_odds(entity_id: &str) -> anyhow::Result<()> {
    let config = load_config()?;
    let engine = Engine::from_config(&config)?;

    let odds = engine.get_odds(entity_id)?;
    println!("{}", serde_json::to_string_pretty(&odds)?);
    Ok(())
}

async fn cmd_serve(port_override: Option<u16>) -> anyhow::Result<()> {
    // Load configuration
    info!("Loading configuration...");
    let mut config = load_config()?;

    // Override with CLI args if provided
    if let Some(port) = port_override {
        config.port = port;
    }

    info!("Configuration loaded successfully");
    info!("Database: {}", config.database_path);
    info!("Starting balance: {}", config.starting_balance);

    // Initialize metrics
    let prometheus = metrics::install_prometheus_recorder()?;
    let upkeep = prometheus.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(10));
        loop {
            ticker.tick().await;
            upkeep.run_upkeep();
        }
    });

    let engine = Engine::from_config(&config)?;

    // Create app state
    let app_state = AppState::new(engine.clone()).with_metrics(prometheus);

    // Start background sweeps
    let scheduler = Scheduler::start(engine, SweepIntervals::from(&config));
    app_state.set_ready(true);

    // Start HTTP server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    let router = create_router(app_state.clone());
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    app_state.set_ready(false);
    scheduler.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}
