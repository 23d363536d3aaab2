use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tollgate::config::{LoggingConfig, TollgateConfig};
use tollgate::http::HttpServer;
use tollgate::ratelimit::{RateLimiter, Sweeper};

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "tollgate", version, about = "In-memory request rate limiter")]
struct Args {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short, long)]
    config: Option<String>,

    /// HTTP listen address, overriding the configuration file
    #[arg(long)]
    http_addr: Option<SocketAddr>,

    /// Log filter directive, overriding the configuration file
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON formatted logs
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match args.config.as_deref() {
        Some(path) => TollgateConfig::from_file(path)?,
        None => TollgateConfig::default(),
    };
    if let Some(addr) = args.http_addr {
        config.server.http_addr = addr;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if args.log_json {
        config.logging.json = true;
    }

    init_tracing(&config.logging);

    info!("Starting Tollgate Rate Limiting Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(http_addr = %config.server.http_addr, "Configuration loaded");

    let rules = config.rate_limiting.route_rules()?;
    info!(
        default_quota = %rules.default,
        routes = rules.routes.len(),
        "Route rules loaded"
    );

    // Initialize the rate limiter
    let rate_limiter = Arc::new(RateLimiter::from_config(&config.rate_limiting)?);
    info!(
        idle_eviction_secs = config.rate_limiting.idle_eviction_secs,
        "Rate limiter initialized"
    );

    let sweeper = Sweeper::start(
        Arc::clone(&rate_limiter),
        Duration::from_secs(config.rate_limiting.sweep_interval_secs),
    )?;

    let http_server = HttpServer::new(config.server.http_addr, rate_limiter, rules)
        .trust_forwarded_for(config.server.trust_forwarded_for);

    // Run the server with graceful shutdown on Ctrl+C
    http_server.serve_with_shutdown(shutdown_signal()).await?;

    sweeper.shutdown().await;

    info!("Tollgate Rate Limiting Service stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
