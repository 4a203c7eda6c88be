//! # Atmos Gateway
//!
//! Receives Atmos sensor packets over a LoRa link, validates them and prints
//! a diagnostic grid for every accepted packet.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Load configuration (first argument, default `config/default.toml`)
//!    - Set up logging (console + optional daily log file)
//!    - Open and configure the LoRa modem; any failure here is fatal
//!
//! 2. **Main Loop**
//!    - Poll the staging slot every `poll_interval_ms`
//!    - Stop with an error if the modem's reader task exits
//!    - Parse, verify and render each staged frame
//!    - Log link and packet counters every `stats_interval_ms`
//!
//! 3. **Graceful Shutdown**
//!    - Ctrl+C stops the loop and logs final counters
//!
//! # Examples
//!
//! ```bash
//! RUST_LOG=atmos_gateway=debug cargo run --release -- config/default.toml
//! ```

use std::io;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use atmos_gateway::config::{Config, LoggingConfig};
use atmos_gateway::gateway::{self, Gateway};
use atmos_gateway::handoff;
use atmos_gateway::radio::rylr998::Rylr998;
use atmos_gateway::radio::RadioSettings;

/// Configuration file used when no path is given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Log file name prefix inside `logging.log_dir`
const LOG_FILE_NAME: &str = "atmos-gateway.log";

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load configuration from {}", config_path))?;

    // Keep the guard alive so buffered log lines are flushed on exit
    let _log_guard = init_logging(&config.logging)?;

    info!("Atmos Gateway v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from {}", config_path);

    let mut radio = Rylr998::open(&config.serial)?;
    let settings = RadioSettings::from(&config.radio);
    let (ctx, frames) = handoff::channel();

    gateway::start(&mut radio, &settings, ctx)
        .await
        .context("radio initialization failed")?;

    info!(
        "Checksum scheme: {:?}, rendering up to {} row(s) per packet",
        config.gateway.checksum, config.gateway.render_rows
    );
    info!("Press Ctrl+C to exit");

    let mut gateway = Gateway::new(frames, &config.gateway, io::stdout());
    gateway
        .run(
            Duration::from_millis(config.gateway.poll_interval_ms),
            Duration::from_millis(config.gateway.stats_interval_ms),
            shutdown_signal(),
        )
        .await?;

    Ok(())
}

/// Console logging on stderr (stdout carries the grids), plus a daily log
/// file when `log_dir` is set
fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let console_layer = fmt::layer().with_writer(io::stderr);

    let (file_layer, guard) = if config.log_dir.is_empty() {
        (None, None)
    } else {
        let log_dir = Path::new(&config.log_dir);
        std::fs::create_dir_all(log_dir)
            .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;

        let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME);
        let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
        let layer = fmt::layer().with_writer(file_writer).with_ansi(false);
        (Some(layer), Some(guard))
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C");
}
