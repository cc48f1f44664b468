//! IIFE transform service.
//!
//! ```text
//!   GET /?src=<code>
//!        │
//!        ▼
//!   ┌──────────┐    ┌─────────────┐    ┌───────────────┐
//!   │  axum    │───▶│  handler    │───▶│ swc parse     │
//!   │  server  │    │  (src, 400) │    │ lower → IIFE  │
//!   └──────────┘    └─────────────┘    │ swc print     │
//!        ▲                 │           └───────┬───────┘
//!        │                 ▼                   │
//!        └──── 200 application/javascript ◀────┘
//! ```
//!
//! Local development entry point: listens on 0.0.0.0:3001 unless a config
//! file or `--bind` says otherwise.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use transform_service::config::{load_config, validate_config, ConfigError, ServiceConfig};
use transform_service::lifecycle::{spawn_signal_listener, Shutdown};
use transform_service::observability::{logging, metrics};
use transform_service::HttpServer;

#[derive(Parser)]
#[command(name = "transform-service")]
#[command(about = "Serve JavaScript transformed into an IIFE bundle", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address.
    #[arg(short, long)]
    bind: Option<String>,
}

fn load(cli: &Cli) -> Result<ServiceConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServiceConfig::default(),
    };
    if let Some(bind) = &cli.bind {
        config.listener.bind_address = bind.clone();
        validate_config(&config).map_err(ConfigError::Validation)?;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load(&cli)?;

    logging::init_logging(&config.observability.log_level);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config_file = ?cli.config,
        "transform-service starting"
    );

    tracing::info!(
        bind_address = %config.listener.bind_address,
        format = %config.transform.format,
        global_name = %config.transform.global_name,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        // Address validated by load().
        if let Ok(addr) = config.observability.metrics_address.parse() {
            if let Err(e) = metrics::init_metrics(addr) {
                tracing::error!(error = %e, "Failed to start metrics endpoint");
            }
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Arc::new(Shutdown::new());
    spawn_signal_listener(Arc::clone(&shutdown));

    let server = HttpServer::new(config)?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
