//! # huddle
//!
//! Planning poker server binary. Loads configuration, installs telemetry and
//! serves the session sync protocol until interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use huddle_server::ServerConfig;
use huddle_telemetry::{parse_module_level, LogFormat, TelemetryConfig};
use tracing::Level;

/// Planning poker session server.
#[derive(Parser, Debug)]
#[command(name = "huddle", about = "Planning poker session server")]
struct Cli {
    /// JSON config file. CLI flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Default log level. RUST_LOG takes precedence when set.
    #[arg(long, default_value = "info")]
    log_level: Level,

    /// Log output format: json or pretty.
    #[arg(long, default_value = "json")]
    log_format: LogFormat,

    /// Per-module level override, e.g. `huddle_server=debug`. Repeatable.
    #[arg(long = "module-level", value_parser = parse_module_level)]
    module_levels: Vec<(String, Level)>,
}

impl Cli {
    fn server_config(&self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)
                .with_context(|| format!("Failed to load config: {}", path.display()))?,
            None => ServerConfig::default(),
        };
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let telemetry = huddle_telemetry::init_telemetry(TelemetryConfig {
        log_level: cli.log_level,
        module_levels: cli.module_levels.clone(),
        format: cli.log_format,
    })
    .context("Failed to initialize telemetry")?;

    let config = cli.server_config()?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        config = %serde_json::to_string(&config).unwrap_or_default(),
        "starting huddle"
    );

    let handle = huddle_server::start(config, telemetry.metrics())
        .await
        .context("Failed to start server")?;
    tracing::info!(addr = %handle.addr, "huddle ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c")?;

    tracing::info!("shutting down");
    handle.shutdown().await;
    Ok(())
}
