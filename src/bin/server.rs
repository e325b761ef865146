//! Lorekeeper server - the campaign knowledge service
//!
//! Usage:
//!   lorekeeper-server [OPTIONS]
//!
//! Options:
//!   --config <PATH>      Path to configuration file (default: config.toml)
//!   --host <HOST>        API server host (overrides config)
//!   --port <PORT>        API server port (overrides config)

use lorekeeper::api::{serve, AppState};
use lorekeeper::config::AppConfig;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug)]
struct ServerArgs {
    config_path: PathBuf,
    host: Option<String>,
    port: Option<u16>,
}

impl Default for ServerArgs {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config.toml"),
            host: None,
            port: None,
        }
    }
}

fn parse_args() -> ServerArgs {
    let mut parsed = ServerArgs::default();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                if let Some(path) = args.next() {
                    parsed.config_path = PathBuf::from(path);
                }
            }
            "--host" => {
                parsed.host = args.next();
            }
            "--port" => {
                parsed.port = args.next().and_then(|p| p.parse().ok());
            }
            "--help" | "-h" => {
                println!("Usage: lorekeeper-server [--config <PATH>] [--host <HOST>] [--port <PORT>]");
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                std::process::exit(1);
            }
        }
    }

    parsed
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = parse_args();

    let mut config = if args.config_path.exists() {
        info!("Loading configuration from {}", args.config_path.display());
        AppConfig::from_file(&args.config_path)?
    } else {
        warn!(
            "No configuration file at {}, using defaults",
            args.config_path.display()
        );
        AppConfig::default()
    };

    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    config.validate()?;

    info!(
        "Starting lorekeeper {} with {} provider",
        lorekeeper::VERSION,
        config.llm.provider
    );

    let host = config.server.host.clone();
    let port = config.server.port;
    let state = AppState::new(config).await?;

    serve(state, &host, port).await?;
    Ok(())
}
