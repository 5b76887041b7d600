//! Passgate server
//!
//! Binary entry point for running the credential service.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use passgate::PassgateServer;
use passgate_common::config::AppConfig;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "passgate")]
#[command(about = "Passgate credential service", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "PASSGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty")]
    log_format: LogFormat,

    /// Optional .env file loaded before reading the environment
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match &args.env_file {
        Some(path) => {
            dotenv::from_path(path)?;
        }
        None => {
            dotenv::dotenv().ok();
        }
    }

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    match args.log_format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init(),
    }

    info!("Passgate v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::load(args.config.as_deref())?.with_env();
    if args.config.is_none() {
        info!("No config file given, using defaults and environment");
    }

    let server = PassgateServer::new(config)?;

    server.run().await?;
    info!("Passgate stopped");

    Ok(())
}
