use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use minircd_core::{Config, Server};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "minircd")]
#[command(about = "A small event-driven IRC daemon", version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "minircd.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file and exit
    Config {
        /// Output path
        #[arg(short, long, default_value = "minircd.toml")]
        output: PathBuf,
    },
}

fn init_logging(level: &str) {
    let level = match level {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    if let Some(Commands::Config { output }) = cli.command {
        let config = Config::default();
        config.to_file(&output)?;
        info!("Wrote default configuration to {}", output.display());
        return Ok(());
    }

    let config = if cli.config.exists() {
        Config::from_file(&cli.config)?
    } else {
        warn!(
            "Configuration file {} not found, using defaults",
            cli.config.display()
        );
        Config::default()
    };

    info!("Starting minircd as {}", config.server.name);
    let server = Server::new(config);
    server.run().await?;
    Ok(())
}
