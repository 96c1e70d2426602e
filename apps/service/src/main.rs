use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::level_filters::LevelFilter;

use pulse_service::database::open_store;
use pulse_service::{Config, Engine};

#[derive(Parser)]
#[command(name = "pulse")]
#[command(about = "Network monitoring core: scheduled probes, alerting and notifications")]
#[command(version)]
struct Cli {
    /// Config file (defaults to $XDG_CONFIG_HOME/pulse/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database file, overriding `database.path` from the config
    #[arg(long)]
    database: Option<String>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::init_with_level(if cli.verbose { LevelFilter::DEBUG } else { LevelFilter::INFO });

    let mut config = Config::from_config(cli.config.as_ref()).context("load config")?;
    if let Some(database) = cli.database {
        config.database.path = database;
    }

    if cli.print_config {
        print!("{config}");
        return Ok(());
    }

    let store = open_store(&config.database.path, config.database.max_connections).await?;
    let engine = Engine::new(&config, Arc::new(store))?;

    let shutdown = CancellationToken::new();
    engine.start(&shutdown);

    tokio::signal::ctrl_c().await.context("listen for shutdown signal")?;
    info!("shutdown requested");
    shutdown.cancel();
    engine.stop().await;

    Ok(())
}
