//! tabfeed entry point.
//!
//! Article output goes to stdout; logging goes to stderr.

use anyhow::Result;
use clap::Parser;
use tabfeed_core::AppConfig;
use tracing_subscriber::EnvFilter;

mod args;
mod commands;

use args::{Cli, Commands};

/// Install the stderr subscriber. `--debug` wins over `RUST_LOG`, which wins
/// over the default `warn` level.
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("tabfeed=debug,tabfeed_core=debug,tabfeed_client=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let mut config = AppConfig::load()?;
    if let Some(path) = cli.cache {
        config.cache_path = path;
    }
    tracing::debug!("using cache at {}", config.cache_path.display());

    match cli.command {
        Commands::Read { urls, limit } => commands::read(&config, &urls, limit).await,
        Commands::Cache => commands::list_cache(&config).await,
        Commands::Colors => commands::colors(&config).await,
        Commands::ConvertColors { wal, output } => {
            commands::convert_colors(&config, wal.as_deref(), output.as_deref()).await
        }
    }
}
