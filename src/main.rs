use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use catalog_scraper::cli::{Cli, Commands};
use catalog_scraper::commands;
use catalog_scraper::infrastructure::config::ScraperConfig;
use catalog_scraper::infrastructure::init_logging_with_config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ScraperConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(url) = &cli.database {
        config.database.url.clone_from(url);
    }
    if let Commands::Scrape(args) = &cli.command {
        args.apply_to(&mut config);
    }
    config.validate().context("Invalid configuration")?;

    // Keep the guard alive so buffered file logs are flushed on exit
    let _guard = init_logging_with_config(&config.logging)?;
    info!("🚀 catalog-scraper {}", env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Commands::Scrape(args) => commands::scrape(&config, args.retry_from.as_deref()).await,
        Commands::Apply(args) => commands::apply(&config, args).await,
        Commands::Progress => commands::progress(&config).await,
    }
}
