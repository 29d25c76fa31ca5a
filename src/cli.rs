//! Command-line surface

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::infrastructure::config::ScraperConfig;

/// Fill missing catalog product descriptions and images from merchant pages
#[derive(Parser, Debug)]
#[command(name = "catalog-scraper")]
#[command(version)]
pub struct Cli {
    /// Configuration file (TOML or JSON)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Catalog database URL, e.g. sqlite://catalog.db
    #[arg(long, global = true, value_name = "URL", env = "DATABASE_URL")]
    pub database: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scrape descriptions for products that are missing one
    Scrape(ScrapeArgs),

    /// Update descriptions from a JSON file of scraped products
    Apply(ApplyArgs),

    /// Show description coverage and an estimate of the remaining work
    Progress,
}

#[derive(Args, Debug, Default, Clone)]
pub struct ScrapeArgs {
    /// Process at most N products
    #[arg(long, value_name = "N")]
    pub limit: Option<u32>,

    /// Skip products that already have a description
    #[arg(long, conflicts_with = "force")]
    pub skip_existing: bool,

    /// Also process products that already have a description
    #[arg(long)]
    pub force: bool,

    /// Base delay between requests in seconds
    #[arg(long, value_name = "SECS")]
    pub delay: Option<f64>,

    /// Random variation added to or removed from the delay, in seconds
    #[arg(long, value_name = "SECS")]
    pub delay_variance: Option<f64>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Verify TLS certificates (off by default)
    #[arg(long)]
    pub verify_ssl: bool,

    /// Roll back every change if any item fails
    #[arg(long)]
    pub rollback_on_error: bool,

    /// Commit after every N updated products (per-item mode)
    #[arg(long, value_name = "N")]
    pub commit_interval: Option<u32>,

    /// Fall back to a language model when structural extraction fails
    #[arg(long)]
    pub use_llm: bool,

    /// Language model used by the fallback
    #[arg(long, value_name = "NAME")]
    pub llm_model: Option<String>,

    /// Audit log file (JSON lines)
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Download a representative image for each product
    #[arg(long)]
    pub download_images: bool,

    /// Largest accepted image in bytes
    #[arg(long, value_name = "BYTES")]
    pub max_image_size: Option<u64>,

    /// Media root; images go to <media-dir>/products
    #[arg(long, value_name = "PATH")]
    pub media_dir: Option<PathBuf>,

    /// Reprocess only the items of a failure ledger
    #[arg(long, value_name = "PATH")]
    pub retry_from: Option<PathBuf>,

    /// Directory for failure ledgers
    #[arg(long, value_name = "PATH")]
    pub ledger_dir: Option<PathBuf>,

    /// Run extraction without writing to the catalog or the media directory
    #[arg(long)]
    pub dry_run: bool,
}

impl ScrapeArgs {
    /// Command-line values take precedence over file and environment settings
    pub fn apply_to(&self, config: &mut ScraperConfig) {
        let run = &mut config.run;
        if self.limit.is_some() {
            run.limit = self.limit;
        }
        run.skip_existing |= self.skip_existing;
        run.force |= self.force;
        run.rollback_on_error |= self.rollback_on_error;
        run.dry_run |= self.dry_run;
        if let Some(interval) = self.commit_interval {
            run.commit_interval = interval;
        }
        if let Some(dir) = &self.ledger_dir {
            run.ledger_dir.clone_from(dir);
        }
        if self.log_file.is_some() {
            run.audit_log.clone_from(&self.log_file);
        }

        let fetch = &mut config.fetch;
        if let Some(delay) = self.delay {
            fetch.request_delay_secs = delay;
        }
        if let Some(variance) = self.delay_variance {
            fetch.delay_variance_secs = variance;
        }
        if let Some(timeout) = self.timeout {
            fetch.timeout_secs = timeout;
        }
        fetch.verify_tls |= self.verify_ssl;

        config.llm.enabled |= self.use_llm;
        if let Some(model) = &self.llm_model {
            config.llm.model.clone_from(model);
        }

        let images = &mut config.images;
        images.download |= self.download_images;
        if let Some(max) = self.max_image_size {
            images.max_bytes = max;
        }
        if let Some(dir) = &self.media_dir {
            images.media_dir.clone_from(dir);
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ApplyArgs {
    /// JSON file with a top-level "products" array
    #[arg(value_name = "JSON_FILE")]
    pub json_file: PathBuf,

    /// Show what would change without writing
    #[arg(long)]
    pub dry_run: bool,

    /// Minimum name similarity (0-1) for fuzzy matching
    #[arg(long, value_name = "F")]
    pub similarity_threshold: Option<f64>,

    /// Ignore descriptions shorter than N characters
    #[arg(long, value_name = "N")]
    pub min_description_length: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn scrape_flags_override_config() {
        let cli = Cli::try_parse_from([
            "catalog-scraper",
            "--database",
            "sqlite://other.db",
            "scrape",
            "--limit",
            "20",
            "--delay",
            "0.5",
            "--use-llm",
            "--llm-model",
            "gpt-4o",
            "--rollback-on-error",
            "--download-images",
            "--max-image-size",
            "1000000",
            "--log-file",
            "audit.jsonl",
        ])
        .unwrap();
        assert_eq!(cli.database.as_deref(), Some("sqlite://other.db"));

        let Commands::Scrape(args) = cli.command else {
            panic!("expected scrape");
        };
        let mut config = ScraperConfig::default();
        args.apply_to(&mut config);

        assert_eq!(config.run.limit, Some(20));
        assert!((config.fetch.request_delay_secs - 0.5).abs() < f64::EPSILON);
        assert!(config.llm.enabled);
        assert_eq!(config.llm.model, "gpt-4o");
        assert!(config.run.rollback_on_error);
        assert!(config.images.download);
        assert_eq!(config.images.max_bytes, 1_000_000);
        assert_eq!(config.run.audit_log, Some(PathBuf::from("audit.jsonl")));
        assert!(!config.fetch.verify_tls);
    }

    #[test]
    fn force_conflicts_with_skip_existing() {
        let parsed = Cli::try_parse_from(["catalog-scraper", "scrape", "--force", "--skip-existing"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn apply_takes_a_file() {
        let cli = Cli::try_parse_from([
            "catalog-scraper",
            "apply",
            "scraped.json",
            "--dry-run",
            "--similarity-threshold",
            "0.9",
        ])
        .unwrap();
        let Commands::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert_eq!(args.json_file, PathBuf::from("scraped.json"));
        assert!(args.dry_run);
        assert_eq!(args.similarity_threshold, Some(0.9));
    }
}
