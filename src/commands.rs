//! Command handlers wiring configuration, infrastructure and application layers

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::application::{
    BatchOrchestrator, DescriptionExtractor, ImportOptions, LlmFallback, RunOptions,
    TransactionMode, WorkSource, catalog_progress, import_descriptions, load_import_file,
    render_summary,
};
use crate::cli::ApplyArgs;
use crate::domain::repositories::CatalogStore;
use crate::domain::services::PageFetcher;
use crate::infrastructure::config::ScraperConfig;
use crate::infrastructure::failure_ledger::load_retry_items;
use crate::infrastructure::{
    AuditLogger, DatabaseConnection, HttpClient, HttpClientConfig, ImageDownloader, OpenAiClient,
    SqliteCatalogStore,
};

pub async fn open_catalog(config: &ScraperConfig) -> Result<SqliteCatalogStore> {
    let db = DatabaseConnection::with_max_connections(
        &config.database.url,
        config.database.max_connections,
    )
    .await
    .with_context(|| format!("Failed to open catalog database {}", config.database.url))?;
    db.migrate().await.context("Failed to prepare catalog schema")?;

    Ok(SqliteCatalogStore::new(
        db.pool().clone(),
        config.extraction.min_description_length,
    ))
}

fn build_extractor(config: &ScraperConfig) -> Result<DescriptionExtractor> {
    let extractor = DescriptionExtractor::new(&config.extraction, config.images.max_candidates);

    let Some(api_key) = config.llm_api_key()? else {
        return Ok(extractor);
    };
    let client = OpenAiClient::from_config(&config.llm, api_key)
        .context("Failed to create language model client")?;
    info!("🤖 Language model fallback enabled ({})", config.llm.model);

    let normalizer = *extractor.normalizer();
    Ok(extractor.with_llm(LlmFallback::new(
        Arc::new(client),
        normalizer,
        config.llm.temperature,
        config.llm.max_tokens,
    )))
}

/// `retry_from` replaces catalog selection with the items of a failure ledger
pub async fn scrape(config: &ScraperConfig, retry_from: Option<&Path>) -> Result<()> {
    if !config.fetch.verify_tls {
        warn!("⚠️ TLS certificate verification is disabled; pass --verify-ssl to enable it");
        eprintln!("WARNING: TLS certificate verification is disabled (use --verify-ssl to enable)");
    }

    let catalog: Arc<dyn CatalogStore> = Arc::new(open_catalog(config).await?);
    let fetcher: Arc<dyn PageFetcher> = Arc::new(
        HttpClient::with_config(HttpClientConfig::from_fetch_config(&config.fetch))
            .context("Failed to create HTTP client")?,
    );
    let extractor = build_extractor(config)?;

    let run = &config.run;
    let mode = if run.rollback_on_error {
        TransactionMode::AllOrNothing
    } else {
        TransactionMode::PerItem {
            commit_interval: run.commit_interval.max(1),
        }
    };

    let audit_path = run
        .audit_log
        .clone()
        .unwrap_or_else(|| AuditLogger::default_path(&config.logging.log_dir));
    let audit = AuditLogger::open(&audit_path).context("Failed to open audit log")?;
    info!("📝 Audit log: {}", audit_path.display());

    let mut orchestrator = BatchOrchestrator::new(
        catalog,
        Arc::clone(&fetcher),
        extractor,
        RunOptions {
            mode,
            skip_existing: run.skip_existing,
            dry_run: run.dry_run,
            ledger_dir: run.ledger_dir.clone(),
        },
    )
    .with_audit(audit);
    if config.images.download {
        orchestrator = orchestrator.with_images(ImageDownloader::from_config(fetcher, &config.images));
    }

    let source = match retry_from {
        Some(path) => WorkSource::Ledger(
            load_retry_items(path)
                .await
                .with_context(|| format!("Failed to load failure ledger {}", path.display()))?,
        ),
        None => WorkSource::Catalog {
            limit: run.limit,
            include_described: run.force,
        },
    };

    let stop = orchestrator.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current item");
            stop.store(true, Ordering::SeqCst);
        }
    });

    let report = orchestrator.run(source).await.context("Scraping run failed")?;
    println!("{}", render_summary(&report));
    Ok(())
}

pub async fn apply(config: &ScraperConfig, args: &ApplyArgs) -> Result<()> {
    let catalog = open_catalog(config).await?;
    let products = load_import_file(&args.json_file).await?;
    info!("Loaded {} products from {}", products.len(), args.json_file.display());

    let options = ImportOptions {
        dry_run: args.dry_run,
        similarity_threshold: args
            .similarity_threshold
            .unwrap_or(config.run.name_similarity_threshold),
        min_description_length: args
            .min_description_length
            .unwrap_or(config.extraction.min_description_length),
    };
    let stats = import_descriptions(&catalog, &products, options).await?;

    println!("{}", "=".repeat(60));
    println!(
        "{}",
        if options.dry_run {
            "DRY RUN COMPLETE - no changes were made"
        } else {
            "UPDATE COMPLETE"
        }
    );
    println!("{}", "=".repeat(60));
    println!("  Products in file:              {}", stats.products_in_file);
    println!("  Matched products:              {}", stats.matched);
    println!("  Updated:                       {}", stats.updated);
    println!("  Descriptions replaced:         {}", stats.replaced);
    println!("  Unchanged:                     {}", stats.unchanged);
    println!("  Skipped (no description):      {}", stats.skipped_no_description);
    println!("  Skipped (too short):           {}", stats.skipped_too_short);
    println!("  Not found in catalog:          {}", stats.not_found);
    Ok(())
}

pub async fn progress(config: &ScraperConfig) -> Result<()> {
    let catalog = open_catalog(config).await?;
    let report = catalog_progress(&catalog, config.fetch.request_delay_secs).await?;
    println!("{}", report.render());
    Ok(())
}
