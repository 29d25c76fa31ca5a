//! Sequential batch runner: selection, extraction, buffered writes, failure ledger
//!
//! Work items are processed strictly one at a time. Catalog writes go through a
//! buffer whose flush points depend on the transaction mode; only network and
//! persistence errors are failures, everything else is a skip.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::application::extraction_pipeline::{DescriptionExtractor, PageExtraction};
use crate::domain::entities::{CatalogProduct, WorkItem};
use crate::domain::errors::{CatalogError, ItemError};
use crate::domain::extraction::ExtractionOutcome;
use crate::domain::failure::{FailureRecord, RunStats};
use crate::domain::repositories::{CatalogStore, CatalogWrite};
use crate::domain::services::{FetchedPage, PageFetcher};
use crate::infrastructure::audit_log::{AuditEvent, AuditLogger};
use crate::infrastructure::failure_ledger::{FailureLedger, LedgerError};
use crate::infrastructure::image_downloader::{ImageDownloader, StoredImage};

#[derive(Error, Debug)]
pub enum RunError {
    #[error("Could not select work items: {0}")]
    Selection(#[from] CatalogError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Where a run takes its work items from
#[derive(Debug, Clone)]
pub enum WorkSource {
    /// Products missing a description (or every product with `include_described`)
    Catalog {
        limit: Option<u32>,
        include_described: bool,
    },
    /// Items replayed from an earlier failure ledger
    Ledger(Vec<WorkItem>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// Commit after every `commit_interval` items that produced writes
    PerItem { commit_interval: u32 },
    /// Commit once at the end; the first failure rolls everything back
    AllOrNothing,
}

impl TransactionMode {
    pub const fn label(self) -> &'static str {
        match self {
            Self::PerItem { .. } => "per_item",
            Self::AllOrNothing => "all_or_nothing",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub mode: TransactionMode,
    /// Skip products whose stored description already meets the threshold
    pub skip_existing: bool,
    /// No catalog writes and no image persistence
    pub dry_run: bool,
    pub ledger_dir: PathBuf,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            mode: TransactionMode::PerItem { commit_interval: 1 },
            skip_existing: false,
            dry_run: false,
            ledger_dir: PathBuf::from("ledgers"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub stats: RunStats,
    pub mode: TransactionMode,
    pub dry_run: bool,
    pub rolled_back: bool,
    pub interrupted: bool,
    pub failures: Vec<FailureRecord>,
    pub ledger_path: Option<PathBuf>,
    pub audit_path: Option<PathBuf>,
    pub duration: Duration,
}

/// Writes and stored files of one item, waiting for the next commit
#[derive(Debug)]
struct PendingItem {
    item: WorkItem,
    writes: Vec<CatalogWrite>,
    images: Vec<StoredImage>,
}

impl PendingItem {
    fn described(&self) -> bool {
        self.writes
            .iter()
            .any(|w| matches!(w, CatalogWrite::SetDescription { .. }))
    }
}

enum Candidate {
    Product(CatalogProduct),
    Retry(WorkItem),
}

/// Mutable state of one run, owned by the loop
struct RunState {
    stats: RunStats,
    ledger: FailureLedger,
    buffer: Vec<PendingItem>,
    rolled_back: bool,
}

pub struct BatchOrchestrator {
    catalog: Arc<dyn CatalogStore>,
    fetcher: Arc<dyn PageFetcher>,
    extractor: DescriptionExtractor,
    images: Option<ImageDownloader>,
    audit: AuditLogger,
    options: RunOptions,
    stop: Arc<AtomicBool>,
}

impl BatchOrchestrator {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        fetcher: Arc<dyn PageFetcher>,
        extractor: DescriptionExtractor,
        options: RunOptions,
    ) -> Self {
        Self {
            catalog,
            fetcher,
            extractor,
            images: None,
            audit: AuditLogger::disabled(),
            options,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn with_images(mut self, downloader: ImageDownloader) -> Self {
        self.images = Some(downloader);
        self
    }

    #[must_use]
    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = audit;
        self
    }

    /// Flag checked between items; setting it ends the run early
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub async fn run(&self, source: WorkSource) -> Result<RunReport, RunError> {
        let started = Instant::now();
        let (source_label, candidates) = match source {
            WorkSource::Catalog {
                limit,
                include_described,
            } => {
                let products = self
                    .catalog
                    .products_needing_description(limit, include_described)
                    .await?;
                let candidates: Vec<Candidate> =
                    products.into_iter().map(Candidate::Product).collect();
                ("catalog", candidates)
            }
            WorkSource::Ledger(items) => ("ledger", items.into_iter().map(Candidate::Retry).collect()),
        };

        info!(
            "🚀 Processing {} items from {} ({} mode{})",
            candidates.len(),
            source_label,
            self.options.mode.label(),
            if self.options.dry_run { ", dry run" } else { "" }
        );
        self.audit.emit(
            None,
            &AuditEvent::RunStarted {
                source: source_label.to_string(),
                items: candidates.len(),
                transaction_mode: self.options.mode.label().to_string(),
                use_llm: self.extractor.llm_enabled(),
                download_images: self.images.is_some(),
                dry_run: self.options.dry_run,
            },
        );

        let mut state = RunState {
            stats: RunStats::default(),
            ledger: FailureLedger::new(),
            buffer: Vec::new(),
            rolled_back: false,
        };
        let mut seen = HashSet::new();
        let mut interrupted = false;
        let total = candidates.len();

        for (position, candidate) in candidates.into_iter().enumerate() {
            if self.stop.load(Ordering::SeqCst) {
                warn!("Run interrupted after {} of {} items", position, total);
                interrupted = true;
                break;
            }

            let product_id = match &candidate {
                Candidate::Product(p) => p.id,
                Candidate::Retry(item) => item.product_id,
            };
            if !seen.insert(product_id) {
                continue;
            }

            state.stats.processed += 1;
            info!("[{}/{}] product {}", position + 1, total, product_id);

            let item = match self.resolve(candidate).await {
                Ok(Some(item)) => item,
                Ok(None) => {
                    state.stats.skipped += 1;
                    continue;
                }
                Err((item, error)) => {
                    if self.fail(&mut state, &item, &error).await {
                        break;
                    }
                    continue;
                }
            };

            match self.process(&item, &mut state.stats).await {
                Ok(pending) => {
                    if !pending.writes.is_empty() || !pending.images.is_empty() {
                        state.buffer.push(pending);
                    }
                    if let TransactionMode::PerItem { commit_interval } = self.options.mode {
                        if state.buffer.len() >= commit_interval.max(1) as usize {
                            self.flush(&mut state).await;
                        }
                    }
                }
                Err(error) => {
                    if self.fail(&mut state, &item, &error).await {
                        break;
                    }
                }
            }
        }

        if interrupted && self.options.mode == TransactionMode::AllOrNothing {
            self.rollback(&mut state, "interrupted").await;
        } else if !state.rolled_back {
            self.flush(&mut state).await;
        }

        let ledger_path = state.ledger.persist(&self.options.ledger_dir).await?;
        let duration = started.elapsed();

        self.audit.emit(
            None,
            &AuditEvent::RunFinished {
                stats: state.stats,
                rolled_back: state.rolled_back,
                ledger_path: ledger_path.as_ref().map(|p| p.display().to_string()),
                duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            },
        );
        self.audit.flush();

        Ok(RunReport {
            stats: state.stats,
            mode: self.options.mode,
            dry_run: self.options.dry_run,
            rolled_back: state.rolled_back,
            interrupted,
            failures: state.ledger.records().to_vec(),
            ledger_path,
            audit_path: self.audit.path().map(PathBuf::from),
            duration,
        })
    }

    /// Turn a candidate into a work item, or `None` when it is skipped
    async fn resolve(
        &self,
        candidate: Candidate,
    ) -> Result<Option<WorkItem>, (WorkItem, ItemError)> {
        let min_length = self.extractor.normalizer().min_length();

        match candidate {
            Candidate::Product(product) => {
                if self.options.skip_existing && product.has_description(min_length) {
                    info!("⏭️ {} already has a description", product.name);
                    return Ok(None);
                }

                let offers = match self.catalog.offers_for_product(product.id).await {
                    Ok(offers) => offers,
                    Err(e) => {
                        let item = WorkItem {
                            product_id: product.id,
                            product_name: product.name.clone(),
                            slug: product.slug.clone(),
                            source_url: String::new(),
                            merchant: String::new(),
                            retry_count: 0,
                        };
                        return Err((item, e.into()));
                    }
                };

                let item = WorkItem::from_product(&product, &offers);
                if item.is_none() {
                    info!("⏭️ {} has no external link", product.name);
                }
                Ok(item)
            }
            Candidate::Retry(item) => {
                let unresolved = item.source_url.trim().is_empty();
                if !self.options.skip_existing && !unresolved {
                    return Ok(Some(item));
                }

                let product = match self.catalog.product_by_id(item.product_id).await {
                    Ok(product) => product,
                    Err(e) => return Err((item, e.into())),
                };
                if let Some(product) = &product {
                    if self.options.skip_existing && product.has_description(min_length) {
                        info!("⏭️ {} was described since the last run", product.name);
                        return Ok(None);
                    }
                }
                if !unresolved {
                    return Ok(Some(item));
                }

                // The offer lookup failed last time, so the link is resolved now
                let Some(product) = product else {
                    info!("⏭️ product {} no longer exists", item.product_id);
                    return Ok(None);
                };
                let offers = match self.catalog.offers_for_product(product.id).await {
                    Ok(offers) => offers,
                    Err(e) => return Err((item, e.into())),
                };
                let resolved = WorkItem::from_product(&product, &offers).map(|resolved| WorkItem {
                    retry_count: item.retry_count,
                    ..resolved
                });
                if resolved.is_none() {
                    info!("⏭️ {} has no external link", product.name);
                }
                Ok(resolved)
            }
        }
    }

    /// Fetch, extract and stage writes for one item
    async fn process(&self, item: &WorkItem, stats: &mut RunStats) -> Result<PendingItem, ItemError> {
        let page = self.fetch(item).await?;
        let context = self.extractor.context(&item.product_name, &item.source_url);
        let PageExtraction {
            result,
            image_candidates,
        } = self
            .extractor
            .extract(&page, &context, self.images.is_some())
            .await;

        let id = Some(item.product_id);
        self.audit.emit(
            id,
            &AuditEvent::Classification {
                url: result.final_url.clone(),
                classification: result.classification,
            },
        );
        for attempt in &result.attempts {
            self.audit.emit(
                id,
                &AuditEvent::StrategyAttempt {
                    strategy: attempt.strategy.clone(),
                    candidate_length: attempt.candidate_length,
                    accepted: attempt.accepted,
                },
            );
        }
        if let Some(call) = &result.llm_call {
            stats.llm_calls += 1;
            self.audit.emit(
                id,
                &AuditEvent::LlmCall {
                    model: call.model.clone(),
                    usage: call.usage,
                    error: call.error.clone(),
                },
            );
        }

        let mut pending = PendingItem {
            item: item.clone(),
            writes: Vec::new(),
            images: Vec::new(),
        };

        match &result.outcome {
            ExtractionOutcome::Found { text, strategy } => {
                let length = text.chars().count();
                info!("✅ {} via {} ({} chars)", item.product_name, strategy, length);
                self.audit.emit(
                    id,
                    &AuditEvent::StrategySucceeded {
                        strategy: strategy.clone(),
                        length,
                    },
                );
                self.audit.emit(
                    id,
                    &AuditEvent::Validation {
                        accepted: true,
                        length,
                        reason: None,
                    },
                );
                pending.writes.push(CatalogWrite::SetDescription {
                    product_id: item.product_id,
                    text: text.clone(),
                });
            }
            outcome => {
                let reason = match outcome {
                    ExtractionOutcome::Error(message) => format!("extraction error: {message}"),
                    _ if result.classification.is_listing() => "listing page".to_string(),
                    _ => "no description found".to_string(),
                };
                info!("⏭️ {}: {}", item.product_name, reason);
                self.audit.emit(
                    id,
                    &AuditEvent::Validation {
                        accepted: false,
                        length: 0,
                        reason: Some(reason),
                    },
                );
                stats.skipped += 1;
            }
        }

        if let Some(downloader) = &self.images {
            self.download_image(downloader, item, &page, &image_candidates, &mut pending, stats)
                .await;
        }

        Ok(pending)
    }

    async fn fetch(&self, item: &WorkItem) -> Result<FetchedPage, ItemError> {
        let started = Instant::now();
        let result = self.fetcher.fetch_page(&item.source_url).await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let event = match &result {
            Ok(page) => AuditEvent::Fetch {
                url: item.source_url.clone(),
                status: Some(page.status),
                final_url: Some(page.final_url.clone()),
                duration_ms,
                error: None,
            },
            Err(e) => AuditEvent::Fetch {
                url: item.source_url.clone(),
                status: e.status(),
                final_url: None,
                duration_ms,
                error: Some(e.to_string()),
            },
        };
        self.audit.emit(Some(item.product_id), &event);

        result.map_err(ItemError::from)
    }

    /// Image outcome is recorded separately and never fails the item
    async fn download_image(
        &self,
        downloader: &ImageDownloader,
        item: &WorkItem,
        page: &FetchedPage,
        candidates: &[String],
        pending: &mut PendingItem,
        stats: &mut RunStats,
    ) {
        let id = Some(item.product_id);

        if self.options.dry_run {
            self.audit.emit(
                id,
                &AuditEvent::Image {
                    status: "dry_run".into(),
                    url: candidates.first().cloned(),
                    path: None,
                    error: None,
                },
            );
            return;
        }

        let download = downloader
            .download_first(candidates, &page.final_url, &item.slug)
            .await;
        match download.stored {
            Ok(stored) => {
                self.audit.emit(
                    id,
                    &AuditEvent::Image {
                        status: "stored".into(),
                        url: Some(stored.source_url.clone()),
                        path: Some(stored.catalog_path.clone()),
                        error: None,
                    },
                );
                pending.writes.push(CatalogWrite::SetImage {
                    product_id: item.product_id,
                    path: stored.catalog_path.clone(),
                });
                pending.images.push(stored);
            }
            Err(e) => {
                stats.images_failed += 1;
                self.audit.emit(
                    id,
                    &AuditEvent::Image {
                        status: "failed".into(),
                        url: download.attempts.last().map(|a| a.url.clone()),
                        path: None,
                        error: Some(e.to_string()),
                    },
                );
            }
        }
    }

    /// Record a failure. Returns true when the run must stop.
    async fn fail(&self, state: &mut RunState, item: &WorkItem, error: &ItemError) -> bool {
        error!("❌ {} ({}): {}", item.product_name, item.source_url, error);
        self.record_failure(state, FailureRecord::from_error(item, error));

        if self.options.mode == TransactionMode::AllOrNothing {
            self.rollback(state, &error.to_string()).await;
            return true;
        }
        false
    }

    fn record_failure(&self, state: &mut RunState, record: FailureRecord) {
        state.stats.errors += 1;
        self.audit.emit(
            Some(record.product_id),
            &AuditEvent::Failure {
                error_kind: record.error_kind,
                message: record.error_message.clone(),
                retry_count: record.retry_count,
            },
        );
        state.ledger.record(record);
    }

    /// Apply every buffered write in one transaction
    async fn flush(&self, state: &mut RunState) {
        if state.buffer.is_empty() {
            return;
        }

        let pending = std::mem::take(&mut state.buffer);
        let writes: Vec<CatalogWrite> = pending.iter().flat_map(|p| p.writes.clone()).collect();

        let result = if self.options.dry_run {
            Ok(())
        } else {
            self.catalog.apply(&writes).await
        };

        match result {
            Ok(()) => {
                self.audit.emit(
                    None,
                    &AuditEvent::Persistence {
                        action: if self.options.dry_run { "dry_run" } else { "commit" }.into(),
                        writes: writes.len(),
                        error: None,
                    },
                );
                for p in &pending {
                    if p.described() {
                        state.stats.updated += 1;
                    }
                    state.stats.images_downloaded += u32::try_from(p.images.len()).unwrap_or(u32::MAX);
                }
            }
            Err(e) => {
                let message = e.to_string();
                error!("❌ Commit of {} writes failed: {}", writes.len(), message);
                self.audit.emit(
                    None,
                    &AuditEvent::Persistence {
                        action: "commit".into(),
                        writes: writes.len(),
                        error: Some(message.clone()),
                    },
                );
                for p in pending {
                    self.remove_images(&p.images).await;
                    let error = ItemError::Persistence(CatalogError::Persistence(message.clone()));
                    self.record_failure(state, FailureRecord::from_error(&p.item, &error));
                }
                if self.options.mode == TransactionMode::AllOrNothing {
                    state.rolled_back = true;
                }
            }
        }
    }

    /// Discard the buffer and delete files stored for it
    async fn rollback(&self, state: &mut RunState, reason: &str) {
        let pending = std::mem::take(&mut state.buffer);
        let writes: usize = pending.iter().map(|p| p.writes.len()).sum();
        warn!("↩️ Rolling back {} staged writes: {}", writes, reason);

        for p in &pending {
            self.remove_images(&p.images).await;
        }
        state.rolled_back = true;
        self.audit.emit(
            None,
            &AuditEvent::Persistence {
                action: "rollback".into(),
                writes,
                error: Some(reason.to_string()),
            },
        );
    }

    async fn remove_images(&self, images: &[StoredImage]) {
        let Some(downloader) = &self.images else {
            return;
        };
        for image in images {
            if let Err(e) = downloader.store().remove(image).await {
                warn!("Could not remove {}: {}", image.absolute_path.display(), e);
            }
        }
    }
}
