//! Application layer: the extraction pipeline and the commands built on it

pub mod description_import;
pub mod extraction_pipeline;
pub mod llm_fallback;
pub mod orchestrator;
pub mod progress;
pub mod run_summary;

pub use description_import::{ImportOptions, ImportStats, import_descriptions, load_import_file};
pub use extraction_pipeline::{DescriptionExtractor, PageExtraction};
pub use llm_fallback::LlmFallback;
pub use orchestrator::{BatchOrchestrator, RunOptions, RunReport, TransactionMode, WorkSource};
pub use progress::{ProgressReport, catalog_progress};
pub use run_summary::render_summary;
