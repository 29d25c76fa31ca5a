//! Infrastructure layer: HTTP, HTML parsing, storage, language model, logging
//!
//! Concrete implementations of the domain's service and repository traits plus
//! the run-level artifacts (audit log, failure ledger, stored images).

pub mod audit_log;
pub mod browser_headers;
pub mod catalog_repository;
pub mod config;
pub mod database_connection;
pub mod failure_ledger;
pub mod http_client;
pub mod image_downloader;
pub mod llm_client;
pub mod logging;
pub mod parsing;

pub use audit_log::{AuditError, AuditEvent, AuditLogger};
pub use catalog_repository::SqliteCatalogStore;
pub use config::{ConfigError, ScraperConfig};
pub use database_connection::DatabaseConnection;
pub use failure_ledger::{FailureLedger, LedgerError};
pub use http_client::{HttpClient, HttpClientConfig};
pub use image_downloader::{ImageDownloader, ImageError, ImageStore, StoredImage};
pub use llm_client::OpenAiClient;
pub use logging::init_logging_with_config;
