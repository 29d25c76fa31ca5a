//! Domain module - core entities, error taxonomy and service seams
//!
//! Nothing in here performs I/O. Infrastructure implements the traits,
//! the application layer drives them.

pub mod entities;
pub mod errors;
pub mod extraction;
pub mod failure;
pub mod repositories;
pub mod services;

pub use entities::{CatalogProduct, Offer, ProductId, WorkItem};
pub use errors::{CatalogError, ErrorKind, FetchError, ItemError, LlmError};
pub use extraction::{
    ExtractionContext, ExtractionOutcome, ExtractionResult, LlmCallRecord, PageClassification,
    StrategyAttempt,
};
pub use failure::{FailureRecord, RunStats};
pub use repositories::{CatalogStore, CatalogWrite, DescriptionStats};
