//! Failure records and run statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entities::{ProductId, WorkItem};
use super::errors::{ErrorKind, ItemError};

/// Immutable record of one work item that errored during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub product_id: ProductId,
    pub product_name: String,
    pub slug: String,
    pub url: String,
    pub merchant: String,
    pub error_kind: ErrorKind,
    pub error_message: String,
    pub timestamp: DateTime<Utc>,
    pub retry_count: u32,
}

impl FailureRecord {
    pub fn from_error(item: &WorkItem, error: &ItemError) -> Self {
        Self {
            product_id: item.product_id,
            product_name: item.product_name.clone(),
            slug: item.slug.clone(),
            url: item.source_url.clone(),
            merchant: item.merchant.clone(),
            error_kind: error.kind(),
            error_message: error.to_string(),
            timestamp: Utc::now(),
            retry_count: item.retry_count,
        }
    }

    /// Work item for the next run, with the retry counter carried forward
    pub fn to_retry_item(&self) -> WorkItem {
        WorkItem {
            product_id: self.product_id,
            product_name: self.product_name.clone(),
            slug: self.slug.clone(),
            source_url: self.url.clone(),
            merchant: self.merchant.clone(),
            retry_count: self.retry_count.saturating_add(1),
        }
    }
}

/// Counters mutated throughout a run and reported at the end
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub processed: u32,
    pub updated: u32,
    pub skipped: u32,
    pub errors: u32,
    pub llm_calls: u32,
    pub images_downloaded: u32,
    pub images_failed: u32,
}
