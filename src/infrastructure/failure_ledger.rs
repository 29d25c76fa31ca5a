//! Replayable JSON ledger of work items that failed during a run

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::domain::entities::WorkItem;
use crate::domain::failure::FailureRecord;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Ledger I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Ledger {path} is not valid: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// On-disk ledger document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerFile {
    pub created_at: DateTime<Utc>,
    pub failures: Vec<FailureRecord>,
}

/// Ledgers are written as `LedgerFile`; a bare array of records is accepted on load
#[derive(Deserialize)]
#[serde(untagged)]
enum LedgerDocument {
    File(LedgerFile),
    Records(Vec<FailureRecord>),
}

/// Failure records accumulated in memory during a run
#[derive(Debug, Default)]
pub struct FailureLedger {
    records: Vec<FailureRecord>,
}

impl FailureLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: FailureRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[FailureRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write the full collection to `<dir>/failures-<timestamp>.json`.
    ///
    /// Returns `None` when nothing failed.
    pub async fn persist(&self, dir: &Path) -> Result<Option<PathBuf>, LedgerError> {
        if self.records.is_empty() {
            return Ok(None);
        }

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| LedgerError::Io {
                path: dir.to_path_buf(),
                source,
            })?;

        let created_at = Utc::now();
        let path = dir.join(format!(
            "failures-{}.json",
            created_at.format("%Y%m%d-%H%M%S-%3f")
        ));
        let document = LedgerFile {
            created_at,
            failures: self.records.clone(),
        };
        let json = serde_json::to_vec_pretty(&document).map_err(|source| LedgerError::Format {
            path: path.clone(),
            source,
        })?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|source| LedgerError::Io {
                path: path.clone(),
                source,
            })?;

        info!("📒 Wrote {} failure records to {}", self.records.len(), path.display());
        Ok(Some(path))
    }
}

pub async fn load_records(path: &Path) -> Result<Vec<FailureRecord>, LedgerError> {
    let raw = tokio::fs::read(path).await.map_err(|source| LedgerError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let document: LedgerDocument =
        serde_json::from_slice(&raw).map_err(|source| LedgerError::Format {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(match document {
        LedgerDocument::File(file) => file.failures,
        LedgerDocument::Records(records) => records,
    })
}

/// One work item per ledger record, retry counters incremented
pub async fn load_retry_items(path: &Path) -> Result<Vec<WorkItem>, LedgerError> {
    let records = load_records(path).await?;
    info!("Loaded {} failed items from {}", records.len(), path.display());
    Ok(records.iter().map(FailureRecord::to_retry_item).collect())
}
