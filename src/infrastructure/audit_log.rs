//! Append-only JSON-lines audit trail of a scraping run
//!
//! One line per event, each carrying an RFC 3339 timestamp and the product it
//! concerns. Every line is also mirrored to `tracing` at debug level under the
//! `audit` target.

use std::fs::{File, OpenOptions};
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::entities::ProductId;
use crate::domain::errors::ErrorKind;
use crate::domain::extraction::PageClassification;
use crate::domain::failure::RunStats;
use crate::domain::services::TokenUsage;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Cannot open audit log {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    RunStarted {
        source: String,
        items: usize,
        transaction_mode: String,
        use_llm: bool,
        download_images: bool,
        dry_run: bool,
    },
    Fetch {
        url: String,
        status: Option<u16>,
        final_url: Option<String>,
        duration_ms: u64,
        error: Option<String>,
    },
    Classification {
        url: String,
        classification: PageClassification,
    },
    StrategyAttempt {
        strategy: String,
        candidate_length: Option<usize>,
        accepted: bool,
    },
    StrategySucceeded {
        strategy: String,
        length: usize,
    },
    LlmCall {
        model: String,
        usage: Option<TokenUsage>,
        error: Option<String>,
    },
    Validation {
        accepted: bool,
        length: usize,
        reason: Option<String>,
    },
    Persistence {
        action: String,
        writes: usize,
        error: Option<String>,
    },
    Image {
        status: String,
        url: Option<String>,
        path: Option<String>,
        error: Option<String>,
    },
    Failure {
        error_kind: ErrorKind,
        message: String,
        retry_count: u32,
    },
    RunFinished {
        stats: RunStats,
        rolled_back: bool,
        ledger_path: Option<String>,
        duration_ms: u64,
    },
}

#[derive(Debug, Serialize)]
struct AuditLine<'a> {
    timestamp: DateTime<Utc>,
    product_id: Option<ProductId>,
    #[serde(flatten)]
    event: &'a AuditEvent,
}

/// Thread-safe JSON-lines writer; a logger without a file only mirrors to tracing
pub struct AuditLogger {
    path: Option<PathBuf>,
    writer: Mutex<Option<LineWriter<File>>>,
}

impl AuditLogger {
    /// Open (append) the audit file, creating parent directories
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AuditError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| AuditError::Open {
                path: path.clone(),
                source,
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| AuditError::Open {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            path: Some(path),
            writer: Mutex::new(Some(LineWriter::new(file))),
        })
    }

    pub fn disabled() -> Self {
        Self {
            path: None,
            writer: Mutex::new(None),
        }
    }

    /// `logs/audit-<timestamp>.jsonl` inside `log_dir`
    pub fn default_path(log_dir: &Path) -> PathBuf {
        log_dir.join(format!("audit-{}.jsonl", Utc::now().format("%Y%m%d-%H%M%S")))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append one event. Write failures are logged and never fail the run.
    pub fn emit(&self, product_id: Option<ProductId>, event: &AuditEvent) {
        let line = AuditLine {
            timestamp: Utc::now(),
            product_id,
            event,
        };
        let json = match serde_json::to_string(&line) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize audit event: {}", e);
                return;
            }
        };

        debug!(target: "audit", "{}", json);

        let Ok(mut guard) = self.writer.lock() else {
            warn!("Audit log writer lock poisoned");
            return;
        };
        if let Some(writer) = guard.as_mut() {
            if let Err(e) = writeln!(writer, "{json}") {
                warn!("Failed to write audit event: {}", e);
            }
        }
    }

    pub fn flush(&self) {
        if let Ok(mut guard) = self.writer.lock() {
            if let Some(writer) = guard.as_mut() {
                if let Err(e) = writer.flush() {
                    warn!("Failed to flush audit log: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn lines(path: &Path) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn events_are_tagged_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("audit.jsonl");
        let logger = AuditLogger::open(&path).unwrap();

        logger.emit(
            Some(12),
            &AuditEvent::Classification {
                url: "https://www.jumia.ma/catalog/?q=tv".into(),
                classification: PageClassification::Listing,
            },
        );
        logger.emit(
            Some(12),
            &AuditEvent::LlmCall {
                model: "gpt-4o-mini".into(),
                usage: Some(TokenUsage {
                    prompt_tokens: 900,
                    completion_tokens: 80,
                    total_tokens: 980,
                }),
                error: None,
            },
        );
        logger.emit(
            None,
            &AuditEvent::RunFinished {
                stats: RunStats::default(),
                rolled_back: false,
                ledger_path: None,
                duration_ms: 5,
            },
        );
        logger.flush();

        let events = lines(&path);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0]["event"], "classification");
        assert_eq!(events[0]["classification"], "listing");
        assert_eq!(events[0]["product_id"], 12);
        assert_eq!(events[1]["usage"]["total_tokens"], 980);
        assert!(events[2]["product_id"].is_null());
        assert_eq!(events[2]["event"], "run_finished");

        let ts = events[0]["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[test]
    fn reopening_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let event = AuditEvent::Validation {
            accepted: false,
            length: 12,
            reason: Some("too short".into()),
        };

        AuditLogger::open(&path).unwrap().emit(Some(1), &event);
        AuditLogger::open(&path).unwrap().emit(Some(2), &event);

        let events = lines(&path);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1]["product_id"], 2);
    }

    #[test]
    fn disabled_logger_has_no_path() {
        let logger = AuditLogger::disabled();
        logger.emit(None, &AuditEvent::Validation {
            accepted: true,
            length: 80,
            reason: None,
        });
        assert!(logger.path().is_none());
    }
}
