//! End-of-run summary printed by the `scrape` command

use std::path::Path;

use crate::application::orchestrator::{RunReport, TransactionMode};
use crate::application::progress::format_duration;

/// Replay invocation for a ledger file
pub fn retry_command(ledger_path: &Path) -> String {
    format!("catalog-scraper scrape --retry-from {}", ledger_path.display())
}

pub fn render_summary(report: &RunReport) -> String {
    let s = &report.stats;
    let mut lines = vec![
        "=".repeat(60),
        if report.dry_run {
            "DRY RUN COMPLETE - no changes were made".to_string()
        } else {
            "SCRAPING COMPLETE".to_string()
        },
        "=".repeat(60),
        format!("  Processed:          {}", s.processed),
        format!("  Updated:            {}", s.updated),
        format!("  Skipped:            {}", s.skipped),
        format!("  Errors:             {}", s.errors),
        format!("  LLM calls:          {}", s.llm_calls),
        format!("  Images downloaded:  {}", s.images_downloaded),
        format!("  Images failed:      {}", s.images_failed),
        format!("  Duration:           {}", format_duration(report.duration)),
    ];

    if report.interrupted {
        lines.push("  ⚠ Run was interrupted before all items were processed".to_string());
    }
    if report.rolled_back && report.mode == TransactionMode::AllOrNothing {
        lines.push("  ⚠ All changes were rolled back due to errors".to_string());
    }
    if let Some(audit) = &report.audit_path {
        lines.push(format!("  Audit log:          {}", audit.display()));
    }
    if let Some(ledger) = &report.ledger_path {
        lines.push(String::new());
        lines.push(format!(
            "{} item(s) failed. Failure ledger: {}",
            report.failures.len(),
            ledger.display()
        ));
        lines.push(format!("Retry with: {}", retry_command(ledger)));
    }

    lines.join("\n")
}
