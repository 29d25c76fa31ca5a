//! Description coverage of the catalog and a rough time-to-completion

use std::time::Duration;

use crate::domain::errors::CatalogError;
use crate::domain::repositories::{CatalogStore, DescriptionStats};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressReport {
    pub stats: DescriptionStats,
    /// Time to process every remaining product at the configured request delay
    pub estimated_remaining: Duration,
}

pub async fn catalog_progress(
    catalog: &dyn CatalogStore,
    request_delay_secs: f64,
) -> Result<ProgressReport, CatalogError> {
    let stats = catalog.description_stats().await?;
    Ok(ProgressReport {
        stats,
        estimated_remaining: estimate_remaining(stats.needing_processing, request_delay_secs),
    })
}

pub fn estimate_remaining(items: u64, request_delay_secs: f64) -> Duration {
    #[allow(clippy::cast_precision_loss)]
    let secs = items as f64 * request_delay_secs.max(0.0);
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// `1h 05m`, `12m 30s` or `45s`
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}h {minutes:02}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}

impl ProgressReport {
    pub fn render(&self) -> String {
        let s = &self.stats;
        [
            "📊 Description coverage".to_string(),
            format!("  Total products:        {}", s.total_products),
            format!(
                "  With description:      {} ({:.1}%)",
                s.with_description,
                s.coverage_percent()
            ),
            format!("  Without description:   {}", s.without_description),
            format!("  Needing processing:    {}", s.needing_processing),
            format!("  With image:            {}", s.with_image),
            format!(
                "  Estimated time left:   {}",
                format_duration(self.estimated_remaining)
            ),
        ]
        .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::InMemoryCatalog;
    use rstest::rstest;

    #[rstest]
    #[case(0, "0s")]
    #[case(45, "45s")]
    #[case(750, "12m 30s")]
    #[case(3900, "1h 05m")]
    fn durations(#[case] secs: u64, #[case] expected: &str) {
        assert_eq!(format_duration(Duration::from_secs(secs)), expected);
    }

    #[test]
    fn estimate_uses_delay() {
        assert_eq!(estimate_remaining(120, 2.5), Duration::from_secs(300));
        assert_eq!(estimate_remaining(10, -1.0), Duration::ZERO);
    }

    #[tokio::test]
    async fn report_counts_catalog() {
        let catalog = InMemoryCatalog::new()
            .with_product(1, "A", None)
            .with_product(2, "B", Some(&"x".repeat(60)))
            .with_product(3, "C", Some("court"));

        let report = catalog_progress(&catalog, 2.0).await.unwrap();

        assert_eq!(report.stats.total_products, 3);
        assert_eq!(report.stats.needing_processing, 2);
        assert_eq!(report.estimated_remaining, Duration::from_secs(4));
        assert!(report.render().contains("Needing processing:    2"));
    }
}
