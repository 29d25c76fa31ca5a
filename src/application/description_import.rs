//! Bulk description updates from a JSON file of scraped products
//!
//! Expected shape: `{ "products": [{ "name": ..., "slug": ..., "description": ... }] }`.
//! Products are matched by slug, then by slugified name, then by the most
//! similar name above a threshold. All updates land in one transaction.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::entities::CatalogProduct;
use crate::domain::errors::CatalogError;
use crate::domain::repositories::{CatalogStore, CatalogWrite};
use crate::domain::services::{slugify, string_similarity};

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImportedProduct {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ImportFile {
    #[serde(default)]
    products: Vec<ImportedProduct>,
}

#[derive(Debug, Clone, Copy)]
pub struct ImportOptions {
    pub dry_run: bool,
    pub similarity_threshold: f64,
    pub min_description_length: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            similarity_threshold: 0.85,
            min_description_length: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    pub products_in_file: usize,
    pub matched: usize,
    pub updated: usize,
    /// Updated products that already had a different description
    pub replaced: usize,
    pub unchanged: usize,
    pub skipped_no_description: usize,
    pub skipped_too_short: usize,
    pub not_found: usize,
}

pub async fn load_import_file(path: &Path) -> Result<Vec<ImportedProduct>, ImportError> {
    let raw = tokio::fs::read(path).await.map_err(|source| ImportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file: ImportFile = serde_json::from_slice(&raw).map_err(|source| ImportError::Format {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(file.products)
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Catalog product matching an imported record
pub fn find_match<'a>(
    imported: &ImportedProduct,
    catalog: &'a [CatalogProduct],
    threshold: f64,
) -> Option<&'a CatalogProduct> {
    let name = imported.name.trim();
    if name.is_empty() {
        return None;
    }

    if let Some(slug) = imported.slug.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        if let Some(product) = catalog.iter().find(|p| p.slug == slug) {
            return Some(product);
        }
    }

    let name_slug = slugify(name);
    if let Some(product) = catalog.iter().find(|p| p.slug == name_slug) {
        return Some(product);
    }

    let wanted = normalize_name(name);
    catalog
        .iter()
        .map(|p| (p, string_similarity(&normalize_name(&p.name), &wanted)))
        .filter(|(_, score)| *score >= threshold)
        .fold(None, |best: Option<(&CatalogProduct, f64)>, (p, score)| match best {
            Some((_, best_score)) if best_score >= score => best,
            _ => Some((p, score)),
        })
        .map(|(p, _)| p)
}

pub async fn import_descriptions(
    catalog: &dyn CatalogStore,
    imported: &[ImportedProduct],
    options: ImportOptions,
) -> Result<ImportStats, ImportError> {
    let products = catalog.all_products().await?;
    let mut stats = ImportStats {
        products_in_file: imported.len(),
        ..ImportStats::default()
    };
    let mut writes = Vec::new();

    for record in imported {
        if record.name.trim().is_empty() {
            continue;
        }
        let description = record.description.as_deref().map(str::trim).unwrap_or_default();
        if description.is_empty() {
            stats.skipped_no_description += 1;
            continue;
        }
        if description.chars().count() < options.min_description_length {
            stats.skipped_too_short += 1;
            continue;
        }

        let Some(product) = find_match(record, &products, options.similarity_threshold) else {
            debug!("No catalog match for '{}'", record.name);
            stats.not_found += 1;
            continue;
        };
        stats.matched += 1;

        let existing = product.description.as_deref().map(str::trim).unwrap_or_default();
        if existing == description {
            stats.unchanged += 1;
            continue;
        }
        if !existing.is_empty() {
            stats.replaced += 1;
        }
        stats.updated += 1;
        writes.push(CatalogWrite::SetDescription {
            product_id: product.id,
            text: description.to_string(),
        });
    }

    if options.dry_run {
        info!("🔍 Dry run: {} descriptions would be updated", writes.len());
    } else {
        catalog.apply(&writes).await?;
        info!("✅ Updated {} descriptions", writes.len());
    }

    Ok(stats)
}
