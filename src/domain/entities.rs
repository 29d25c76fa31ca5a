//! Core domain entities for catalog enrichment
//!
//! Catalog records are read from the external catalog; `WorkItem`s are derived
//! from them once per run and never outlive it.

use serde::{Deserialize, Serialize};

/// Catalog-assigned product identifier
pub type ProductId = i64;

/// A product row as exposed by the catalog read interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogProduct {
    pub id: ProductId,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub image: Option<String>,
}

impl CatalogProduct {
    /// True when the stored description already meets the acceptance threshold
    pub fn has_description(&self, min_length: usize) -> bool {
        self.description
            .as_deref()
            .is_some_and(|d| d.trim().chars().count() >= min_length)
    }
}

/// A merchant offer attached to a product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub product_id: ProductId,
    pub merchant_name: String,
    pub url: String,
}

/// One product scheduled for one extraction attempt in a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub slug: String,
    pub source_url: String,
    pub merchant: String,
    /// How many earlier runs already failed on this item
    #[serde(default)]
    pub retry_count: u32,
}

impl WorkItem {
    /// Build a work item from a product and the first offer carrying a usable URL.
    ///
    /// Returns `None` when none of the offers has a non-empty URL.
    pub fn from_product(product: &CatalogProduct, offers: &[Offer]) -> Option<Self> {
        let offer = offers.iter().find(|o| !o.url.trim().is_empty())?;

        Some(Self {
            product_id: product.id,
            product_name: product.name.clone(),
            slug: product.slug.clone(),
            source_url: offer.url.trim().to_string(),
            merchant: offer.merchant_name.clone(),
            retry_count: 0,
        })
    }

    /// Lowercased host of the source URL, if it parses
    pub fn host(&self) -> Option<String> {
        url::Url::parse(&self.source_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_lowercase))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product() -> CatalogProduct {
        CatalogProduct {
            id: 7,
            name: "Samsung Galaxy A15".to_string(),
            slug: "samsung-galaxy-a15".to_string(),
            description: None,
            image: None,
        }
    }

    fn offer(url: &str, merchant: &str) -> Offer {
        Offer {
            product_id: 7,
            merchant_name: merchant.to_string(),
            url: url.to_string(),
        }
    }

    #[test]
    fn work_item_uses_first_offer_with_url() {
        let offers = vec![
            offer("", "Empty"),
            offer("  ", "Blank"),
            offer("https://www.jumia.ma/galaxy-a15.html", "Jumia"),
            offer("https://www.iris.ma/galaxy.html", "Iris"),
        ];

        let item = WorkItem::from_product(&product(), &offers).unwrap();
        assert_eq!(item.source_url, "https://www.jumia.ma/galaxy-a15.html");
        assert_eq!(item.merchant, "Jumia");
        assert_eq!(item.retry_count, 0);
        assert_eq!(item.host().as_deref(), Some("www.jumia.ma"));
    }

    #[test]
    fn work_item_requires_a_link() {
        assert!(WorkItem::from_product(&product(), &[offer("", "Nobody")]).is_none());
        assert!(WorkItem::from_product(&product(), &[]).is_none());
    }

    #[test]
    fn description_threshold_counts_characters() {
        let mut p = product();
        assert!(!p.has_description(50));
        p.description = Some("é".repeat(50));
        assert!(p.has_description(50));
        p.description = Some(format!("   {}   ", "x".repeat(49)));
        assert!(!p.has_description(50));
    }
}
