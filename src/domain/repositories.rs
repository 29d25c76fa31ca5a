//! Repository interfaces for the product catalog
//!
//! The catalog is owned elsewhere; this crate only reads products and offers
//! and writes descriptions and image paths back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::entities::{CatalogProduct, Offer, ProductId};
use crate::domain::errors::CatalogError;

pub type CatalogResult<T> = Result<T, CatalogError>;

/// A single pending mutation of a catalog product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CatalogWrite {
    SetDescription { product_id: ProductId, text: String },
    SetImage { product_id: ProductId, path: String },
}

impl CatalogWrite {
    pub const fn product_id(&self) -> ProductId {
        match self {
            Self::SetDescription { product_id, .. } | Self::SetImage { product_id, .. } => {
                *product_id
            }
        }
    }
}

/// Coverage numbers reported by the `progress` command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptionStats {
    pub total_products: u64,
    pub with_description: u64,
    pub without_description: u64,
    /// Missing, empty, or shorter than the acceptance threshold
    pub needing_processing: u64,
    pub with_image: u64,
}

impl DescriptionStats {
    pub fn coverage_percent(&self) -> f64 {
        if self.total_products == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let pct = self.with_description as f64 / self.total_products as f64 * 100.0;
        pct
    }
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Products ordered by id. With `include_described == false` only products
    /// whose description is missing or shorter than the acceptance threshold
    /// are returned.
    async fn products_needing_description(
        &self,
        limit: Option<u32>,
        include_described: bool,
    ) -> CatalogResult<Vec<CatalogProduct>>;

    /// Offers of a product in catalog order
    async fn offers_for_product(&self, product_id: ProductId) -> CatalogResult<Vec<Offer>>;

    async fn product_by_id(&self, product_id: ProductId) -> CatalogResult<Option<CatalogProduct>>;

    async fn find_product_by_slug(&self, slug: &str) -> CatalogResult<Option<CatalogProduct>>;

    /// Every product, used for name matching during imports
    async fn all_products(&self) -> CatalogResult<Vec<CatalogProduct>>;

    /// Apply writes atomically: either all of them land or none do
    async fn apply(&self, writes: &[CatalogWrite]) -> CatalogResult<()>;

    async fn description_stats(&self) -> CatalogResult<DescriptionStats>;
}
