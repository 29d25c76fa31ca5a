//! SQLite implementation of the catalog read/write interface

use async_trait::async_trait;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use tracing::debug;

use crate::domain::entities::{CatalogProduct, Offer, ProductId};
use crate::domain::errors::CatalogError;
use crate::domain::repositories::{CatalogResult, CatalogStore, CatalogWrite, DescriptionStats};

const PRODUCT_COLUMNS: &str = "id, name, slug, description, image";

/// `description` is missing, blank, or shorter than `?`
const NEEDS_DESCRIPTION: &str =
    "(description IS NULL OR TRIM(description) = '' OR LENGTH(TRIM(description)) < ?)";

pub struct SqliteCatalogStore {
    pool: SqlitePool,
    min_description_length: usize,
}

impl SqliteCatalogStore {
    pub fn new(pool: SqlitePool, min_description_length: usize) -> Self {
        Self {
            pool,
            min_description_length,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn min_length(&self) -> i64 {
        i64::try_from(self.min_description_length).unwrap_or(i64::MAX)
    }

    /// Insert a product row, returning its id
    pub async fn insert_product(
        &self,
        name: &str,
        slug: &str,
        description: Option<&str>,
    ) -> CatalogResult<ProductId> {
        let result = sqlx::query("INSERT INTO products (name, slug, description) VALUES (?, ?, ?)")
            .bind(name)
            .bind(slug)
            .bind(description)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// Attach an offer, creating the merchant on first use
    pub async fn insert_offer(
        &self,
        product_id: ProductId,
        merchant: &str,
        url: Option<&str>,
    ) -> CatalogResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT OR IGNORE INTO merchants (name) VALUES (?)")
            .bind(merchant)
            .execute(&mut *tx)
            .await?;
        let merchant_id: i64 = sqlx::query("SELECT id FROM merchants WHERE name = ?")
            .bind(merchant)
            .fetch_one(&mut *tx)
            .await?
            .try_get("id")?;

        sqlx::query("INSERT INTO price_offers (product_id, merchant_id, url) VALUES (?, ?, ?)")
            .bind(product_id)
            .bind(merchant_id)
            .bind(url)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

fn product_from_row(row: &SqliteRow) -> CatalogResult<CatalogProduct> {
    Ok(CatalogProduct {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        description: row.try_get("description")?,
        image: row.try_get("image")?,
    })
}

fn count(row: &SqliteRow, column: &str) -> CatalogResult<u64> {
    let value: i64 = row.try_get(column)?;
    u64::try_from(value).map_err(|e| CatalogError::Persistence(format!("{column}: {e}")))
}

#[async_trait]
impl CatalogStore for SqliteCatalogStore {
    async fn products_needing_description(
        &self,
        limit: Option<u32>,
        include_described: bool,
    ) -> CatalogResult<Vec<CatalogProduct>> {
        // SQLite treats a negative LIMIT as "no limit"
        let limit = limit.map_or(-1, i64::from);

        let rows = if include_described {
            let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY id LIMIT ?");
            sqlx::query(&sql).bind(limit).fetch_all(&self.pool).await?
        } else {
            let sql = format!(
                "SELECT {PRODUCT_COLUMNS} FROM products WHERE {NEEDS_DESCRIPTION} ORDER BY id LIMIT ?"
            );
            sqlx::query(&sql)
                .bind(self.min_length())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
        };

        debug!("Selected {} products for processing", rows.len());
        rows.iter().map(product_from_row).collect()
    }

    async fn offers_for_product(&self, product_id: ProductId) -> CatalogResult<Vec<Offer>> {
        let rows = sqlx::query(
            r"SELECT o.product_id, m.name AS merchant_name, COALESCE(o.url, '') AS url
              FROM price_offers o JOIN merchants m ON m.id = o.merchant_id
              WHERE o.product_id = ?
              ORDER BY o.id",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(Offer {
                    product_id: row.try_get("product_id")?,
                    merchant_name: row.try_get("merchant_name")?,
                    url: row.try_get("url")?,
                })
            })
            .collect()
    }

    async fn product_by_id(&self, product_id: ProductId) -> CatalogResult<Option<CatalogProduct>> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?"))
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(product_from_row).transpose()
    }

    async fn find_product_by_slug(&self, slug: &str) -> CatalogResult<Option<CatalogProduct>> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE slug = ?"))
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(product_from_row).transpose()
    }

    async fn all_products(&self) -> CatalogResult<Vec<CatalogProduct>> {
        let rows = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(product_from_row).collect()
    }

    async fn apply(&self, writes: &[CatalogWrite]) -> CatalogResult<()> {
        if writes.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for write in writes {
            let result = match write {
                CatalogWrite::SetDescription { product_id, text } => {
                    sqlx::query(
                        "UPDATE products SET description = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
                    )
                    .bind(text)
                    .bind(product_id)
                    .execute(&mut *tx)
                    .await?
                }
                CatalogWrite::SetImage { product_id, path } => {
                    sqlx::query(
                        "UPDATE products SET image = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
                    )
                    .bind(path)
                    .bind(product_id)
                    .execute(&mut *tx)
                    .await?
                }
            };

            if result.rows_affected() == 0 {
                // Dropping the transaction rolls back the writes already issued
                return Err(CatalogError::NotFound(write.product_id()));
            }
        }
        tx.commit().await?;

        debug!("Committed {} catalog writes", writes.len());
        Ok(())
    }

    async fn description_stats(&self) -> CatalogResult<DescriptionStats> {
        let row = sqlx::query(&format!(
            r"SELECT
                COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN description IS NOT NULL AND TRIM(description) <> '' THEN 1 ELSE 0 END), 0) AS with_description,
                COALESCE(SUM(CASE WHEN {NEEDS_DESCRIPTION} THEN 1 ELSE 0 END), 0) AS needing,
                COALESCE(SUM(CASE WHEN image IS NOT NULL AND image <> '' THEN 1 ELSE 0 END), 0) AS with_image
              FROM products"
        ))
        .bind(self.min_length())
        .fetch_one(&self.pool)
        .await?;

        let total_products = count(&row, "total")?;
        let with_description = count(&row, "with_description")?;
        Ok(DescriptionStats {
            total_products,
            with_description,
            without_description: total_products.saturating_sub(with_description),
            needing_processing: count(&row, "needing")?,
            with_image: count(&row, "with_image")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database_connection::DatabaseConnection;
    use tempfile::TempDir;

    async fn store() -> (TempDir, SqliteCatalogStore) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("catalog.db").display());
        let db = DatabaseConnection::new(&url).await.unwrap();
        db.migrate().await.unwrap();
        (dir, SqliteCatalogStore::new(db.pool().clone(), 50))
    }

    #[tokio::test]
    async fn selects_missing_and_short_descriptions() {
        let (_dir, store) = store().await;
        let long = "x".repeat(60);
        let missing = store.insert_product("A", "a", None).await.unwrap();
        let empty = store.insert_product("B", "b", Some("  ")).await.unwrap();
        let short = store.insert_product("C", "c", Some("too short")).await.unwrap();
        let done = store.insert_product("D", "d", Some(&long)).await.unwrap();

        let ids: Vec<_> = store
            .products_needing_description(None, false)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![missing, empty, short]);

        let limited = store.products_needing_description(Some(2), false).await.unwrap();
        assert_eq!(limited.len(), 2);

        let all = store.products_needing_description(None, true).await.unwrap();
        assert_eq!(all.last().map(|p| p.id), Some(done));
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn offers_keep_catalog_order() {
        let (_dir, store) = store().await;
        let id = store.insert_product("Robot", "robot", None).await.unwrap();
        store.insert_offer(id, "Iris", None).await.unwrap();
        store.insert_offer(id, "Jumia", Some("https://www.jumia.ma/robot.html")).await.unwrap();

        let offers = store.offers_for_product(id).await.unwrap();
        assert_eq!(offers.len(), 2);
        assert_eq!(offers[0].merchant_name, "Iris");
        assert_eq!(offers[0].url, "");
        assert_eq!(offers[1].url, "https://www.jumia.ma/robot.html");
    }

    #[tokio::test]
    async fn apply_is_all_or_nothing() {
        let (_dir, store) = store().await;
        let id = store.insert_product("Robot", "robot", None).await.unwrap();

        let err = store
            .apply(&[
                CatalogWrite::SetDescription {
                    product_id: id,
                    text: "Nouvelle description".into(),
                },
                CatalogWrite::SetImage {
                    product_id: 999,
                    path: "products/ghost_0.jpg".into(),
                },
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(999)));
        assert_eq!(store.product_by_id(id).await.unwrap().unwrap().description, None);

        store
            .apply(&[
                CatalogWrite::SetDescription {
                    product_id: id,
                    text: "Nouvelle description".into(),
                },
                CatalogWrite::SetImage {
                    product_id: id,
                    path: "products/robot_0.jpg".into(),
                },
            ])
            .await
            .unwrap();
        let product = store.find_product_by_slug("robot").await.unwrap().unwrap();
        assert_eq!(product.description.as_deref(), Some("Nouvelle description"));
        assert_eq!(product.image.as_deref(), Some("products/robot_0.jpg"));
    }

    #[tokio::test]
    async fn stats_count_coverage() {
        let (_dir, store) = store().await;
        store.insert_product("A", "a", None).await.unwrap();
        store.insert_product("B", "b", Some("short")).await.unwrap();
        store
            .insert_product("C", "c", Some(&"y".repeat(80)))
            .await
            .unwrap();

        let stats = store.description_stats().await.unwrap();
        assert_eq!(stats.total_products, 3);
        assert_eq!(stats.with_description, 2);
        assert_eq!(stats.without_description, 1);
        assert_eq!(stats.needing_processing, 2);
        assert_eq!(stats.with_image, 0);
    }
}
