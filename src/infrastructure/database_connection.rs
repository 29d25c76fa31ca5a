// Database connection and pool management
// SQLite catalog connection using sqlx

use std::path::Path;

use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use tracing::debug;

use crate::domain::errors::CatalogError;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self, CatalogError> {
        Self::with_max_connections(database_url, 5).await
    }

    pub async fn with_max_connections(
        database_url: &str,
        max_connections: u32,
    ) -> Result<Self, CatalogError> {
        let db_path = database_url
            .strip_prefix("sqlite://")
            .or_else(|| database_url.strip_prefix("sqlite:"))
            .unwrap_or(database_url);

        if db_path != ":memory:" {
            if let Some(parent) = Path::new(db_path).parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| CatalogError::Persistence(format!("{}: {e}", parent.display())))?;
            }

            // sqlx does not create a missing SQLite file on its own
            if !Path::new(db_path).exists() {
                tokio::fs::File::create(db_path)
                    .await
                    .map_err(|e| CatalogError::Persistence(format!("{db_path}: {e}")))?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        debug!("Connected to catalog database {}", database_url);
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), CatalogError> {
        let create_products_sql = r"
            CREATE TABLE IF NOT EXISTS products (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                slug TEXT NOT NULL UNIQUE,
                description TEXT,
                image TEXT,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
        ";

        let create_merchants_sql = r"
            CREATE TABLE IF NOT EXISTS merchants (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                website TEXT
            )
        ";

        let create_offers_sql = r"
            CREATE TABLE IF NOT EXISTS price_offers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                product_id INTEGER NOT NULL,
                merchant_id INTEGER NOT NULL,
                price REAL,
                url TEXT,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (product_id) REFERENCES products (id) ON DELETE CASCADE,
                FOREIGN KEY (merchant_id) REFERENCES merchants (id) ON DELETE CASCADE,
                UNIQUE (product_id, merchant_id)
            )
        ";

        let create_indexes_sql = r"
            CREATE INDEX IF NOT EXISTS idx_offers_product_id ON price_offers (product_id);
            CREATE INDEX IF NOT EXISTS idx_products_slug ON products (slug);
        ";

        sqlx::query(create_products_sql).execute(&self.pool).await?;
        sqlx::query(create_merchants_sql).execute(&self.pool).await?;
        sqlx::query(create_offers_sql).execute(&self.pool).await?;
        sqlx::query(create_indexes_sql).execute(&self.pool).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn creates_missing_file_and_parent_directory() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("nested").join("catalog.db");
        let database_url = format!("sqlite:{}", db_path.display());

        let db = DatabaseConnection::new(&database_url).await.unwrap();

        assert!(db_path.exists());
        assert!(!db.pool().is_closed());
    }

    #[tokio::test]
    async fn migration_is_repeatable() {
        let temp_dir = tempdir().unwrap();
        let database_url = format!("sqlite:{}", temp_dir.path().join("m.db").display());
        let db = DatabaseConnection::new(&database_url).await.unwrap();

        db.migrate().await.unwrap();
        db.migrate().await.unwrap();

        for table in ["products", "merchants", "price_offers"] {
            let row = sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name=?")
                .bind(table)
                .fetch_optional(db.pool())
                .await
                .unwrap();
            assert!(row.is_some(), "missing table {table}");
        }
    }
}
