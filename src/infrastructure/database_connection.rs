// Database connection and pool management
// This module handles SQLite database connections using sqlx

use anyhow::Result;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::path::Path;
use tracing::debug;

/// Default value of the `crawl_interval` setting, in hours
pub const DEFAULT_CRAWL_INTERVAL: &str = "2";

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        // Create database file directory if it doesn't exist
        let db_path = if database_url.starts_with("sqlite://") {
            database_url.trim_start_matches("sqlite://")
        } else if database_url.starts_with("sqlite:") {
            database_url.trim_start_matches("sqlite:")
        } else {
            database_url
        };

        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        // Ensure the database file exists by creating it if necessary
        if !Path::new(db_path).exists() {
            std::fs::File::create(db_path)?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the schema when absent. Safe to run on every start.
    pub async fn ensure_schema(&self) -> Result<()> {
        let create_products_sql = r#"
            CREATE TABLE IF NOT EXISTS products (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                price REAL,
                rank INTEGER,
                asin TEXT UNIQUE,
                brand TEXT,
                ratings TEXT,
                stars TEXT,
                image_url TEXT,
                date TEXT,
                url TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
        "#;

        let create_rank_history_sql = r#"
            CREATE TABLE IF NOT EXISTS rank_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                asin TEXT NOT NULL,
                rank INTEGER NOT NULL,
                price REAL,
                recorded_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
        "#;

        let create_url_lists_sql = r#"
            CREATE TABLE IF NOT EXISTS url_lists (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                urls TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
        "#;

        let create_settings_sql = r#"
            CREATE TABLE IF NOT EXISTS settings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                key TEXT UNIQUE NOT NULL,
                value TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
        "#;

        let create_indexes_sql = r#"
            CREATE INDEX IF NOT EXISTS idx_rank_history_asin ON rank_history (asin);
            CREATE INDEX IF NOT EXISTS idx_rank_history_recorded_at ON rank_history (recorded_at);
            CREATE INDEX IF NOT EXISTS idx_url_lists_created_at ON url_lists (created_at);
        "#;

        sqlx::query(create_products_sql).execute(&self.pool).await?;
        sqlx::query(create_rank_history_sql).execute(&self.pool).await?;
        sqlx::query(create_url_lists_sql).execute(&self.pool).await?;
        sqlx::query(create_settings_sql).execute(&self.pool).await?;
        sqlx::query(create_indexes_sql).execute(&self.pool).await?;

        sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES ('crawl_interval', ?)")
            .bind(DEFAULT_CRAWL_INTERVAL)
            .execute(&self.pool)
            .await?;

        debug!("Database schema ensured");
        Ok(())
    }
}
