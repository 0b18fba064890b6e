//! SQLite persistence for products, rank history, URL-list snapshots and settings

use anyhow::{Context, Result, bail, ensure};
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use sqlx::{Row, SqliteConnection, SqlitePool, sqlite::SqliteRow};
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::errors::CrawlError;
use crate::domain::product::{
    ExistingProduct, ProductRecord, RankHistoryEntry, StoredProduct, is_sentinel,
};
use crate::domain::repositories::{ProductStore, SaveOutcome};
use crate::infrastructure::database_connection::DEFAULT_CRAWL_INTERVAL;

/// Rank-history entries retained per product
pub const HISTORY_LIMIT: i64 = 5;

/// Settings key holding the re-crawl interval in hours
pub const CRAWL_INTERVAL_KEY: &str = "crawl_interval";

/// Text field as stored: sentinels become NULL
pub fn coerce_text(raw: &str) -> Option<String> {
    if is_sentinel(raw) {
        None
    } else {
        Some(raw.trim().to_string())
    }
}

/// Rank as stored: separators stripped, positive integers only
pub fn coerce_rank(raw: &str) -> Option<i64> {
    if is_sentinel(raw) {
        return None;
    }
    let cleaned: String = raw
        .trim()
        .trim_start_matches('#')
        .chars()
        .filter(|c| !matches!(c, ',' | ' ' | '\u{a0}'))
        .collect();
    cleaned.parse::<i64>().ok().filter(|rank| *rank > 0)
}

/// Price as stored: currency symbols and separators stripped
pub fn coerce_price(raw: &str) -> Option<f64> {
    if is_sentinel(raw) {
        return None;
    }
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    cleaned.parse::<f64>().ok().filter(|price| price.is_finite())
}

/// Fixed-width UTC timestamp so lexical order equals time order
fn timestamp_now() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[derive(Clone)]
pub struct ProductRepository {
    pool: Arc<SqlitePool>,
}

impl ProductRepository {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    /// Internal id and current rank of a product, if stored
    pub async fn find_by_identifier(&self, asin: &str) -> Result<Option<ExistingProduct>> {
        let mut conn = self.pool.acquire().await?;
        Self::find_in(&mut conn, asin).await
    }

    /// Insert or update a product row.
    ///
    /// Returns the row as it was before the write, or `None` when this call
    /// created it. A unique violation on insert (another writer created the
    /// row first) degrades to an update.
    pub async fn upsert(&self, record: &ProductRecord) -> Result<Option<ExistingProduct>> {
        let mut conn = self.pool.acquire().await?;
        Self::upsert_in(&mut conn, record).await
    }

    /// Append a history entry when a rank was observed and it moved.
    ///
    /// Returns whether an entry was written; the trail is pruned afterwards.
    pub async fn record_rank_if_changed(
        &self,
        asin: &str,
        new_rank: Option<i64>,
        new_price: Option<f64>,
        previous_rank: Option<i64>,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let recorded = Self::record_rank_in(&mut tx, asin, new_rank, new_price, previous_rank).await?;
        tx.commit().await?;
        Ok(recorded)
    }

    /// Keep only the newest entries of a product's rank trail
    pub async fn prune_history(&self, asin: &str) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        Self::prune_in(&mut conn, asin).await
    }

    async fn find_in(conn: &mut SqliteConnection, asin: &str) -> Result<Option<ExistingProduct>> {
        let row = sqlx::query("SELECT id, rank FROM products WHERE asin = ?")
            .bind(asin)
            .fetch_optional(&mut *conn)
            .await
            .with_context(|| format!("Failed to look up product {asin}"))?;

        Ok(row.map(|row| ExistingProduct {
            id: row.get("id"),
            rank: row.get("rank"),
        }))
    }

    async fn upsert_in(
        conn: &mut SqliteConnection,
        record: &ProductRecord,
    ) -> Result<Option<ExistingProduct>> {
        if let Some(existing) = Self::find_in(conn, &record.asin).await? {
            Self::update_in(conn, record).await?;
            return Ok(Some(existing));
        }

        match Self::insert_in(conn, record).await {
            Ok(()) => Ok(None),
            Err(e) if is_unique_violation(&e) => {
                debug!("Insert raced for {}, updating instead", record.asin);
                let existing = Self::find_in(conn, &record.asin).await?;
                Self::update_in(conn, record).await?;
                Ok(existing)
            }
            Err(e) => Err(e).with_context(|| format!("Failed to insert product {}", record.asin)),
        }
    }

    async fn insert_in(
        conn: &mut SqliteConnection,
        record: &ProductRecord,
    ) -> std::result::Result<(), sqlx::Error> {
        let now = timestamp_now();
        sqlx::query(
            r"
            INSERT INTO products
            (name, price, rank, asin, brand, ratings, stars, image_url, date, url, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&record.title)
        .bind(coerce_price(&record.price))
        .bind(coerce_rank(&record.rank))
        .bind(&record.asin)
        .bind(coerce_text(&record.brand))
        .bind(coerce_text(&record.ratings))
        .bind(coerce_text(&record.stars))
        .bind(coerce_text(&record.image_url))
        .bind(coerce_text(&record.date))
        .bind(coerce_text(&record.url))
        .bind(&now)
        .bind(&now)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn update_in(conn: &mut SqliteConnection, record: &ProductRecord) -> Result<()> {
        sqlx::query(
            r"
            UPDATE products
            SET name = ?, price = ?, rank = ?, brand = ?, ratings = ?, stars = ?,
                image_url = ?, date = ?, url = ?, updated_at = ?
            WHERE asin = ?
            ",
        )
        .bind(&record.title)
        .bind(coerce_price(&record.price))
        .bind(coerce_rank(&record.rank))
        .bind(coerce_text(&record.brand))
        .bind(coerce_text(&record.ratings))
        .bind(coerce_text(&record.stars))
        .bind(coerce_text(&record.image_url))
        .bind(coerce_text(&record.date))
        .bind(coerce_text(&record.url))
        .bind(timestamp_now())
        .bind(&record.asin)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("Failed to update product {}", record.asin))?;
        Ok(())
    }

    async fn record_rank_in(
        conn: &mut SqliteConnection,
        asin: &str,
        new_rank: Option<i64>,
        new_price: Option<f64>,
        previous_rank: Option<i64>,
    ) -> Result<bool> {
        let Some(rank) = new_rank else {
            return Ok(false);
        };
        if previous_rank == Some(rank) {
            return Ok(false);
        }

        sqlx::query("INSERT INTO rank_history (asin, rank, price, recorded_at) VALUES (?, ?, ?, ?)")
            .bind(asin)
            .bind(rank)
            .bind(new_price)
            .bind(timestamp_now())
            .execute(&mut *conn)
            .await
            .with_context(|| format!("Failed to record rank history for {asin}"))?;

        Self::prune_in(conn, asin).await?;
        Ok(true)
    }

    async fn prune_in(conn: &mut SqliteConnection, asin: &str) -> Result<u64> {
        let result = sqlx::query(
            r"
            DELETE FROM rank_history
            WHERE asin = ? AND id NOT IN (
                SELECT id FROM rank_history
                WHERE asin = ?
                ORDER BY recorded_at DESC, id DESC
                LIMIT ?
            )
            ",
        )
        .bind(asin)
        .bind(asin)
        .bind(HISTORY_LIMIT)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("Failed to prune rank history for {asin}"))?;

        Ok(result.rows_affected())
    }

    /// Full stored row of a product
    pub async fn get_product(&self, asin: &str) -> Result<Option<StoredProduct>> {
        let row = sqlx::query(
            r"
            SELECT id, asin, name, price, rank, brand, ratings, stars, image_url, date, url,
                   created_at, updated_at
            FROM products WHERE asin = ?
            ",
        )
        .bind(asin)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(row.map(|row| Self::row_to_product(&row)))
    }

    /// Rank trail of a product, newest first
    pub async fn rank_history(&self, asin: &str) -> Result<Vec<RankHistoryEntry>> {
        let rows = sqlx::query(
            r"
            SELECT id, asin, rank, price, recorded_at
            FROM rank_history
            WHERE asin = ?
            ORDER BY recorded_at DESC, id DESC
            ",
        )
        .bind(asin)
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| RankHistoryEntry {
                id: row.get("id"),
                asin: row.get("asin"),
                rank: row.get("rank"),
                price: row.get("price"),
                recorded_at: row.get::<NaiveDateTime, _>("recorded_at").and_utc(),
            })
            .collect())
    }

    /// Store a submitted URL batch as a JSON snapshot
    pub async fn save_url_list(&self, urls: &[String]) -> Result<i64> {
        let payload = serde_json::to_string(urls)?;
        let result = sqlx::query("INSERT INTO url_lists (urls, created_at) VALUES (?, ?)")
            .bind(payload)
            .bind(timestamp_now())
            .execute(&*self.pool)
            .await
            .context("Failed to save URL list")?;

        Ok(result.last_insert_rowid())
    }

    /// Most recently submitted URL batch
    pub async fn latest_url_list(&self) -> Result<Option<Vec<String>>> {
        let row = sqlx::query("SELECT urls FROM url_lists ORDER BY created_at DESC, id DESC LIMIT 1")
            .fetch_optional(&*self.pool)
            .await?;

        match row {
            Some(row) => {
                let payload: String = row.get("urls");
                let urls = serde_json::from_str(&payload).context("Stored URL list is not valid JSON")?;
                Ok(Some(urls))
            }
            None => Ok(None),
        }
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&*self.pool)
            .await?;

        Ok(row.map(|row| row.get("value")))
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            ",
        )
        .bind(key)
        .bind(value)
        .bind(timestamp_now())
        .execute(&*self.pool)
        .await
        .with_context(|| format!("Failed to save setting {key}"))?;
        Ok(())
    }

    /// Re-crawl interval in hours; unreadable values fall back to the seed
    pub async fn crawl_interval_hours(&self) -> Result<u32> {
        let fallback = DEFAULT_CRAWL_INTERVAL.parse::<u32>().unwrap_or(2);
        let value = self.get_setting(CRAWL_INTERVAL_KEY).await?;
        Ok(value.and_then(|v| v.trim().parse().ok()).unwrap_or(fallback))
    }

    pub async fn set_crawl_interval_hours(&self, hours: u32) -> Result<()> {
        if !(1..=24).contains(&hours) {
            bail!("Invalid crawl interval: {hours} (must be between 1 and 24 hours)");
        }
        self.set_setting(CRAWL_INTERVAL_KEY, &hours.to_string()).await?;
        info!("Crawl interval set to {} hours", hours);
        Ok(())
    }

    fn row_to_product(row: &SqliteRow) -> StoredProduct {
        StoredProduct {
            id: row.get("id"),
            asin: row.get("asin"),
            name: row.get("name"),
            price: row.get("price"),
            rank: row.get("rank"),
            brand: row.get("brand"),
            ratings: row.get("ratings"),
            stars: row.get("stars"),
            image_url: row.get("image_url"),
            date: row.get("date"),
            url: row.get("url"),
            created_at: row.get::<NaiveDateTime, _>("created_at").and_utc(),
            updated_at: row.get::<NaiveDateTime, _>("updated_at").and_utc(),
        }
    }
}

#[async_trait]
impl ProductStore for ProductRepository {
    async fn save_observation(&self, record: &ProductRecord) -> Result<SaveOutcome> {
        ensure!(
            record.has_identifier(),
            CrawlError::InvalidRecord(format!("no product identifier for {}", record.url))
        );

        let rank = coerce_rank(&record.rank);
        let price = coerce_price(&record.price);

        // Row and trail commit together, so a failed append leaves the old
        // rank in place and a retry records the observation
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin product transaction")?;
        let previous = Self::upsert_in(&mut tx, record).await?;
        let previous_rank = previous.and_then(|p| p.rank);
        let rank_recorded =
            Self::record_rank_in(&mut tx, &record.asin, rank, price, previous_rank).await?;
        tx.commit()
            .await
            .with_context(|| format!("Failed to commit product {}", record.asin))?;

        if previous.is_none() {
            info!("Created product {} ({})", record.asin, record.short_title());
        } else {
            debug!("Updated product {}", record.asin);
        }

        Ok(SaveOutcome {
            created: previous.is_none(),
            previous_rank,
            rank_recorded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::product::{NOT_AVAILABLE_TEXT, NOT_FOUND_TEXT};
    use crate::infrastructure::database_connection::DatabaseConnection;
    use tempfile::{TempDir, tempdir};

    async fn setup_repository() -> Result<(TempDir, ProductRepository)> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("products.db");
        let db = DatabaseConnection::new(&format!("sqlite:{}", db_path.display())).await?;
        db.ensure_schema().await?;
        let repo = ProductRepository::new(Arc::new(db.pool().clone()));
        Ok((temp_dir, repo))
    }

    fn record(asin: &str, rank: &str, price: &str) -> ProductRecord {
        ProductRecord {
            asin: asin.to_string(),
            title: "Widget".to_string(),
            price: price.to_string(),
            rank: rank.to_string(),
            brand: "Acme".to_string(),
            ratings: "1200".to_string(),
            stars: "4.5".to_string(),
            image_url: "https://img.example/widget.jpg".to_string(),
            date: "January 5, 2023".to_string(),
            url: format!("https://example/dp/{asin}"),
        }
    }

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(coerce_rank("42"), Some(42));
        assert_eq!(coerce_rank("#1,234"), Some(1234));
        assert_eq!(coerce_rank(NOT_AVAILABLE_TEXT), None);
        assert_eq!(coerce_rank("abc"), None);
        assert_eq!(coerce_rank("0"), None);
        assert_eq!(coerce_price("$1,299.99"), Some(1299.99));
        assert_eq!(coerce_price("19.99"), Some(19.99));
        assert_eq!(coerce_price(NOT_FOUND_TEXT), None);
        assert_eq!(coerce_price("1.2.3"), None);
        assert_eq!(coerce_text(" Acme "), Some("Acme".to_string()));
        assert_eq!(coerce_text(""), None);
    }

    #[tokio::test]
    async fn test_first_observation_creates_product_and_history() -> Result<()> {
        let (_dir, repo) = setup_repository().await?;

        let outcome = repo.save_observation(&record("AAA111", "42", "19.99")).await?;
        assert!(outcome.created);
        assert!(outcome.rank_recorded);

        let product = repo.get_product("AAA111").await?.unwrap();
        assert_eq!(product.name, "Widget");
        assert_eq!(product.price, Some(19.99));
        assert_eq!(product.rank, Some(42));

        let history = repo.rank_history("AAA111").await?;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].rank, 42);
        assert_eq!(history[0].price, Some(19.99));
        Ok(())
    }

    #[tokio::test]
    async fn test_rank_change_appends_history() -> Result<()> {
        let (_dir, repo) = setup_repository().await?;

        repo.save_observation(&record("AAA111", "42", "19.99")).await?;
        let outcome = repo.save_observation(&record("AAA111", "50", "19.99")).await?;
        assert!(!outcome.created);
        assert_eq!(outcome.previous_rank, Some(42));

        let found = repo.find_by_identifier("AAA111").await?.unwrap();
        assert_eq!(found.rank, Some(50));

        let ranks: Vec<i64> = repo.rank_history("AAA111").await?.iter().map(|e| e.rank).collect();
        assert_eq!(ranks, vec![50, 42]);
        Ok(())
    }

    #[tokio::test]
    async fn test_unchanged_rank_is_recorded_once() -> Result<()> {
        let (_dir, repo) = setup_repository().await?;

        repo.save_observation(&record("AAA111", "42", "19.99")).await?;
        let outcome = repo.save_observation(&record("AAA111", "42", "18.99")).await?;
        assert!(!outcome.rank_recorded);

        assert_eq!(repo.rank_history("AAA111").await?.len(), 1);
        assert_eq!(repo.get_product("AAA111").await?.unwrap().price, Some(18.99));
        Ok(())
    }

    #[tokio::test]
    async fn test_history_keeps_newest_five() -> Result<()> {
        let (_dir, repo) = setup_repository().await?;

        for rank in 1..=8 {
            repo.save_observation(&record("AAA111", &rank.to_string(), "9.99")).await?;
        }

        let ranks: Vec<i64> = repo.rank_history("AAA111").await?.iter().map(|e| e.rank).collect();
        assert_eq!(ranks, vec![8, 7, 6, 5, 4]);
        Ok(())
    }

    #[tokio::test]
    async fn test_non_numeric_rank_never_reaches_history() -> Result<()> {
        let (_dir, repo) = setup_repository().await?;

        let outcome = repo.save_observation(&record("BBB222", NOT_AVAILABLE_TEXT, "5.00")).await?;
        assert!(!outcome.rank_recorded);
        repo.save_observation(&record("BBB222", "n/a rank", "5.00")).await?;

        assert!(repo.rank_history("BBB222").await?.is_empty());
        assert_eq!(repo.get_product("BBB222").await?.unwrap().rank, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_racing_inserts_leave_one_row() -> Result<()> {
        let (_dir, repo) = setup_repository().await?;
        let first = record("CCC333", "7", "1.00");
        let second = record("CCC333", "9", "2.00");

        let mut conn = repo.pool.acquire().await?;
        ProductRepository::insert_in(&mut conn, &first).await?;
        let err = ProductRepository::insert_in(&mut conn, &second).await.unwrap_err();
        drop(conn);
        assert!(is_unique_violation(&err));

        // The losing writer of a race reaches the insert with no row seen
        let (a, b) = tokio::join!(repo.upsert(&first), repo.upsert(&second));
        a?;
        b?;

        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM products WHERE asin = 'CCC333'")
            .fetch_one(&*repo.pool)
            .await?
            .get("n");
        assert_eq!(count, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_history_append_keeps_previous_rank() -> Result<()> {
        let (_dir, repo) = setup_repository().await?;
        repo.save_observation(&record("AAA111", "42", "19.99")).await?;

        sqlx::query("ALTER TABLE rank_history RENAME TO rank_history_offline")
            .execute(&*repo.pool)
            .await?;
        assert!(repo.save_observation(&record("AAA111", "50", "19.99")).await.is_err());
        assert_eq!(repo.find_by_identifier("AAA111").await?.unwrap().rank, Some(42));

        sqlx::query("ALTER TABLE rank_history_offline RENAME TO rank_history")
            .execute(&*repo.pool)
            .await?;
        let outcome = repo.save_observation(&record("AAA111", "50", "19.99")).await?;
        assert_eq!(outcome.previous_rank, Some(42));
        assert!(outcome.rank_recorded);

        let ranks: Vec<i64> = repo.rank_history("AAA111").await?.iter().map(|e| e.rank).collect();
        assert_eq!(ranks, vec![50, 42]);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_identifier_is_rejected() -> Result<()> {
        let (_dir, repo) = setup_repository().await?;

        let err = repo
            .save_observation(&record(NOT_FOUND_TEXT, "3", "1.00"))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CrawlError>(),
            Some(CrawlError::InvalidRecord(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_url_list_snapshots() -> Result<()> {
        let (_dir, repo) = setup_repository().await?;
        assert_eq!(repo.latest_url_list().await?, None);

        repo.save_url_list(&["https://example/dp/A".to_string()]).await?;
        let latest = vec!["https://example/dp/B".to_string(), "https://example/dp/C".to_string()];
        repo.save_url_list(&latest).await?;

        assert_eq!(repo.latest_url_list().await?, Some(latest));
        Ok(())
    }

    #[tokio::test]
    async fn test_crawl_interval_setting() -> Result<()> {
        let (_dir, repo) = setup_repository().await?;
        assert_eq!(repo.crawl_interval_hours().await?, 2);

        repo.set_crawl_interval_hours(6).await?;
        assert_eq!(repo.crawl_interval_hours().await?, 6);

        assert!(repo.set_crawl_interval_hours(0).await.is_err());
        assert!(repo.set_crawl_interval_hours(25).await.is_err());
        assert_eq!(repo.get_setting("crawl_interval").await?, Some("6".to_string()));
        Ok(())
    }
}
