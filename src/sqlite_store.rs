//! SQLite document store.
//!
//! Records live in the `books` table keyed by `isbn_13`. Each bulk call
//! runs in one transaction, so a batch is written or deleted as a whole.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::config::DocumentStoreConfig;
use crate::db;
use crate::migrate;
use crate::models::Record;
use crate::traits::{DeleteCriteria, DocumentStore};

/// [`DocumentStore`] backed by a SQLite database file.
pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    /// Open (creating if needed) the database and ensure the schema exists.
    pub async fn open(config: &DocumentStoreConfig) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::run_migrations(&pool)
            .await
            .context("Failed to run document-store migrations")?;
        Ok(Self { pool })
    }

    pub async fn count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    pub async fn get(&self, isbn: &str) -> Result<Option<Record>> {
        let row = sqlx::query(
            "SELECT isbn_13, title, author, description, category, format, length, \
             rating, published_year, thumbnail FROM books WHERE isbn_13 = ?",
        )
        .bind(isbn)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let value = serde_json::json!({
            "isbn_13": row.get::<String, _>("isbn_13"),
            "title": row.get::<String, _>("title"),
            "author": row.get::<String, _>("author"),
            "description": row.get::<String, _>("description"),
            "category": row.get::<String, _>("category"),
            "format": row.get::<String, _>("format"),
            "length": row.get::<String, _>("length"),
            "rating": row.get::<Option<f64>, _>("rating"),
            "published_year": row.get::<i64, _>("published_year"),
            "thumbnail": row.get::<String, _>("thumbnail"),
        });
        let record = serde_json::from_value(value)
            .with_context(|| format!("Corrupt document-store row for {}", isbn))?;
        Ok(Some(record))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn bulk_insert(&self, records: &[Record]) -> Result<usize> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for record in records {
            let thumbnail: String = record.thumbnail.clone().into();
            sqlx::query(
                "INSERT INTO books (isbn_13, title, author, description, category, format, \
                 length, rating, published_year, thumbnail, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(record.isbn.as_str())
            .bind(&record.title)
            .bind(&record.author)
            .bind(&record.description)
            .bind(record.category.as_str())
            .bind(record.format.as_str())
            .bind(record.length.as_str())
            .bind(record.rating.map(f64::from))
            .bind(record.published_year)
            .bind(thumbnail)
            .bind(now)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert isbn_13 {}", record.isbn))?;
        }

        tx.commit().await?;
        Ok(records.len())
    }

    async fn bulk_delete(&self, criteria: &DeleteCriteria) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        let removed = match criteria {
            DeleteCriteria::All => sqlx::query("DELETE FROM books")
                .execute(&mut *tx)
                .await?
                .rows_affected(),
            DeleteCriteria::Isbns(isbns) => {
                let mut removed = 0;
                for isbn in isbns {
                    removed += sqlx::query("DELETE FROM books WHERE isbn_13 = ?")
                        .bind(isbn.as_str())
                        .execute(&mut *tx)
                        .await?
                        .rows_affected();
                }
                removed
            }
        };

        tx.commit().await?;
        Ok(removed as usize)
    }
}
