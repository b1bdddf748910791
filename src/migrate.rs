use anyhow::Result;
use sqlx::SqlitePool;

/// Create the document-store schema. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS books (
            isbn_13 TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            author TEXT NOT NULL,
            description TEXT NOT NULL,
            category TEXT NOT NULL,
            format TEXT NOT NULL,
            length TEXT NOT NULL,
            rating REAL,
            published_year INTEGER NOT NULL,
            thumbnail TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_books_category ON books(category)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_books_published_year ON books(published_year)")
        .execute(pool)
        .await?;

    Ok(())
}
