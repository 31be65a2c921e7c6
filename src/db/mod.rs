//! Database module for SQLite persistence.
//!
//! Holds the payload cache, blog posts with their reactions, and the activity cache.

mod repository;
mod rows;

pub use repository::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Initialize the database connection pool and create the schema.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    ensure_schema(&pool).await?;

    Ok(pool)
}

/// Create missing tables and apply additive column changes.
///
/// Idempotent; also run at the start of every aggregation pass.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS github_cache (
            cache_key TEXT PRIMARY KEY,
            payload TEXT,
            updated_at INTEGER NOT NULL DEFAULT 0
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS blog_posts (
            slug TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            content TEXT,
            author TEXT,
            created_at INTEGER NOT NULL,
            modified_at INTEGER NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS repo_activity (
            repo_url TEXT PRIMARY KEY,
            activity TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Columns added after the first release
    add_column(pool, "github_cache", "rate_limited_until INTEGER NOT NULL DEFAULT 0").await;
    add_column(pool, "blog_posts", "author_url TEXT").await;
    add_column(pool, "blog_posts", "reactions TEXT").await;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_blog_posts_created_at ON blog_posts(created_at);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// `ALTER TABLE ... ADD COLUMN`, ignoring the failure when the column already exists.
async fn add_column(pool: &SqlitePool, table: &str, column: &str) {
    let sql = format!("ALTER TABLE {} ADD COLUMN {}", table, column);
    if let Err(e) = sqlx::query(&sql).execute(pool).await {
        tracing::debug!("Skipping migration on {}: {}", table, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let dir = tempfile::TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("nested/app.sqlite"))
            .await
            .unwrap();

        ensure_schema(&pool).await.unwrap();
        ensure_schema(&pool).await.unwrap();

        let columns: Vec<String> = sqlx::query("PRAGMA table_info(blog_posts)")
            .fetch_all(&pool)
            .await
            .unwrap()
            .iter()
            .map(|row| row.get::<String, _>("name"))
            .collect();
        assert!(columns.contains(&"author_url".to_string()));
        assert!(columns.contains(&"reactions".to_string()));
    }
}
