//! Persisted store operations.
//!
//! Reaction updates run inside a transaction so the read-modify-write of the
//! `reactions` column happens on one connection.

use std::collections::HashMap;

use sqlx::SqlitePool;

use super::rows::{
    activity_from_row, blog_from_row, cache_from_row, reactions_from_row, rfc3339_to_millis,
    CacheRow,
};
use crate::activity::ActivityCacheEntry;
use crate::errors::AppError;
use crate::models::{BlogEntry, CachedPayload, ReactionState};

/// Cache row key for an organization's payload.
pub fn cache_key(org: &str) -> String {
    format!("github:{}", org.to_lowercase())
}

/// SQLite-backed store for all persisted state.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), AppError> {
        super::ensure_schema(&self.pool).await?;
        Ok(())
    }

    // ==================== PAYLOAD CACHE ====================

    pub async fn load_cache(&self, key: &str) -> Result<Option<CacheRow>, AppError> {
        let row = sqlx::query(
            "SELECT payload, updated_at, rate_limited_until FROM github_cache WHERE cache_key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(cache_from_row))
    }

    /// Replace the cached payload, keeping the stored cooldown.
    pub async fn save_cache(
        &self,
        key: &str,
        payload: &CachedPayload,
        now_ms: i64,
    ) -> Result<(), AppError> {
        let json = serde_json::to_string(payload)?;

        sqlx::query(
            r#"
            INSERT INTO github_cache (cache_key, payload, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(cache_key) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(&json)
        .bind(now_ms)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Persist a cooldown deadline. The stored value never decreases.
    pub async fn save_rate_limit_until(&self, key: &str, until: i64) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO github_cache (cache_key, payload, updated_at, rate_limited_until)
            VALUES (?, NULL, 0, ?)
            ON CONFLICT(cache_key) DO UPDATE SET
                rate_limited_until = MAX(github_cache.rate_limited_until, excluded.rate_limited_until)
            "#,
        )
        .bind(key)
        .bind(until)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ==================== ACTIVITY CACHE ====================

    pub async fn load_activity(&self) -> Result<HashMap<String, ActivityCacheEntry>, AppError> {
        let rows = sqlx::query("SELECT repo_url, activity, updated_at FROM repo_activity")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .filter_map(activity_from_row)
            .map(|entry| (entry.repo_url.clone(), entry))
            .collect())
    }

    pub async fn save_activity(&self, entry: &ActivityCacheEntry) -> Result<(), AppError> {
        let json = serde_json::to_string(&entry.activity)?;

        sqlx::query(
            r#"
            INSERT INTO repo_activity (repo_url, activity, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(repo_url) DO UPDATE SET
                activity = excluded.activity,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&entry.repo_url)
        .bind(&json)
        .bind(entry.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ==================== BLOG POSTS ====================

    /// All persisted posts, newest first.
    pub async fn list_blog_posts(&self) -> Result<Vec<BlogEntry>, AppError> {
        let rows = sqlx::query(
            "SELECT slug, title, description, content, author, author_url, created_at, modified_at, reactions FROM blog_posts ORDER BY created_at DESC, slug"
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().filter_map(blog_from_row).collect())
    }

    /// Insert a post unless its slug is already taken. Returns whether a row was written.
    pub async fn insert_blog_post_if_absent(&self, post: &BlogEntry) -> Result<bool, AppError> {
        let created_at = rfc3339_to_millis(&post.created_at).unwrap_or(0);
        let modified_at = rfc3339_to_millis(&post.modified_at).unwrap_or(created_at);

        let result = sqlx::query(
            r#"
            INSERT INTO blog_posts (slug, title, description, content, author, author_url, created_at, modified_at, reactions)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL)
            ON CONFLICT(slug) DO NOTHING
            "#,
        )
        .bind(&post.slug)
        .bind(&post.title)
        .bind(&post.description)
        .bind(&post.content)
        .bind(&post.author)
        .bind(&post.author_url)
        .bind(created_at)
        .bind(modified_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Fill in a post's author link unless one is already stored.
    pub async fn set_blog_author_url(&self, slug: &str, author_url: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE blog_posts SET author_url = ? WHERE slug = ? AND author_url IS NULL")
            .bind(author_url)
            .bind(slug)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Reaction state of a post; `None` if the post does not exist.
    pub async fn get_reactions(&self, slug: &str) -> Result<Option<ReactionState>, AppError> {
        let row = sqlx::query("SELECT reactions FROM blog_posts WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(reactions_from_row))
    }

    /// Read, modify and write a post's reaction state in one transaction.
    ///
    /// `update` returns whether the state changed; unchanged state is not written back.
    /// Returns `None` if the post does not exist.
    pub async fn update_reactions<R>(
        &self,
        slug: &str,
        update: impl FnOnce(&mut ReactionState) -> (R, bool),
    ) -> Result<Option<(R, ReactionState)>, AppError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT reactions FROM blog_posts WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut state = reactions_from_row(&row);
        let (result, changed) = update(&mut state);

        if changed {
            let json = serde_json::to_string(&state)?;
            sqlx::query("UPDATE blog_posts SET reactions = ? WHERE slug = ?")
                .bind(&json)
                .bind(slug)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(Some((result, state)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use crate::models::{ActorReaction, GithubStats};
    use tempfile::TempDir;

    async fn store() -> (Store, TempDir) {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("test.sqlite")).await.unwrap();
        (Store::new(pool), dir)
    }

    fn post(slug: &str, created_at: &str) -> BlogEntry {
        BlogEntry {
            slug: slug.to_string(),
            title: format!("Post {}", slug),
            created_at: created_at.to_string(),
            modified_at: created_at.to_string(),
            ..BlogEntry::default()
        }
    }

    #[tokio::test]
    async fn test_cache_round_trip_keeps_cooldown() {
        let (store, _dir) = store().await;
        let key = cache_key("Acme");
        assert!(store.load_cache(&key).await.unwrap().is_none());

        store.save_rate_limit_until(&key, 9_000).await.unwrap();
        let payload = CachedPayload {
            github_stats: GithubStats {
                stars: 3,
                ..GithubStats::default()
            },
            ..CachedPayload::default()
        };
        store.save_cache(&key, &payload, 1_000).await.unwrap();

        let row = store.load_cache(&key).await.unwrap().unwrap();
        assert_eq!(row.payload, Some(payload));
        assert_eq!(row.updated_at, 1_000);
        assert_eq!(row.rate_limited_until, 9_000);
    }

    #[tokio::test]
    async fn test_persisted_cooldown_is_monotonic() {
        let (store, _dir) = store().await;
        let key = cache_key("acme");

        store.save_rate_limit_until(&key, 5_000).await.unwrap();
        store.save_rate_limit_until(&key, 2_000).await.unwrap();

        let row = store.load_cache(&key).await.unwrap().unwrap();
        assert_eq!(row.rate_limited_until, 5_000);
        assert!(row.payload.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_payload_reads_as_absent() {
        let (store, _dir) = store().await;
        sqlx::query("INSERT INTO github_cache (cache_key, payload, updated_at) VALUES ('k', '{oops', 5)")
            .execute(&store.pool)
            .await
            .unwrap();

        let row = store.load_cache("k").await.unwrap().unwrap();
        assert!(row.payload.is_none());
        assert_eq!(row.updated_at, 5);
    }

    #[tokio::test]
    async fn test_activity_upsert() {
        let (store, _dir) = store().await;
        let mut entry = ActivityCacheEntry {
            repo_url: "https://github.com/a/b".into(),
            activity: vec![1, 2],
            timestamp: 10,
        };
        store.save_activity(&entry).await.unwrap();
        entry.activity = vec![];
        entry.timestamp = 20;
        store.save_activity(&entry).await.unwrap();

        let loaded = store.load_activity().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["https://github.com/a/b"], entry);
    }

    #[tokio::test]
    async fn test_blog_insert_never_overwrites() {
        let (store, _dir) = store().await;

        let first = post("hello", "2024-01-01T00:00:00.000Z");
        assert!(store.insert_blog_post_if_absent(&first).await.unwrap());

        let mut second = post("hello", "2024-02-01T00:00:00.000Z");
        second.title = "Replacement".into();
        assert!(!store.insert_blog_post_if_absent(&second).await.unwrap());

        store
            .insert_blog_post_if_absent(&post("newer", "2024-03-01T00:00:00.000Z"))
            .await
            .unwrap();

        let posts = store.list_blog_posts().await.unwrap();
        let slugs: Vec<_> = posts.iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(slugs, vec!["newer", "hello"]);
        assert_eq!(posts[1].title, "Post hello");
        assert_eq!(posts[1].created_at, "2024-01-01T00:00:00.000Z");
    }

    #[tokio::test]
    async fn test_update_reactions() {
        let (store, _dir) = store().await;
        store
            .insert_blog_post_if_absent(&post("hello", "2024-01-01T00:00:00.000Z"))
            .await
            .unwrap();

        assert!(store
            .update_reactions("missing", |_| ((), true))
            .await
            .unwrap()
            .is_none());

        store
            .update_reactions("hello", |state| {
                state.counts.insert("🎉".into(), 1);
                state.actors.insert(
                    "actor".into(),
                    ActorReaction {
                        emoji: "🎉".into(),
                        at: 1,
                    },
                );
                ((), true)
            })
            .await
            .unwrap();

        let state = store.get_reactions("hello").await.unwrap().unwrap();
        assert_eq!(state.counts.get("🎉"), Some(&1));
        assert_eq!(state.actors["actor"].emoji, "🎉");

        let posts = store.list_blog_posts().await.unwrap();
        assert_eq!(posts[0].reactions.get("🎉"), Some(&1));
    }
}
