//! Row conversion helpers.
//!
//! Columns are read leniently: older rows may hold NULLs, text timestamps or JSON that no
//! longer parses, and all of those degrade to defaults instead of failing the query.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::de::DeserializeOwned;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::activity::ActivityCacheEntry;
use crate::models::{BlogEntry, CachedPayload, ReactionState};

/// The persisted payload cache row.
#[derive(Debug, Clone, Default)]
pub struct CacheRow {
    pub payload: Option<CachedPayload>,
    /// Unix milliseconds
    pub updated_at: i64,
    /// Unix milliseconds
    pub rate_limited_until: i64,
}

pub(crate) fn cache_from_row(row: &SqliteRow) -> CacheRow {
    let payload: Option<String> = row.try_get("payload").ok().flatten();
    CacheRow {
        payload: payload.as_deref().and_then(parse_json),
        updated_at: millis(row, "updated_at"),
        rate_limited_until: millis(row, "rate_limited_until"),
    }
}

pub(crate) fn activity_from_row(row: &SqliteRow) -> Option<ActivityCacheEntry> {
    let repo_url: String = row.try_get("repo_url").ok()?;
    let activity: Option<String> = row.try_get("activity").ok().flatten();
    Some(ActivityCacheEntry {
        repo_url,
        activity: activity.as_deref().and_then(parse_json).unwrap_or_default(),
        timestamp: millis(row, "updated_at"),
    })
}

pub(crate) fn blog_from_row(row: &SqliteRow) -> Option<BlogEntry> {
    let slug: String = row.try_get("slug").ok()?;
    let text = |column: &str| -> Option<String> { row.try_get(column).ok().flatten() };

    Some(BlogEntry {
        title: text("title").unwrap_or_else(|| slug.clone()),
        description: text("description").unwrap_or_default(),
        content: text("content").unwrap_or_default(),
        author: text("author").filter(|a| !a.trim().is_empty()),
        author_url: text("author_url").filter(|a| !a.trim().is_empty()),
        created_at: timestamp(row, "created_at"),
        modified_at: timestamp(row, "modified_at"),
        reactions: reactions_from_row(row).counts,
        slug,
    })
}

pub(crate) fn reactions_from_row(row: &SqliteRow) -> ReactionState {
    let raw: Option<String> = row.try_get("reactions").ok().flatten();
    raw.as_deref().and_then(parse_json).unwrap_or_default()
}

/// Integer column in Unix milliseconds; NULL or garbage reads as zero.
fn millis(row: &SqliteRow, column: &str) -> i64 {
    row.try_get::<Option<i64>, _>(column)
        .ok()
        .flatten()
        .unwrap_or(0)
}

/// Timestamp column as RFC 3339, whether it was stored as milliseconds or text.
fn timestamp(row: &SqliteRow, column: &str) -> String {
    if let Ok(Some(ms)) = row.try_get::<Option<i64>, _>(column) {
        return millis_to_rfc3339(ms);
    }
    row.try_get::<Option<String>, _>(column)
        .ok()
        .flatten()
        .and_then(|s| rfc3339_to_millis(&s))
        .map(millis_to_rfc3339)
        .unwrap_or_else(|| millis_to_rfc3339(0))
}

pub fn millis_to_rfc3339(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn rfc3339_to_millis(s: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

fn parse_json<T: DeserializeOwned>(s: &str) -> Option<T> {
    match serde_json::from_str(s) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Ignoring unparseable stored JSON: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_conversions() {
        assert_eq!(millis_to_rfc3339(0), "1970-01-01T00:00:00.000Z");
        assert_eq!(
            rfc3339_to_millis("2024-01-02T03:04:05Z"),
            Some(1_704_164_645_000)
        );
        assert_eq!(rfc3339_to_millis("yesterday"), None);
    }
}
