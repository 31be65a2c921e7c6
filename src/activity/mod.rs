//! Per-repository daily commit activity.
//!
//! The weekly statistics endpoint is preferred but is generated lazily upstream and may
//! answer 202 for a while. When it never settles we reuse a previously cached series, and
//! only when there is none do we page through recent commits and bucket them by day.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use futures::stream::{self, StreamExt};

use crate::db::Store;
use crate::github::{split_repo_url, Fetch, GitHubClient, WeekActivity};
use crate::retry::RetryPolicy;

/// Trailing window kept from the weekly statistics endpoint.
pub const PRIMARY_WINDOW_DAYS: usize = 364;
/// Window reconstructed from the commit listing.
pub const SECONDARY_WINDOW_DAYS: usize = 60;
pub const SECONDARY_MAX_PAGES: u32 = 5;

const HOUR_MS: i64 = 60 * 60 * 1000;
const NON_EMPTY_TTL_MS: i64 = 24 * HOUR_MS;
const EMPTY_TTL_MS: i64 = 15 * 60 * 1000;
const HARD_MAX_AGE_MS: i64 = 48 * HOUR_MS;

const FETCH_CONCURRENCY: usize = 6;

/// Persisted activity series for one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityCacheEntry {
    pub repo_url: String,
    /// Daily commit counts, newest last
    pub activity: Vec<u32>,
    /// Unix milliseconds
    pub timestamp: i64,
}

impl ActivityCacheEntry {
    /// Fresh for 24h with data, 15min when empty, never beyond two days.
    pub fn is_fresh(&self, now_ms: i64) -> bool {
        if self.timestamp > now_ms {
            return false;
        }
        let age = now_ms - self.timestamp;
        let ttl = if self.activity.is_empty() {
            EMPTY_TTL_MS
        } else {
            NON_EMPTY_TTL_MS
        };
        age < ttl && age < HARD_MAX_AGE_MS
    }
}

/// Where a repository's series came from in this pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityOutcome {
    /// Cached entry was still fresh
    Fresh(Vec<u32>),
    /// Upstream gave a definitive answer; persist it
    Fetched(Vec<u32>),
    /// Upstream did not settle; stale cached series reused as-is
    Stale(Vec<u32>),
    Unavailable,
}

impl ActivityOutcome {
    pub fn into_series(self) -> Option<Vec<u32>> {
        match self {
            ActivityOutcome::Fresh(series)
            | ActivityOutcome::Fetched(series)
            | ActivityOutcome::Stale(series) => Some(series),
            ActivityOutcome::Unavailable => None,
        }
    }
}

/// Resolves activity series for repositories using one pass's client.
pub struct ActivityFetcher<'a> {
    client: &'a GitHubClient,
    policy: RetryPolicy,
}

impl<'a> ActivityFetcher<'a> {
    pub fn new(client: &'a GitHubClient, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// Resolve activity for every URL, persisting newly fetched series.
    ///
    /// The activity cache is read once; store failures only cost the cache.
    pub async fn collect(
        &self,
        store: &Store,
        urls: &[String],
        now: DateTime<Utc>,
    ) -> BTreeMap<String, Option<Vec<u32>>> {
        let cached = match store.load_activity().await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Failed to load activity cache: {}", e);
                HashMap::new()
            }
        };

        let outcomes: Vec<(String, ActivityOutcome)> = stream::iter(urls)
            .map(|url| {
                let cached = cached.get(url);
                async move { (url.clone(), self.resolve(url, cached, now).await) }
            })
            .buffered(FETCH_CONCURRENCY)
            .boxed()
            .collect()
            .await;

        let now_ms = now.timestamp_millis();
        let mut series = BTreeMap::new();
        for (url, outcome) in outcomes {
            if let ActivityOutcome::Fetched(activity) = &outcome {
                let entry = ActivityCacheEntry {
                    repo_url: url.clone(),
                    activity: activity.clone(),
                    timestamp: now_ms,
                };
                if let Err(e) = store.save_activity(&entry).await {
                    tracing::warn!("Failed to persist activity for {}: {}", url, e);
                }
            }
            series.insert(url, outcome.into_series());
        }
        series
    }

    /// Resolve one repository's series.
    pub async fn resolve(
        &self,
        url: &str,
        cached: Option<&ActivityCacheEntry>,
        now: DateTime<Utc>,
    ) -> ActivityOutcome {
        if let Some(entry) = cached.filter(|e| e.is_fresh(now.timestamp_millis())) {
            return ActivityOutcome::Fresh(entry.activity.clone());
        }

        let Some((owner, repo)) = split_repo_url(url) else {
            tracing::warn!("Cannot fetch activity for malformed repo URL {}", url);
            return ActivityOutcome::Unavailable;
        };

        let primary = self
            .policy
            .run(
                || self.client.get_commit_activity(owner, repo),
                |fetch| matches!(fetch, Fetch::Computing),
            )
            .await;

        let rate_limited = match primary {
            Fetch::Ok(weeks) => return ActivityOutcome::Fetched(flatten_weeks(&weeks)),
            Fetch::RateLimited => true,
            other => {
                other.ok_or_log(&format!("commit activity for {}", url));
                false
            }
        };

        if let Some(entry) = cached.filter(|e| !e.activity.is_empty()) {
            tracing::debug!("Reusing cached activity for {}", url);
            return ActivityOutcome::Stale(entry.activity.clone());
        }

        // Paging commits while throttled would only burn more quota
        if rate_limited {
            return ActivityOutcome::Unavailable;
        }

        match self.recent_commit_days(owner, repo, now).await {
            Some(series) => ActivityOutcome::Fetched(series),
            None => ActivityOutcome::Unavailable,
        }
    }

    /// Daily counts for the secondary window from the commit listing.
    async fn recent_commit_days(
        &self,
        owner: &str,
        repo: &str,
        now: DateTime<Utc>,
    ) -> Option<Vec<u32>> {
        let since = now - Duration::days(SECONDARY_WINDOW_DAYS as i64);
        let mut dates = Vec::new();

        for page in 1..=SECONDARY_MAX_PAGES {
            let (commits, has_next) = self
                .client
                .get_commits_since(owner, repo, since, page)
                .await
                .ok_or_log(&format!("commits page {} for {}/{}", page, owner, repo))?;

            let short = commits.len() < crate::github::endpoints::PER_PAGE as usize;
            dates.extend(commits.iter().filter_map(|c| c.authored_at()));

            if commits.is_empty() || short || !has_next {
                break;
            }
        }

        Some(bucket_by_day(&dates, now.date_naive()))
    }
}

/// Flatten weekly buckets into days, keeping the trailing window.
pub fn flatten_weeks(weeks: &[WeekActivity]) -> Vec<u32> {
    let mut ordered: Vec<&WeekActivity> = weeks.iter().collect();
    ordered.sort_by_key(|w| w.week);

    let days: Vec<u32> = ordered
        .into_iter()
        .flat_map(|w| w.days.iter().copied())
        .collect();
    let skip = days.len().saturating_sub(PRIMARY_WINDOW_DAYS);
    days[skip..].to_vec()
}

/// Count commits per UTC day into a dense window ending today.
pub fn bucket_by_day(dates: &[DateTime<Utc>], today: NaiveDate) -> Vec<u32> {
    let mut buckets = vec![0u32; SECONDARY_WINDOW_DAYS];

    for date in dates {
        let age = (today - date.date_naive()).num_days();
        if (0..SECONDARY_WINDOW_DAYS as i64).contains(&age) {
            buckets[SECONDARY_WINDOW_DAYS - 1 - age as usize] += 1;
        }
    }

    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use reqwest::Client;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const URL: &str = "https://github.com/acme/widget";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn entry(activity: Vec<u32>, timestamp: i64) -> ActivityCacheEntry {
        ActivityCacheEntry {
            repo_url: URL.to_string(),
            activity,
            timestamp,
        }
    }

    fn instant_policy() -> RetryPolicy {
        RetryPolicy::fixed(3, std::time::Duration::ZERO)
    }

    fn commit(date: &str) -> serde_json::Value {
        json!({ "sha": "x", "commit": { "author": { "name": "a", "date": date } } })
    }

    #[test]
    fn test_freshness_thresholds() {
        let now = 10 * 24 * HOUR_MS;

        assert!(entry(vec![1], now - 23 * HOUR_MS).is_fresh(now));
        assert!(!entry(vec![1], now - 25 * HOUR_MS).is_fresh(now));
        assert!(entry(vec![], now - 10 * 60 * 1000).is_fresh(now));
        assert!(!entry(vec![], now - 16 * 60 * 1000).is_fresh(now));
        assert!(!entry(vec![1], now + 1).is_fresh(now));
    }

    #[test]
    fn test_flatten_keeps_trailing_window() {
        let weeks: Vec<WeekActivity> = (0..53)
            .map(|i| WeekActivity {
                days: vec![i; 7],
                week: i as i64 * 604_800,
            })
            .rev()
            .collect();

        let days = flatten_weeks(&weeks);
        assert_eq!(days.len(), PRIMARY_WINDOW_DAYS);
        assert_eq!(days.last(), Some(&52));
        assert_eq!(days.first(), Some(&1));
    }

    #[test]
    fn test_bucket_by_day() {
        let today = now().date_naive();
        let dates = vec![
            now(),
            now() - Duration::hours(1),
            now() - Duration::days(1),
            now() - Duration::days(59),
            now() - Duration::days(60),
            now() + Duration::days(1),
        ];

        let buckets = bucket_by_day(&dates, today);
        assert_eq!(buckets.len(), SECONDARY_WINDOW_DAYS);
        assert_eq!(buckets[59], 2);
        assert_eq!(buckets[58], 1);
        assert_eq!(buckets[0], 1);
        assert_eq!(buckets.iter().sum::<u32>(), 4);
    }

    #[tokio::test]
    async fn test_fresh_cache_skips_upstream() {
        let server = MockServer::start().await;
        let client = GitHubClient::new(Client::new(), server.uri());
        let fetcher = ActivityFetcher::new(&client, instant_policy());

        let cached = entry(vec![3, 4], now().timestamp_millis() - HOUR_MS);
        let outcome = fetcher.resolve(URL, Some(&cached), now()).await;

        assert_eq!(outcome, ActivityOutcome::Fresh(vec![3, 4]));
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_computing_falls_back_to_stale_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget/stats/commit_activity"))
            .respond_with(ResponseTemplate::new(202))
            .expect(3)
            .mount(&server)
            .await;

        let client = GitHubClient::new(Client::new(), server.uri());
        let fetcher = ActivityFetcher::new(&client, instant_policy());

        let cached = entry(vec![9], now().timestamp_millis() - 30 * HOUR_MS);
        let outcome = fetcher.resolve(URL, Some(&cached), now()).await;

        assert_eq!(outcome, ActivityOutcome::Stale(vec![9]));
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test]
    async fn test_computing_without_cache_uses_commit_listing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget/stats/commit_activity"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget/commits"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                commit("2024-06-15T08:00:00Z"),
                commit("2024-06-14T08:00:00Z"),
            ])))
            .mount(&server)
            .await;

        let client = GitHubClient::new(Client::new(), server.uri());
        let fetcher = ActivityFetcher::new(&client, instant_policy());

        let series = fetcher
            .resolve(URL, None, now())
            .await
            .into_series()
            .unwrap();
        assert_eq!(series.len(), SECONDARY_WINDOW_DAYS);
        assert_eq!(&series[58..], &[1, 1]);
        // three primary attempts plus a single short page
        assert_eq!(client.call_count(), 4);
    }

    #[tokio::test]
    async fn test_rate_limited_leaves_activity_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let client = GitHubClient::new(Client::new(), server.uri());
        let fetcher = ActivityFetcher::new(&client, instant_policy());

        let outcome = fetcher.resolve(URL, None, now()).await;
        assert_eq!(outcome, ActivityOutcome::Unavailable);
        assert!(client.was_rate_limited());
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_confirmation_is_fetched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget/stats/commit_activity"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = GitHubClient::new(Client::new(), server.uri());
        let fetcher = ActivityFetcher::new(&client, instant_policy());

        let outcome = fetcher.resolve(URL, None, now()).await;
        assert_eq!(outcome, ActivityOutcome::Fetched(Vec::new()));
    }
}
