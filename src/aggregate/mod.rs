//! The aggregation pipeline behind `GET /api/github`.
//!
//! One pass discovers members and repositories, merges the overlapping listings by
//! canonical URL, hydrates placeholder entries, attaches commit activity and blog posts,
//! and commits the result to the memory and persisted caches. While the rate-limit
//! cooldown is active, or when nothing could be discovered upstream, the pass instead
//! serves exactly one cache tier: memory, then persisted, then the static fallback list.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};

use crate::activity::ActivityFetcher;
use crate::blog::{sort_posts, BlogMerger, BlogSource};
use crate::cache::{is_fresh, load_fallback_repos, ProcessState, CACHE_TTL_MS};
use crate::config::Config;
use crate::db::{cache_key, Store};
use crate::github::{split_repo_url, Fetch, GitHubClient, Owner};
use crate::models::{
    CachedPayload, GithubStats, MemberDetails, MemberRepos, OrgMember, RepoIndex, RepoStats,
    RepoSummary,
};
use crate::retry::RetryPolicy;

/// Pages of 100 fetched from repository listings.
pub const REPO_LIST_PAGES: u32 = 3;
/// Fallback-tagged org entries replaced by live data per pass.
pub const MAX_FALLBACK_HYDRATION: usize = 12;
/// Repositories whose missing homepage is looked up per pass.
pub const MAX_HOMEPAGE_HYDRATION: usize = 8;

const FETCH_CONCURRENCY: usize = 6;

/// A payload cached elsewhere together with when it was stored.
type Snapshot = (CachedPayload, i64);

/// One aggregation pass over shared state.
pub struct Aggregator<'a> {
    config: &'a Config,
    store: &'a Store,
    state: &'a ProcessState,
    client: GitHubClient,
    retry: RetryPolicy,
}

impl<'a> Aggregator<'a> {
    pub fn new(
        config: &'a Config,
        store: &'a Store,
        state: &'a ProcessState,
        http: reqwest::Client,
    ) -> Self {
        Self {
            config,
            store,
            state,
            client: GitHubClient::new(http, config.github_api_url.clone()),
            retry: RetryPolicy::commit_stats(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn load(&self) -> CachedPayload {
        self.load_at(Utc::now()).await
    }

    /// Run the pass as of `now`. Never fails; degraded results are still payloads.
    pub async fn load_at(&self, now: DateTime<Utc>) -> CachedPayload {
        let started = Instant::now();
        let now_ms = now.timestamp_millis();
        let key = cache_key(&self.config.github_org);

        if let Err(e) = self.store.ensure_schema().await {
            tracing::warn!("Failed to ensure schema: {}", e);
        }

        let persisted = match self.store.load_cache(&key).await {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!("Failed to read persisted cache: {}", e);
                None
            }
        };

        let mut persisted_fresh: Option<Snapshot> = None;
        if let Some(row) = persisted {
            self.state.observe_rate_limit(row.rate_limited_until).await;
            if is_fresh(row.updated_at, now_ms, CACHE_TTL_MS) {
                persisted_fresh = row.payload.map(|p| (p, row.updated_at));
            }
        }

        if self.state.is_cooling_down(now_ms).await {
            let until = self.state.rate_limited_until().await;
            tracing::info!("Rate-limit cooldown active until {}, serving cached data", until);
            return self.serve_cached_tier(persisted_fresh, now_ms).await;
        }

        if let Some(payload) = self.fresh_cache(persisted_fresh.clone(), now_ms).await {
            tracing::debug!("Serving fresh cached payload");
            return payload;
        }

        let aggregated = self.aggregate(now).await;
        let rate_limited = self.client.was_rate_limited();

        let payload = match aggregated {
            None => {
                tracing::warn!("Nothing discovered upstream, serving cached data");
                self.serve_cached_tier(persisted_fresh, now_ms).await
            }
            Some(payload) => {
                let previous = if rate_limited {
                    self.fresh_cache(persisted_fresh, now_ms).await
                } else {
                    None
                };
                match previous {
                    Some(previous) => {
                        tracing::warn!("Pass was rate limited, keeping previous cached payload");
                        previous
                    }
                    None => {
                        self.commit(&key, &payload, now_ms).await;
                        payload
                    }
                }
            }
        };

        if rate_limited {
            // The cooldown runs from the end of the pass, not its start
            let elapsed_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
            let ended_ms = now_ms.saturating_add(elapsed_ms);
            let until = self.state.trip_rate_limit(ended_ms).await;
            tracing::warn!("GitHub rate limit hit, cooling down until {}", until);
            if let Err(e) = self.store.save_rate_limit_until(&key, until).await {
                tracing::warn!("Failed to persist rate-limit cooldown: {}", e);
            }
        }

        tracing::info!(
            "Aggregation pass finished with {} upstream calls",
            self.client.call_count()
        );
        payload
    }

    /// Fresh memory payload, else fresh persisted payload (promoted to memory with its age).
    async fn fresh_cache(&self, persisted: Option<Snapshot>, now_ms: i64) -> Option<CachedPayload> {
        if let Some(payload) = self.state.fresh_payload(now_ms).await {
            return Some(payload);
        }
        let (payload, stored_at) = persisted?;
        self.state.store_payload(payload.clone(), stored_at).await;
        Some(payload)
    }

    /// Exactly one tier: memory, persisted, or the static fallback list.
    async fn serve_cached_tier(&self, persisted: Option<Snapshot>, now_ms: i64) -> CachedPayload {
        if let Some(payload) = self.fresh_cache(persisted, now_ms).await {
            return payload;
        }
        tracing::info!("Serving static fallback repository list");
        self.fallback_payload().await
    }

    async fn fallback_payload(&self) -> CachedPayload {
        let repos = load_fallback_repos(&self.config.fallback_repos_path).await;
        let mut blog_posts = self.store.list_blog_posts().await.unwrap_or_else(|e| {
            tracing::warn!("Failed to load blog posts: {}", e);
            Vec::new()
        });
        sort_posts(&mut blog_posts);

        let mut index = RepoIndex::new();
        index.merge_all(repos);
        let github_stats = totals(&index, 0);

        CachedPayload {
            github_stats,
            repo_stats: repo_stats(&index, &BTreeMap::new()),
            org_repos: index.into_vec(),
            blog_posts,
            ..CachedPayload::default()
        }
    }

    async fn commit(&self, key: &str, payload: &CachedPayload, now_ms: i64) {
        self.state.store_payload(payload.clone(), now_ms).await;
        if let Err(e) = self.store.save_cache(key, payload, now_ms).await {
            tracing::warn!("Failed to persist payload cache: {}", e);
        }
    }

    /// Full upstream aggregation; `None` when neither members nor repos were found.
    async fn aggregate(&self, now: DateTime<Utc>) -> Option<CachedPayload> {
        let org = &self.config.github_org;

        let members = self.fetch_members(org).await;
        let (org_members, member_details) = self.enrich_members(&members).await;

        let (mut org_index, live_org_repos) = self.fetch_org_repos(org).await;
        let mut member_repos = self.fetch_member_repos(&members, &org_index).await;
        promote_placeholders(&mut org_index, &member_repos);

        if members.is_empty() && live_org_repos == 0 && member_repos.is_empty() {
            return None;
        }

        self.hydrate(&mut org_index, &mut member_repos).await;

        let union = build_union(&member_repos, org_index.iter().cloned());
        let github_stats = totals(&union, org_members.len());

        let urls: Vec<String> = union.iter().map(|r| r.url.clone()).collect();
        let activity = ActivityFetcher::new(&self.client, self.retry)
            .collect(self.store, &urls, now)
            .await;

        let source = self.blog_source();
        let blog_posts = BlogMerger::new(&self.client, self.store)
            .merge(source.as_ref(), now)
            .await;

        tracing::info!(
            "Aggregated {} repositories from {} members",
            github_stats.repositories,
            github_stats.contributors
        );

        Some(CachedPayload {
            github_stats,
            repo_stats: repo_stats(&union, &activity),
            org_repos: org_index.into_vec(),
            member_repos,
            org_members,
            member_details,
            blog_posts,
        })
    }

    /// Organization members, falling back to the public membership listing.
    async fn fetch_members(&self, org: &str) -> Vec<Owner> {
        if let Some(members) = self
            .client
            .get_org_members(org)
            .await
            .ok_or_log(&format!("members of {}", org))
            .filter(|m| !m.is_empty())
        {
            return members;
        }

        self.client
            .get_org_public_members(org)
            .await
            .ok_or_log(&format!("public members of {}", org))
            .unwrap_or_default()
    }

    /// Profiles and public star totals, in member listing order.
    async fn enrich_members(
        &self,
        members: &[Owner],
    ) -> (Vec<OrgMember>, BTreeMap<String, MemberDetails>) {
        let enriched: Vec<(OrgMember, Option<MemberDetails>)> = stream::iter(members)
            .map(|member| async move {
                let login = member.login.as_str();
                let (profile, repos) = tokio::join!(
                    self.client.get_user(login),
                    self.client.get_user_repos(login, REPO_LIST_PAGES),
                );

                let total_stars = repos
                    .ok_or_log(&format!("repositories of {}", login))
                    .map(|repos| repos.iter().map(|r| r.stargazers_count).sum())
                    .unwrap_or(0);
                let details = profile
                    .ok_or_log(&format!("profile of {}", login))
                    .map(|p| p.into_details(total_stars));

                (OrgMember::from(member.clone()), details)
            })
            .buffered(FETCH_CONCURRENCY)
            .boxed()
            .collect()
            .await;

        let mut details = BTreeMap::new();
        let mut org_members = Vec::with_capacity(enriched.len());
        for (member, member_details) in enriched {
            if let Some(d) = member_details {
                details.insert(member.login.clone(), d);
            }
            org_members.push(member);
        }
        (org_members, details)
    }

    /// Org repositories plus fallback entries not seen live. Also returns the live count.
    async fn fetch_org_repos(&self, org: &str) -> (RepoIndex, usize) {
        let live = match self.client.get_org_repos(org, REPO_LIST_PAGES).await {
            Fetch::Ok(repos) => Some(repos),
            other => {
                other.ok_or_log(&format!("org repositories of {}", org));
                self.client
                    .get_user_repos(org, REPO_LIST_PAGES)
                    .await
                    .ok_or_log(&format!("user repositories of {}", org))
            }
        };

        let mut index = RepoIndex::new();
        index.merge_all(
            live.unwrap_or_default()
                .into_iter()
                .filter(|r| !r.private)
                .filter_map(|r| r.into_summary()),
        );
        let live_count = index.len();

        for repo in load_fallback_repos(&self.config.fallback_repos_path).await {
            if !index.contains(&repo.url) {
                index.merge(repo);
            }
        }

        (index, live_count)
    }

    /// Topic-tagged repositories per member, excluding live org repositories.
    async fn fetch_member_repos(&self, members: &[Owner], org_index: &RepoIndex) -> Vec<MemberRepos> {
        let topics = &self.config.project_topics;

        let per_member: Vec<MemberRepos> = stream::iter(members)
            .map(|member| async move {
                let mut index = RepoIndex::new();
                for topic in topics {
                    let query = format!("user:{} topic:{}", member.login, topic);
                    if let Some(found) = self
                        .client
                        .search_repos(&query)
                        .await
                        .ok_or_log(&format!("project search '{}'", query))
                    {
                        index.merge_all(found.items.into_iter().filter_map(|r| r.into_summary()));
                    }
                }
                MemberRepos {
                    login: member.login.clone(),
                    repos: index
                        .into_vec()
                        .into_iter()
                        .filter(|r| !org_index.get(&r.url).is_some_and(|o| !o.is_fallback))
                        .collect(),
                }
            })
            .buffered(FETCH_CONCURRENCY)
            .boxed()
            .collect()
            .await;

        per_member
            .into_iter()
            .filter(|m| !m.repos.is_empty())
            .collect()
    }

    /// Replace fallback placeholders with live data and fill in missing homepages.
    async fn hydrate(&self, org_index: &mut RepoIndex, member_repos: &mut [MemberRepos]) {
        let placeholders: Vec<String> = org_index
            .iter()
            .filter(|r| r.is_fallback)
            .take(MAX_FALLBACK_HYDRATION)
            .map(|r| r.url.clone())
            .collect();

        let live = self.fetch_details(&placeholders).await;
        let hydrated = live.len();
        for (_, summary) in live {
            org_index.merge(summary);
        }

        let missing_homepage: Vec<String> = org_index
            .iter()
            .chain(member_repos.iter().flat_map(|m| m.repos.iter()))
            .filter(|r| r.homepage.is_none() && !placeholders.contains(&r.url))
            .take(MAX_HOMEPAGE_HYDRATION)
            .map(|r| r.url.clone())
            .collect();

        let details = self.fetch_details(&missing_homepage).await;
        let homepages: HashMap<String, String> = details
            .into_iter()
            .filter_map(|(url, summary)| summary.homepage.map(|h| (url, h)))
            .collect();

        for repo in member_repos.iter_mut().flat_map(|m| m.repos.iter_mut()) {
            if let Some(homepage) = homepages.get(&repo.url) {
                repo.homepage = Some(homepage.clone());
            }
        }
        let org_updates: Vec<RepoSummary> = org_index
            .iter()
            .filter_map(|r| {
                homepages.get(&r.url).map(|h| RepoSummary {
                    homepage: Some(h.clone()),
                    ..r.clone()
                })
            })
            .collect();
        org_index.merge_all(org_updates);

        tracing::debug!(
            "Hydrated {} fallback entries and {} homepages",
            hydrated,
            homepages.len()
        );
    }

    /// Live repository details keyed by the requested URL.
    async fn fetch_details(&self, urls: &[String]) -> Vec<(String, RepoSummary)> {
        stream::iter(urls)
            .map(|url| async move {
                let (owner, repo) = split_repo_url(url)?;
                let summary = self
                    .client
                    .get_repo(owner, repo)
                    .await
                    .ok_or_log(&format!("repository {}", url))?
                    .into_summary()?;
                Some((url.clone(), summary))
            })
            .buffered(FETCH_CONCURRENCY)
            .boxed()
            .filter_map(|detail| async move { detail })
            .collect()
            .await
    }

    fn blog_source(&self) -> Option<BlogSource> {
        let repo = self.config.blog_repo.as_deref()?;
        let source = BlogSource::new(repo, &self.config.blog_path);
        if source.is_none() {
            tracing::warn!("Ignoring unrecognized blog repository {}", repo);
        }
        source
    }
}

/// Deduplicated union of member and org repositories.
///
/// Member listings are merged first and org listings last, so the org record wins
/// field-by-field wherever both describe the same URL.
pub fn build_union(
    member_repos: &[MemberRepos],
    org_repos: impl IntoIterator<Item = RepoSummary>,
) -> RepoIndex {
    let mut union = RepoIndex::new();
    for member in member_repos {
        union.merge_all(member.repos.iter().cloned());
    }
    union.merge_all(org_repos);
    union
}

/// Fill fallback placeholders from live member listings of the same repository.
///
/// Promoted entries are no longer placeholders, so hydration skips them.
pub fn promote_placeholders(org_index: &mut RepoIndex, member_repos: &[MemberRepos]) {
    let live: Vec<RepoSummary> = member_repos
        .iter()
        .flat_map(|m| m.repos.iter())
        .filter(|r| org_index.get(&r.url).is_some_and(|o| o.is_fallback))
        .cloned()
        .collect();
    org_index.merge_all(live);
}

/// Totals over the union. Replaces any earlier partial totals.
pub fn totals(union: &RepoIndex, contributors: usize) -> GithubStats {
    GithubStats {
        stars: union.iter().map(|r| r.stars).sum(),
        forks: union.iter().map(|r| r.forks).sum(),
        contributors: contributors as u64,
        repositories: union.len() as u64,
    }
}

fn repo_stats(
    union: &RepoIndex,
    activity: &BTreeMap<String, Option<Vec<u32>>>,
) -> BTreeMap<String, RepoStats> {
    union
        .iter()
        .map(|r| {
            (
                r.url.clone(),
                RepoStats {
                    stars: r.stars,
                    forks: r.forks,
                    activity: activity.get(&r.url).cloned().flatten(),
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(url: &str, stars: u64, forks: u64) -> RepoSummary {
        RepoSummary {
            name: url.rsplit('/').next().unwrap_or_default().to_string(),
            url: url.to_string(),
            stars,
            forks,
            ..RepoSummary::default()
        }
    }

    #[test]
    fn test_union_dedupes_and_org_wins() {
        let member_repos = vec![
            MemberRepos {
                login: "ada".into(),
                repos: vec![
                    repo("https://github.com/ada/tool", 5, 1),
                    repo("https://github.com/acme/site", 1, 0),
                ],
            },
            MemberRepos {
                login: "bob".into(),
                repos: vec![repo("https://github.com/ada/tool", 5, 1)],
            },
        ];
        let org = vec![repo("https://github.com/acme/site", 10, 2)];

        let union = build_union(&member_repos, org);
        assert_eq!(union.len(), 2);

        let stats = totals(&union, 2);
        assert_eq!(stats.stars, 15);
        assert_eq!(stats.forks, 3);
        assert_eq!(stats.contributors, 2);
        assert_eq!(stats.repositories, 2);
    }

    #[test]
    fn test_placeholders_do_not_shadow_member_repos() {
        let mut org_index = RepoIndex::new();
        org_index.merge(repo("https://github.com/acme/site", 10, 2));
        org_index.merge(RepoSummary::fallback("https://github.com/ada/tool", "ada", "tool"));
        let member_repos = vec![MemberRepos {
            login: "ada".into(),
            repos: vec![repo("https://github.com/ada/tool", 5, 1)],
        }];

        promote_placeholders(&mut org_index, &member_repos);
        let promoted = org_index.get("https://github.com/ada/tool").unwrap();
        assert!(!promoted.is_fallback);
        assert_eq!(promoted.stars, 5);

        let union = build_union(&member_repos, org_index.iter().cloned());
        assert_eq!(totals(&union, 1).stars, 15);

        // A placeholder merged last still loses to the live record
        let union = build_union(
            &member_repos,
            [RepoSummary::fallback("https://github.com/ada/tool", "ada", "tool")],
        );
        assert_eq!(totals(&union, 1).stars, 5);
    }

    #[test]
    fn test_repo_stats_keeps_missing_activity_absent() {
        let mut union = RepoIndex::new();
        union.merge(repo("https://github.com/a/one", 1, 0));
        union.merge(repo("https://github.com/a/two", 2, 0));
        union.merge(repo("https://github.com/a/three", 3, 0));

        let mut activity = BTreeMap::new();
        activity.insert("https://github.com/a/one".to_string(), Some(vec![1, 2]));
        activity.insert("https://github.com/a/two".to_string(), None);

        let stats = repo_stats(&union, &activity);
        assert_eq!(stats.len(), 3);
        assert_eq!(stats["https://github.com/a/one"].activity, Some(vec![1, 2]));
        assert_eq!(stats["https://github.com/a/two"].activity, None);
        assert_eq!(stats["https://github.com/a/three"].activity, None);
        assert_eq!(stats["https://github.com/a/three"].stars, 3);
    }
}
