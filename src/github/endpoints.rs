//! GitHub API endpoint functions.
//!
//! Provides typed methods for the REST endpoints the aggregation consumes.

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::StatusCode;

use super::client::{Fetch, GitHubClient, NO_PARAMS};
use super::try_fetch;
use super::types::{
    CommitItem, ContentEntry, Owner, Repository, SearchResponse, UserProfile, WeekActivity,
};

/// Page size for every listing endpoint.
pub const PER_PAGE: u32 = 100;

impl GitHubClient {
    /// Members visible to the configured token (private membership included).
    pub async fn get_org_members(&self, org: &str) -> Fetch<Vec<Owner>> {
        let params = [("per_page", PER_PAGE.to_string())];
        self.get_json(&format!("/orgs/{}/members", org), &params)
            .await
    }

    /// Publicly visible members of an organization.
    pub async fn get_org_public_members(&self, org: &str) -> Fetch<Vec<Owner>> {
        let params = [("per_page", PER_PAGE.to_string())];
        self.get_json(&format!("/orgs/{}/public_members", org), &params)
            .await
    }

    /// Public profile of a user.
    pub async fn get_user(&self, login: &str) -> Fetch<UserProfile> {
        self.get_json(&format!("/users/{}", login), NO_PARAMS).await
    }

    /// Repositories of an organization, up to `max_pages` pages.
    pub async fn get_org_repos(&self, org: &str, max_pages: u32) -> Fetch<Vec<Repository>> {
        self.list_repos(&format!("/orgs/{}/repos", org), "public", max_pages)
            .await
    }

    /// Repositories owned by a user account, up to `max_pages` pages.
    pub async fn get_user_repos(&self, login: &str, max_pages: u32) -> Fetch<Vec<Repository>> {
        self.list_repos(&format!("/users/{}/repos", login), "owner", max_pages)
            .await
    }

    /// Repository search; `query` uses GitHub search qualifiers.
    pub async fn search_repos(&self, query: &str) -> Fetch<SearchResponse> {
        let params = [("q", query.to_string()), ("per_page", PER_PAGE.to_string())];
        self.get_json("/search/repositories", &params).await
    }

    /// Get a specific repository.
    pub async fn get_repo(&self, owner: &str, repo: &str) -> Fetch<Repository> {
        self.get_json(&format!("/repos/{}/{}", owner, repo), NO_PARAMS)
            .await
    }

    /// Weekly commit activity for the last year.
    ///
    /// 202 maps to `Computing`; 204 and non-array bodies are an empty confirmed series.
    pub async fn get_commit_activity(&self, owner: &str, repo: &str) -> Fetch<Vec<WeekActivity>> {
        let response = try_fetch!(
            self.get(
                &format!("/repos/{}/{}/stats/commit_activity", owner, repo),
                NO_PARAMS
            )
            .await
        );

        match response.status() {
            StatusCode::ACCEPTED => Fetch::Computing,
            StatusCode::NO_CONTENT => Fetch::Ok(Vec::new()),
            _ => match response.json::<serde_json::Value>().await {
                Ok(value @ serde_json::Value::Array(_)) => match serde_json::from_value(value) {
                    Ok(weeks) => Fetch::Ok(weeks),
                    Err(e) => Fetch::Failed(e.into()),
                },
                Ok(_) => Fetch::Ok(Vec::new()),
                Err(e) => Fetch::Failed(e.into()),
            },
        }
    }

    /// One page of commits authored since `since`.
    pub async fn get_commits_since(
        &self,
        owner: &str,
        repo: &str,
        since: DateTime<Utc>,
        page: u32,
    ) -> Fetch<(Vec<CommitItem>, bool)> {
        let params = [
            ("since", since.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("per_page", PER_PAGE.to_string()),
            ("page", page.to_string()),
        ];
        self.get_page(&format!("/repos/{}/{}/commits", owner, repo), &params)
            .await
    }

    /// Most recent commit touching a single path.
    pub async fn get_latest_path_commit(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
    ) -> Fetch<Option<CommitItem>> {
        let params = [("path", path), ("per_page", "1")];
        self.get_json::<Vec<CommitItem>, _>(&format!("/repos/{}/{}/commits", owner, repo), &params)
            .await
            .map(|commits| commits.into_iter().next())
    }

    /// Directory listing of a repository path.
    pub async fn get_contents(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
    ) -> Fetch<Vec<ContentEntry>> {
        self.get_json(
            &format!("/repos/{}/{}/contents/{}", owner, repo, path.trim_matches('/')),
            NO_PARAMS,
        )
        .await
    }

    /// Raw body of a file in a repository.
    pub async fn get_file(&self, owner: &str, repo: &str, path: &str) -> Fetch<String> {
        self.get_raw(&format!(
            "/repos/{}/{}/contents/{}",
            owner,
            repo,
            path.trim_matches('/')
        ))
        .await
    }

    /// Page through a repository listing. A failure on the first page is returned as-is;
    /// later failures keep what was collected so far.
    async fn list_repos(&self, endpoint: &str, kind: &str, max_pages: u32) -> Fetch<Vec<Repository>> {
        let mut repos = Vec::new();

        for page in 1..=max_pages.max(1) {
            let params = [
                ("type", kind.to_string()),
                ("sort", "updated".to_string()),
                ("per_page", PER_PAGE.to_string()),
                ("page", page.to_string()),
            ];

            match self.get_page::<Vec<Repository>, _>(endpoint, &params).await {
                Fetch::Ok((batch, has_next)) => {
                    let done = batch.is_empty() || !has_next;
                    repos.extend(batch);
                    if done {
                        break;
                    }
                }
                other if page == 1 => return other.map(|(batch, _)| batch),
                other => {
                    other.ok_or_log(&format!("{} page {}", endpoint, page));
                    break;
                }
            }
        }

        Fetch::Ok(repos)
    }
}
