//! GitHub API response types.
//!
//! Only the fields the aggregation reads are declared; everything is optional where the
//! API is known to omit or null it.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::models::{MemberDetails, OrgMember, RepoSummary};

use super::url::normalize_repo_url;

/// User or organization reference embedded in other objects.
#[derive(Debug, Clone, Deserialize)]
pub struct Owner {
    pub login: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
}

impl From<Owner> for OrgMember {
    fn from(owner: Owner) -> Self {
        Self {
            login: owner.login,
            avatar_url: owner.avatar_url,
            html_url: owner.html_url,
        }
    }
}

/// Public user profile.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub blog: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub followers: u64,
    #[serde(default)]
    pub public_repos: u64,
}

impl UserProfile {
    /// Preferred homepage link: the profile's blog field, else the GitHub profile page.
    pub fn website(&self) -> Option<String> {
        non_empty(self.blog.as_deref())
            .map(with_scheme)
            .or_else(|| non_empty(self.html_url.as_deref()).map(str::to_string))
    }

    pub fn into_details(self, total_stars: u64) -> MemberDetails {
        MemberDetails {
            name: self.name,
            bio: self.bio,
            avatar_url: self.avatar_url,
            html_url: self.html_url,
            blog: self.blog.filter(|b| !b.trim().is_empty()),
            company: self.company,
            location: self.location,
            followers: self.followers,
            public_repos: self.public_repos,
            total_stars,
        }
    }
}

/// Repository as returned by listing, search and detail endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub name: String,
    pub html_url: String,
    #[serde(default)]
    pub owner: Option<Owner>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub forks_count: u64,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Repository {
    /// Convert to the website model; `None` if the URL does not normalize.
    pub fn into_summary(self) -> Option<RepoSummary> {
        let url = normalize_repo_url(&self.html_url)?;
        Some(RepoSummary {
            name: self.name,
            url,
            owner: self.owner.map(|o| o.login),
            description: self.description.filter(|d| !d.trim().is_empty()),
            topics: self.topics,
            language: self.language,
            homepage: self.homepage.filter(|h| !h.trim().is_empty()),
            stars: self.stargazers_count,
            forks: self.forks_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
            is_fallback: false,
        })
    }
}

/// `GET /search/repositories` envelope.
#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub items: Vec<Repository>,
}

/// One week of the commit-activity statistic.
#[derive(Debug, Clone, Deserialize)]
pub struct WeekActivity {
    /// Commits per day, Sunday first
    #[serde(default)]
    pub days: Vec<u32>,
    /// Unix seconds of the week start
    #[serde(default)]
    pub week: i64,
}

/// Entry from the commit listing.
#[derive(Debug, Clone, Deserialize)]
pub struct CommitItem {
    pub commit: CommitDetail,
    #[serde(default)]
    pub author: Option<Owner>,
}

impl CommitItem {
    /// Author date, falling back to committer date.
    pub fn authored_at(&self) -> Option<DateTime<Utc>> {
        self.commit
            .author
            .as_ref()
            .and_then(|a| a.date)
            .or_else(|| self.commit.committer.as_ref().and_then(|c| c.date))
    }

    /// GitHub login when the commit is linked to an account, else the git author name.
    pub fn author_name(&self) -> Option<String> {
        self.author
            .as_ref()
            .map(|a| a.login.clone())
            .or_else(|| self.commit.author.as_ref().and_then(|a| a.name.clone()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitDetail {
    #[serde(default)]
    pub author: Option<GitSignature>,
    #[serde(default)]
    pub committer: Option<GitSignature>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitSignature {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

/// Entry from the repository contents listing.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentEntry {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl ContentEntry {
    pub fn is_markdown(&self) -> bool {
        self.kind == "file" && self.name.to_ascii_lowercase().ends_with(".md")
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

fn with_scheme(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}
