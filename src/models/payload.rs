//! The response envelope served to the website and stored as the cache blob.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{BlogEntry, RepoStats, RepoSummary};

/// Organization-wide totals, recomputed over the deduplicated repository union.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GithubStats {
    pub stars: u64,
    pub forks: u64,
    pub contributors: u64,
    pub repositories: u64,
}

/// An organization member as returned by the members listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgMember {
    pub login: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_url: Option<String>,
}

/// Profile details for a member, enriched with their public star total.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blog: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub followers: u64,
    #[serde(default)]
    pub public_repos: u64,
    #[serde(default)]
    pub total_stars: u64,
}

/// Project repositories owned by one member.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRepos {
    pub login: String,
    pub repos: Vec<RepoSummary>,
}

/// Full payload returned by `GET /api/github`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedPayload {
    #[serde(default)]
    pub github_stats: GithubStats,
    /// Keyed by canonical repository URL
    #[serde(default)]
    pub repo_stats: BTreeMap<String, RepoStats>,
    #[serde(default)]
    pub org_repos: Vec<RepoSummary>,
    #[serde(default)]
    pub member_repos: Vec<MemberRepos>,
    #[serde(default)]
    pub org_members: Vec<OrgMember>,
    /// Keyed by member login
    #[serde(default)]
    pub member_details: BTreeMap<String, MemberDetails>,
    #[serde(default)]
    pub blog_posts: Vec<BlogEntry>,
}
