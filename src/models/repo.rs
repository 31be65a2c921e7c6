//! Repository models shared by every repo collection in the payload.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A repository as shown on the website.
///
/// `url` is always a canonical `https://github.com/{owner}/{repo}` string and is the
/// identity used for deduplication across org, member and fallback listings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoSummary {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default)]
    pub stars: u64,
    #[serde(default)]
    pub forks: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    /// Entry came from the static fallback list and carries placeholder stats
    #[serde(default)]
    pub is_fallback: bool,
}

impl RepoSummary {
    /// Placeholder entry for a repository known only from the fallback list.
    pub fn fallback(url: &str, owner: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            owner: Some(owner.to_string()),
            is_fallback: true,
            ..Self::default()
        }
    }

    /// Overlay a more recently merged record onto this one.
    ///
    /// Optional fields from `newer` win when present; counters and the fallback flag
    /// come from `newer` unless it is a placeholder and this record is live.
    pub fn absorb(&mut self, newer: RepoSummary) {
        if newer.is_fallback && !self.is_fallback {
            return;
        }
        if !newer.name.is_empty() {
            self.name = newer.name;
        }
        self.owner = newer.owner.or(self.owner.take());
        self.description = newer.description.or(self.description.take());
        if !newer.topics.is_empty() {
            self.topics = newer.topics;
        }
        self.language = newer.language.or(self.language.take());
        self.homepage = newer.homepage.or(self.homepage.take());
        self.created_at = newer.created_at.or(self.created_at.take());
        self.updated_at = newer.updated_at.or(self.updated_at.take());
        self.stars = newer.stars;
        self.forks = newer.forks;
        self.is_fallback = newer.is_fallback;
    }
}

/// Insertion-ordered collection of repositories keyed by canonical URL.
///
/// Re-inserting a URL keeps its original position and absorbs the newer record.
#[derive(Debug, Default)]
pub struct RepoIndex {
    order: Vec<String>,
    repos: HashMap<String, RepoSummary>,
}

impl RepoIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, repo: RepoSummary) {
        match self.repos.get_mut(&repo.url) {
            Some(existing) => existing.absorb(repo),
            None => {
                self.order.push(repo.url.clone());
                self.repos.insert(repo.url.clone(), repo);
            }
        }
    }

    pub fn merge_all(&mut self, repos: impl IntoIterator<Item = RepoSummary>) {
        for repo in repos {
            self.merge(repo);
        }
    }

    pub fn contains(&self, url: &str) -> bool {
        self.repos.contains_key(url)
    }

    pub fn get(&self, url: &str) -> Option<&RepoSummary> {
        self.repos.get(url)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RepoSummary> {
        self.order.iter().filter_map(|url| self.repos.get(url))
    }

    pub fn into_vec(mut self) -> Vec<RepoSummary> {
        self.order
            .iter()
            .filter_map(|url| self.repos.remove(url))
            .collect()
    }
}

/// Per-repository counters and optional daily commit series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoStats {
    pub stars: u64,
    pub forks: u64,
    /// Daily commit counts, newest last
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity: Option<Vec<u32>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(url: &str, stars: u64) -> RepoSummary {
        RepoSummary {
            name: url.rsplit('/').next().unwrap_or_default().to_string(),
            url: url.to_string(),
            stars,
            ..RepoSummary::default()
        }
    }

    #[test]
    fn test_absorb_prefers_newer_present_fields() {
        let mut base = repo("https://github.com/a/b", 1);
        base.homepage = Some("https://b.dev".into());
        base.description = Some("old".into());

        let mut newer = repo("https://github.com/a/b", 9);
        newer.description = Some("new".into());

        base.absorb(newer);
        assert_eq!(base.stars, 9);
        assert_eq!(base.description.as_deref(), Some("new"));
        assert_eq!(base.homepage.as_deref(), Some("https://b.dev"));
    }

    #[test]
    fn test_live_overwrites_fallback() {
        let mut index = RepoIndex::new();
        index.merge(RepoSummary::fallback("https://github.com/a/b", "a", "b"));
        index.merge(repo("https://github.com/a/b", 5));

        let repos = index.into_vec();
        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0].stars, 5);
        assert!(!repos[0].is_fallback);
    }

    #[test]
    fn test_fallback_never_overwrites_live() {
        let mut index = RepoIndex::new();
        let mut live = repo("https://github.com/a/b", 5);
        live.homepage = Some("https://b.dev".into());
        index.merge(live);
        index.merge(RepoSummary::fallback("https://github.com/a/b", "a", "b"));

        let repos = index.into_vec();
        assert_eq!(repos[0].stars, 5);
        assert_eq!(repos[0].homepage.as_deref(), Some("https://b.dev"));
        assert!(!repos[0].is_fallback);
    }

    #[test]
    fn test_index_keeps_first_position() {
        let mut index = RepoIndex::new();
        index.merge_all([
            repo("https://github.com/a/one", 1),
            repo("https://github.com/a/two", 2),
            repo("https://github.com/a/one", 3),
        ]);

        let urls: Vec<_> = index.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://github.com/a/one", "https://github.com/a/two"]);
        assert_eq!(index.iter().next().map(|r| r.stars), Some(3));
    }
}
