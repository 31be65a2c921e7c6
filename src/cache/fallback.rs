//! Static fallback repository list.
//!
//! One repository reference per line; blank lines and `#` comments are ignored.

use std::collections::HashSet;
use std::path::Path;

use crate::github::{normalize_repo_url, split_repo_url};
use crate::models::RepoSummary;

/// Parse the list into placeholder summaries, deduplicated by canonical URL.
pub fn parse_fallback_list(text: &str) -> Vec<RepoSummary> {
    let mut seen = HashSet::new();

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let url = normalize_repo_url(line);
            if url.is_none() {
                tracing::warn!("Ignoring unrecognized fallback repo entry: {}", line);
            }
            url
        })
        .filter(|url| seen.insert(url.clone()))
        .filter_map(|url| {
            let (owner, name) = split_repo_url(&url)?;
            Some(RepoSummary::fallback(&url, owner, name))
        })
        .collect()
}

/// Read and parse the fallback file. A missing or unreadable file yields an empty list.
pub async fn load_fallback_repos(path: &Path) -> Vec<RepoSummary> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => parse_fallback_list(&text),
        Err(e) => {
            tracing::warn!("Failed to read fallback repo list {:?}: {}", path, e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_comments_and_dedupes() {
        let text = "\
# showcase repos
contrib-club/website

https://github.com/Contrib-Club/Website.git
  git@github.com:contrib-club/docs.git
https://gitlab.com/someone/else
";

        let repos = parse_fallback_list(text);
        let urls: Vec<_> = repos.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://github.com/contrib-club/website",
                "https://github.com/contrib-club/docs"
            ]
        );
        assert!(repos.iter().all(|r| r.is_fallback && r.stars == 0));
        assert_eq!(repos[1].name, "docs");
        assert_eq!(repos[1].owner.as_deref(), Some("contrib-club"));
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let repos = load_fallback_repos(&dir.path().join("nope.txt")).await;
        assert!(repos.is_empty());
    }
}
