//! Repository reference normalization.
//!
//! Every repo collection is joined on the canonical URL produced here, so two spellings of
//! the same repository must always normalize to the same string.

use url::Url;

const GITHUB_HOST: &str = "github.com";
const CANONICAL_PREFIX: &str = "https://github.com/";

/// Normalize a free-form repository reference to `https://github.com/{owner}/{repo}`.
///
/// Accepts bare `owner/repo`, host-prefixed and full URLs (any scheme, optional `www.`,
/// `.git` suffix, extra path segments, query and fragment) and scp-style
/// `git@github.com:owner/repo`. Returns `None` for other hosts and malformed input.
pub fn normalize_repo_url(raw: &str) -> Option<String> {
    let url = Url::parse(&to_url_syntax(raw.trim())?).ok()?;

    if !matches!(url.scheme(), "http" | "https" | "git" | "ssh") {
        return None;
    }

    let host = url.host_str()?.to_ascii_lowercase();
    if host.strip_prefix("www.").unwrap_or(&host) != GITHUB_HOST {
        return None;
    }

    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
    let owner = segments.next()?;
    let repo = segments.next()?;
    let repo = repo.strip_suffix(".git").unwrap_or(repo);

    if !is_valid_owner(owner) || !is_valid_repo(repo) {
        return None;
    }

    Some(format!(
        "{}{}/{}",
        CANONICAL_PREFIX,
        owner.to_ascii_lowercase(),
        repo.to_ascii_lowercase()
    ))
}

/// Split a canonical URL back into `(owner, repo)`.
pub fn split_repo_url(url: &str) -> Option<(&str, &str)> {
    let rest = url.strip_prefix(CANONICAL_PREFIX)?;
    let (owner, repo) = rest.split_once('/')?;
    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return None;
    }
    Some((owner, repo))
}

/// Rewrite the shorthand forms into something `Url::parse` accepts.
fn to_url_syntax(reference: &str) -> Option<String> {
    if reference.is_empty() {
        return None;
    }
    if reference.contains("://") {
        return Some(reference.to_string());
    }
    if let Some(rest) = reference.strip_prefix("git@") {
        let (host, path) = rest.split_once(':')?;
        return Some(format!("ssh://git@{}/{}", host, path));
    }

    // A dot in the first segment means the reference starts with a hostname
    let starts_with_host = reference
        .split('/')
        .next()
        .is_some_and(|first| first.contains('.'));
    if starts_with_host {
        Some(format!("https://{}", reference))
    } else {
        Some(format!("{}{}", CANONICAL_PREFIX, reference))
    }
}

fn is_valid_owner(owner: &str) -> bool {
    owner.len() <= 39
        && !owner.starts_with('-')
        && owner.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn is_valid_repo(repo: &str) -> bool {
    !repo.is_empty()
        && repo.len() <= 100
        && repo != "."
        && repo != ".."
        && repo
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
