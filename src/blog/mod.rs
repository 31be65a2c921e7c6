//! Blog merge engine.
//!
//! Persisted posts always win. Markdown files from the configured content repository
//! seed posts whose slugs are not yet stored; seeded posts are written back so the
//! store becomes the source of truth for them from then on.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, SecondsFormat, Utc};
use futures::stream::{self, StreamExt};
use uuid::Uuid;

use crate::db::Store;
use crate::github::{normalize_repo_url, split_repo_url, ContentEntry, GitHubClient};
use crate::models::BlogEntry;

const FETCH_CONCURRENCY: usize = 6;
const DESCRIPTION_MAX_CHARS: usize = 200;
const SLUG_SUFFIX_LEN: usize = 6;

/// A directory of markdown posts in a GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlogSource {
    pub owner: String,
    pub repo: String,
    pub path: String,
}

impl BlogSource {
    /// Parse `owner/repo` (or any accepted repo URL spelling) plus a directory path.
    pub fn new(repo_ref: &str, path: &str) -> Option<Self> {
        let url = normalize_repo_url(repo_ref)?;
        let (owner, repo) = split_repo_url(&url)?;
        Some(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            path: path.trim_matches('/').to_string(),
        })
    }
}

/// Reconciles persisted posts with the markdown source for one pass.
pub struct BlogMerger<'a> {
    client: &'a GitHubClient,
    store: &'a Store,
}

impl<'a> BlogMerger<'a> {
    pub fn new(client: &'a GitHubClient, store: &'a Store) -> Self {
        Self { client, store }
    }

    /// Persisted posts plus newly seeded ones, newest first.
    pub async fn merge(&self, source: Option<&BlogSource>, now: DateTime<Utc>) -> Vec<BlogEntry> {
        let persisted = self.store.list_blog_posts().await.unwrap_or_else(|e| {
            tracing::warn!("Failed to load blog posts: {}", e);
            Vec::new()
        });

        let mut posts = persisted;
        if let Some(source) = source {
            let taken: HashSet<String> = posts.iter().map(|p| p.slug.clone()).collect();
            let seeded = self.seed_from_source(source, taken, now).await;
            posts.extend(seeded);
        }

        self.link_authors(&mut posts).await;
        sort_posts(&mut posts);
        posts
    }

    async fn seed_from_source(
        &self,
        source: &BlogSource,
        mut taken: HashSet<String>,
        now: DateTime<Utc>,
    ) -> Vec<BlogEntry> {
        let Some(listing) = self
            .client
            .get_contents(&source.owner, &source.repo, &source.path)
            .await
            .ok_or_log(&format!(
                "blog listing {}/{}/{}",
                source.owner, source.repo, source.path
            ))
        else {
            return Vec::new();
        };

        // Persisted slugs are skipped before any content is downloaded
        let pending: Vec<ContentEntry> = listing
            .into_iter()
            .filter(|entry| entry.is_markdown())
            .filter(|entry| !taken.contains(&slugify(file_stem(&entry.name))))
            .collect();

        let drafts: Vec<BlogEntry> = stream::iter(pending)
            .map(|entry| async move { self.load_post(source, &entry, now).await })
            .buffered(FETCH_CONCURRENCY)
            .boxed()
            .filter_map(|draft| async move { draft })
            .collect()
            .await;

        let mut seeded = Vec::with_capacity(drafts.len());
        for mut post in drafts {
            post.slug = claim_slug(&post.slug, &mut taken);
            match self.store.insert_blog_post_if_absent(&post).await {
                Ok(true) => tracing::info!("Seeded blog post {}", post.slug),
                Ok(false) => tracing::debug!("Blog post {} already stored", post.slug),
                Err(e) => tracing::warn!("Failed to persist blog post {}: {}", post.slug, e),
            }
            seeded.push(post);
        }
        seeded
    }

    /// Fetch one markdown file and its latest revision. The slug is the unclaimed base slug.
    async fn load_post(
        &self,
        source: &BlogSource,
        entry: &ContentEntry,
        now: DateTime<Utc>,
    ) -> Option<BlogEntry> {
        let content = self
            .client
            .get_file(&source.owner, &source.repo, &entry.path)
            .await
            .ok_or_log(&format!("blog file {}", entry.path))?;

        let latest = self
            .client
            .get_latest_path_commit(&source.owner, &source.repo, &entry.path)
            .await
            .ok_or_log(&format!("history of {}", entry.path))
            .flatten();

        // Dated by the most recent revision
        let revised_at = latest.as_ref().and_then(|c| c.authored_at()).unwrap_or(now);
        let author = latest.as_ref().and_then(|c| c.author_name());

        let stem = file_stem(&entry.name);
        let body = strip_front_matter(&content);

        Some(BlogEntry {
            slug: slugify(stem),
            title: extract_title(body).unwrap_or_else(|| humanize(stem)),
            description: extract_description(body),
            content,
            author,
            author_url: None,
            created_at: revised_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            modified_at: revised_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            reactions: BTreeMap::new(),
        })
    }

    /// Look up each distinct author once and fill in missing author links.
    ///
    /// Resolved links are written back so later passes skip the lookup.
    async fn link_authors(&self, posts: &mut [BlogEntry]) {
        let authors: Vec<String> = posts
            .iter()
            .filter(|p| p.author_url.is_none())
            .filter_map(|p| p.author.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        if authors.is_empty() {
            return;
        }

        let links: HashMap<String, String> = stream::iter(authors)
            .map(|login| async move {
                let website = self
                    .client
                    .get_user(&login)
                    .await
                    .ok_or_log(&format!("author profile {}", login))
                    .and_then(|profile| profile.website());
                website.map(|url| (login, url))
            })
            .buffered(FETCH_CONCURRENCY)
            .boxed()
            .filter_map(|link| async move { link })
            .collect()
            .await;

        for post in posts.iter_mut().filter(|p| p.author_url.is_none()) {
            let Some(url) = post.author.as_ref().and_then(|a| links.get(a)) else {
                continue;
            };
            post.author_url = Some(url.clone());
            if let Err(e) = self.store.set_blog_author_url(&post.slug, url).await {
                tracing::warn!("Failed to store author link for {}: {}", post.slug, e);
            }
        }
    }
}

/// Reserve `base`, or `base-xxxxxx` with a random hex suffix if it is taken.
pub fn claim_slug(base: &str, taken: &mut HashSet<String>) -> String {
    let mut slug = base.to_string();
    while taken.contains(&slug) {
        let token = Uuid::new_v4().simple().to_string();
        slug = format!("{}-{}", base, &token[..SLUG_SUFFIX_LEN]);
    }
    taken.insert(slug.clone());
    slug
}

/// Newest first; equal timestamps ordered by slug.
pub fn sort_posts(posts: &mut [BlogEntry]) {
    posts.sort_by(|a, b| {
        let a_at = DateTime::parse_from_rfc3339(&a.created_at).ok();
        let b_at = DateTime::parse_from_rfc3339(&b.created_at).ok();
        b_at.cmp(&a_at).then_with(|| a.slug.cmp(&b.slug))
    });
}

/// Lowercase ASCII alphanumerics joined by single dashes.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "post".to_string()
    } else {
        slug.to_string()
    }
}

fn file_stem(name: &str) -> &str {
    name.rsplit_once('.').map_or(name, |(stem, _)| stem)
}

fn humanize(stem: &str) -> String {
    stem.split(|c: char| c == '-' || c == '_' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_front_matter(markdown: &str) -> &str {
    let Some(rest) = markdown.strip_prefix("---\n") else {
        return markdown;
    };
    match rest.find("\n---") {
        Some(end) => {
            let after = &rest[end + 4..];
            after.strip_prefix('\n').unwrap_or(after)
        }
        None => markdown,
    }
}

/// Text of the first level-one heading.
pub fn extract_title(markdown: &str) -> Option<String> {
    markdown
        .lines()
        .find_map(|line| line.trim_start().strip_prefix("# "))
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty())
}

/// First paragraph that is not a heading, collapsed to one line and capped.
pub fn extract_description(markdown: &str) -> String {
    let mut paragraph: Vec<&str> = Vec::new();

    for line in markdown.lines().map(str::trim) {
        if line.is_empty() {
            if !paragraph.is_empty() {
                break;
            }
            continue;
        }
        if line.starts_with('#') {
            if !paragraph.is_empty() {
                break;
            }
            continue;
        }
        paragraph.push(line);
    }

    let joined = paragraph.join(" ");
    if joined.chars().count() <= DESCRIPTION_MAX_CHARS {
        return joined;
    }
    joined
        .chars()
        .take(DESCRIPTION_MAX_CHARS)
        .collect::<String>()
        .trim_end()
        .to_string()
}
