//! Configuration module for the showcase backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Salt used when `SHOWCASE_REACTION_SALT` is not set.
pub const DEFAULT_REACTION_SALT: &str = "showcase-reactions";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// GitHub token; unauthenticated calls run against the public quota
    pub github_token: Option<String>,
    /// Organization whose members and repositories are aggregated
    pub github_org: String,
    /// Base URL of the GitHub REST API
    pub github_api_url: String,
    /// Topic spellings that mark a member repository as an org project
    pub project_topics: Vec<String>,
    /// `owner/repo` holding fallback blog markdown, if any
    pub blog_repo: Option<String>,
    /// Directory inside `blog_repo` holding the markdown files
    pub blog_path: String,
    /// Newline-delimited list of known repository references
    pub fallback_repos_path: PathBuf,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Salt mixed into hashed reaction actor keys
    pub reaction_salt: String,
    /// Per-request timeout for upstream calls
    pub http_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let github_token = env::var("GITHUB_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());

        let github_org =
            env::var("SHOWCASE_GITHUB_ORG").unwrap_or_else(|_| "contrib-club".to_string());

        let github_api_url = env::var("SHOWCASE_GITHUB_API_URL")
            .unwrap_or_else(|_| "https://api.github.com".to_string())
            .trim_end_matches('/')
            .to_string();

        let project_topics = parse_list(
            &env::var("SHOWCASE_PROJECT_TOPICS")
                .unwrap_or_else(|_| "contrib-club,contribclub".to_string()),
        );

        let blog_repo = env::var("SHOWCASE_BLOG_REPO")
            .ok()
            .filter(|r| !r.trim().is_empty());

        let blog_path = env::var("SHOWCASE_BLOG_PATH").unwrap_or_else(|_| "blog".to_string());

        let fallback_repos_path = env::var("SHOWCASE_FALLBACK_REPOS")
            .unwrap_or_else(|_| "./data/fallback-repos.txt".to_string())
            .into();

        let db_path = env::var("SHOWCASE_DB_PATH")
            .unwrap_or_else(|_| "./data/app.sqlite".to_string())
            .into();

        let bind_addr = env::var("SHOWCASE_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .expect("Invalid SHOWCASE_BIND_ADDR format");

        let log_level = env::var("SHOWCASE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let reaction_salt = env::var("SHOWCASE_REACTION_SALT")
            .unwrap_or_else(|_| DEFAULT_REACTION_SALT.to_string());

        let http_timeout = env::var("SHOWCASE_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(20));

        Self {
            github_token,
            github_org,
            github_api_url,
            project_topics,
            blog_repo,
            blog_path,
            fallback_repos_path,
            db_path,
            bind_addr,
            log_level,
            reaction_salt,
            http_timeout,
        }
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        // Clear any existing env vars
        env::remove_var("GITHUB_TOKEN");
        env::remove_var("SHOWCASE_GITHUB_ORG");
        env::remove_var("SHOWCASE_GITHUB_API_URL");
        env::remove_var("SHOWCASE_PROJECT_TOPICS");
        env::remove_var("SHOWCASE_BLOG_REPO");
        env::remove_var("SHOWCASE_BLOG_PATH");
        env::remove_var("SHOWCASE_FALLBACK_REPOS");
        env::remove_var("SHOWCASE_DB_PATH");
        env::remove_var("SHOWCASE_BIND_ADDR");
        env::remove_var("SHOWCASE_LOG_LEVEL");
        env::remove_var("SHOWCASE_REACTION_SALT");
        env::remove_var("SHOWCASE_HTTP_TIMEOUT_SECS");

        let config = Config::from_env();

        assert!(config.github_token.is_none());
        assert_eq!(config.github_org, "contrib-club");
        assert_eq!(config.github_api_url, "https://api.github.com");
        assert_eq!(config.project_topics, vec!["contrib-club", "contribclub"]);
        assert!(config.blog_repo.is_none());
        assert_eq!(config.blog_path, "blog");
        assert_eq!(
            config.fallback_repos_path,
            PathBuf::from("./data/fallback-repos.txt")
        );
        assert_eq!(config.db_path, PathBuf::from("./data/app.sqlite"));
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.reaction_salt, DEFAULT_REACTION_SALT);
        assert_eq!(config.http_timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(parse_list(" A, b ,,c "), vec!["a", "b", "c"]);
        assert!(parse_list("").is_empty());
    }
}
