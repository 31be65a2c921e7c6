//! GitHub API module.
//!
//! Provides the client, typed endpoints, response types and repo URL normalization.

/// Unwrap `Fetch::Ok` or return the non-success variant from the enclosing function.
macro_rules! try_fetch {
    ($expr:expr) => {
        match $expr {
            $crate::github::Fetch::Ok(value) => value,
            $crate::github::Fetch::Computing => return $crate::github::Fetch::Computing,
            $crate::github::Fetch::NotFound => return $crate::github::Fetch::NotFound,
            $crate::github::Fetch::RateLimited => return $crate::github::Fetch::RateLimited,
            $crate::github::Fetch::Failed(e) => return $crate::github::Fetch::Failed(e),
        }
    };
}

pub(crate) use try_fetch;

pub mod client;
pub mod endpoints;
pub mod types;
pub mod url;

pub use client::{build_http_client, Fetch, GitHubClient};
pub use types::*;
pub use self::url::{normalize_repo_url, split_repo_url};
