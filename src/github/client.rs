//! GitHub API HTTP client.
//!
//! Handles default headers, response classification and the per-pass rate-limit flag.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK, USER_AGENT},
    Client, Response, StatusCode,
};
use serde::de::DeserializeOwned;

use crate::config::Config;
use crate::errors::AppError;

use super::try_fetch;

const GITHUB_API_VERSION: &str = "2022-11-28";
const GITHUB_ACCEPT: &str = "application/vnd.github+json, application/vnd.github.mercy-preview+json";
const GITHUB_RAW_ACCEPT: &str = "application/vnd.github.raw";
const CLIENT_USER_AGENT: &str = "showcase-backend";

/// Empty query string for endpoints without parameters.
pub const NO_PARAMS: &[(&str, &str)] = &[];

/// Outcome of a single upstream call.
///
/// Rate limiting and "still computing" are expected states rather than errors, so they
/// get their own variants instead of living inside `AppError`.
#[derive(Debug)]
pub enum Fetch<T> {
    Ok(T),
    /// 202: the statistic is still being generated upstream
    Computing,
    NotFound,
    /// 403 or 429
    RateLimited,
    Failed(AppError),
}

impl<T> Fetch<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetch<U> {
        match self {
            Fetch::Ok(value) => Fetch::Ok(f(value)),
            Fetch::Computing => Fetch::Computing,
            Fetch::NotFound => Fetch::NotFound,
            Fetch::RateLimited => Fetch::RateLimited,
            Fetch::Failed(e) => Fetch::Failed(e),
        }
    }

    /// Value on success; logs the failure and returns `None` otherwise.
    pub fn ok_or_log(self, what: &str) -> Option<T> {
        match self {
            Fetch::Ok(value) => Some(value),
            Fetch::Computing => {
                tracing::debug!("{} is still being computed upstream", what);
                None
            }
            Fetch::NotFound => {
                tracing::debug!("{} not found upstream", what);
                None
            }
            Fetch::RateLimited => {
                tracing::warn!("{} skipped: rate limited", what);
                None
            }
            Fetch::Failed(e) => {
                tracing::warn!("Failed to fetch {}: {}", what, e);
                None
            }
        }
    }
}

/// Build the shared reqwest client with GitHub default headers.
pub fn build_http_client(config: &Config) -> Result<Client, AppError> {
    let mut headers = HeaderMap::new();

    headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_ACCEPT));
    headers.insert(
        "X-GitHub-Api-Version",
        HeaderValue::from_static(GITHUB_API_VERSION),
    );
    headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

    if let Some(token) = &config.github_token {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| AppError::Internal(format!("Invalid GITHUB_TOKEN: {}", e)))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }

    Client::builder()
        .default_headers(headers)
        .timeout(config.http_timeout)
        .build()
        .map_err(AppError::from)
}

/// GitHub API client scoped to one aggregation pass.
///
/// Cheap to construct: the underlying reqwest client is shared. The rate-limit flag and
/// call counter start fresh for every pass.
pub struct GitHubClient {
    http: Client,
    base_url: String,
    rate_limited: AtomicBool,
    calls: AtomicUsize,
}

impl GitHubClient {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limited: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    /// Whether any call in this pass was answered with 403 or 429.
    pub fn was_rate_limited(&self) -> bool {
        self.rate_limited.load(Ordering::Relaxed)
    }

    /// Number of upstream requests issued in this pass.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// Make a GET request and classify the response.
    pub async fn get<Q: serde::Serialize + ?Sized>(
        &self,
        endpoint: &str,
        params: &Q,
    ) -> Fetch<Response> {
        self.send(endpoint, params, None).await
    }

    /// GET and deserialize a JSON body.
    pub async fn get_json<T: DeserializeOwned, Q: serde::Serialize + ?Sized>(
        &self,
        endpoint: &str,
        params: &Q,
    ) -> Fetch<T> {
        let response = try_fetch!(self.get(endpoint, params).await);
        if response.status() == StatusCode::ACCEPTED {
            return Fetch::Computing;
        }
        match response.json::<T>().await {
            Ok(value) => Fetch::Ok(value),
            Err(e) => Fetch::Failed(e.into()),
        }
    }

    /// GET a JSON page and report whether the `Link` header advertises a next page.
    pub async fn get_page<T: DeserializeOwned, Q: serde::Serialize + ?Sized>(
        &self,
        endpoint: &str,
        params: &Q,
    ) -> Fetch<(T, bool)> {
        let response = try_fetch!(self.get(endpoint, params).await);
        if response.status() == StatusCode::ACCEPTED {
            return Fetch::Computing;
        }
        let has_next = has_next_page(response.headers());
        match response.json::<T>().await {
            Ok(value) => Fetch::Ok((value, has_next)),
            Err(e) => Fetch::Failed(e.into()),
        }
    }

    /// GET a file body using the raw media type.
    pub async fn get_raw(&self, endpoint: &str) -> Fetch<String> {
        let response = try_fetch!(self.send(endpoint, NO_PARAMS, Some(GITHUB_RAW_ACCEPT)).await);
        match response.text().await {
            Ok(text) => Fetch::Ok(text),
            Err(e) => Fetch::Failed(e.into()),
        }
    }

    async fn send<Q: serde::Serialize + ?Sized>(
        &self,
        endpoint: &str,
        params: &Q,
        accept: Option<&'static str>,
    ) -> Fetch<Response> {
        let url = format!("{}{}", self.base_url, endpoint);
        self.calls.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("GET {}", url);

        let mut request = self.http.get(&url).query(params);
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return Fetch::Failed(e.into()),
        };

        self.classify(response).await
    }

    /// Check response status and convert to a `Fetch`.
    async fn classify(&self, response: Response) -> Fetch<Response> {
        match response.status() {
            status if status.is_success() => Fetch::Ok(response),
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
                tracing::warn!(
                    "GitHub rate limit hit ({}) on {}",
                    response.status(),
                    response.url().path()
                );
                self.rate_limited.store(true, Ordering::Relaxed);
                Fetch::RateLimited
            }
            StatusCode::NOT_FOUND => Fetch::NotFound,
            status => {
                let path = response.url().path().to_string();
                let body = response.text().await.unwrap_or_default();
                Fetch::Failed(AppError::Upstream(format!(
                    "HTTP {} on {}: {}",
                    status,
                    path,
                    body.chars().take(200).collect::<String>()
                )))
            }
        }
    }
}

fn has_next_page(headers: &HeaderMap) -> bool {
    headers
        .get(LINK)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|link| link.split(',').any(|part| part.contains("rel=\"next\"")))
}
