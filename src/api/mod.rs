// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Dashboard backend client for dockpull.
//!
//! Talks to the dashboard's same-origin endpoints, which proxy Docker Hub
//! search and forward pulls to the Docker Engine.
//!
//! # Example
//!
//! ```no_run
//! use dockpull::api::{DashboardClient, ImageRef};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = DashboardClient::with_url("http://localhost:5000");
//!
//! let results = client.search("nginx").await?;
//! for image in results.valid() {
//!     println!("{}", image.full_name());
//! }
//!
//! let started = client.trigger_pull(&ImageRef::parse("library/nginx")?).await?;
//! println!("{:?}", started);
//! # Ok(())
//! # }
//! ```

mod details;
mod image;

pub use details::{Category, RepoInfo, SectionPreview, SECTION_PREVIEW_LINES};
pub use image::ImageRef;

use futures_util::stream::Stream;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default dashboard endpoint.
pub const DEFAULT_DASHBOARD_URL: &str = "http://localhost:5000";

/// Default timeout for connection setup (in seconds).
const CONNECTION_TIMEOUT_SECS: u64 = 5;

/// Default timeout for search and trigger requests (in seconds).
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default timeout for a streamed pull, body included (in seconds).
const PULL_TIMEOUT_SECS: u64 = 3600;

/// Error types for dashboard requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The request was rejected before it was sent.
    InvalidRequest(String),
    /// The dashboard could not be reached.
    Unreachable(String),
    /// The request timed out.
    Timeout(String),
    /// The dashboard answered with a non-success status.
    Http { status: u16, body: String },
    /// Other network or HTTP error.
    Network(String),
    /// The response body could not be decoded.
    InvalidResponse(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            Self::Unreachable(msg) => write!(f, "Dashboard unreachable: {}", msg),
            Self::Timeout(msg) => write!(f, "Request timed out: {}", msg),
            Self::Http { status, body } if body.is_empty() => write!(f, "HTTP {}", status),
            Self::Http { status, body } => write!(f, "HTTP {}: {}", status, body),
            Self::Network(msg) => write!(f, "Network error: {}", msg),
            Self::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

/// Tag metadata, attached to a search result or fetched on its own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagInfo {
    pub name: Option<String>,
    pub last_updated: Option<String>,
    pub full_size: Option<u64>,
    /// Per-platform image entries, passed through as reported.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<serde_json::Value>,
}

impl TagInfo {
    /// The dashboard answers `{}` for an unknown tag.
    pub fn is_known(&self) -> bool {
        self.name.is_some() || self.full_size.is_some() || self.last_updated.is_some()
    }
}

/// One repository returned by a Docker Hub search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchResult {
    pub namespace: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub pull_count: u64,
    pub star_count: u64,
    pub is_official: bool,
    pub latest_tag: Option<String>,
    pub size: Option<u64>,
    #[serde(rename = "tagInfo")]
    pub tag_info: Option<TagInfo>,
}

impl SearchResult {
    /// `namespace/name`, or an empty string if either part is missing.
    pub fn full_name(&self) -> String {
        match (&self.namespace, &self.name) {
            (Some(ns), Some(name)) => format!("{}/{}", ns, name),
            _ => String::new(),
        }
    }

    /// Latest tag name, falling back to `latest`.
    pub fn tag_name(&self) -> &str {
        self.tag_info
            .as_ref()
            .and_then(|t| t.name.as_deref())
            .or(self.latest_tag.as_deref())
            .unwrap_or(ImageRef::DEFAULT_TAG)
    }

    /// Compressed size of the latest tag, if reported.
    pub fn size_bytes(&self) -> u64 {
        self.tag_info
            .as_ref()
            .and_then(|t| t.full_size)
            .or(self.size)
            .unwrap_or(0)
    }

    /// Last update of the latest tag.
    pub fn last_updated(&self) -> Option<&str> {
        self.tag_info.as_ref().and_then(|t| t.last_updated.as_deref())
    }

    fn is_valid(&self) -> bool {
        self.namespace.as_deref().is_some_and(|s| !s.is_empty())
            && self.name.as_deref().is_some_and(|s| !s.is_empty())
    }
}

/// Response of the search endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchResults {
    pub results: Vec<SearchResult>,
}

impl SearchResults {
    /// Results that name a repository; malformed entries are logged and skipped.
    pub fn valid(&self) -> Vec<&SearchResult> {
        self.results
            .iter()
            .filter(|r| {
                let ok = r.is_valid();
                if !ok {
                    tracing::warn!("Skipping search result without namespace/name: {:?}", r);
                }
                ok
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Answer of the non-streaming pull endpoint.
///
/// `Accepted` only means the dashboard took the request. The pull itself may
/// still be running; follow it with [`DashboardClient::pull_stream`] to
/// observe completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullTrigger {
    Accepted,
    Rejected(u16),
}

/// Client for the dashboard backend.
#[derive(Debug, Clone)]
pub struct DashboardClient {
    /// Base URL of the dashboard.
    base_url: String,
    client: reqwest::Client,
    /// Timeout for search and trigger requests.
    request_timeout: Duration,
    /// Timeout for streamed pulls.
    pull_timeout: Duration,
}

impl Default for DashboardClient {
    fn default() -> Self {
        Self::new()
    }
}

impl DashboardClient {
    /// Create a client for `http://localhost:5000`.
    pub fn new() -> Self {
        Self::with_url(DEFAULT_DASHBOARD_URL)
    }

    /// Create a client for a custom dashboard URL.
    pub fn with_url(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECTION_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });

        Self {
            base_url: url.into().trim_end_matches('/').to_string(),
            client,
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            pull_timeout: Duration::from_secs(PULL_TIMEOUT_SECS),
        }
    }

    /// Set a custom timeout for search and trigger requests.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set a custom timeout for streamed pulls.
    pub fn with_pull_timeout(mut self, timeout: Duration) -> Self {
        self.pull_timeout = timeout;
        self
    }

    /// The normalized base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Search Docker Hub through the dashboard proxy.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for an empty query, `Http` for non-success
    /// answers, and `InvalidResponse` if the body is not a result list.
    pub async fn search(&self, query: &str) -> Result<SearchResults, ApiError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ApiError::InvalidRequest(
                "Please enter an image name".to_string(),
            ));
        }

        let url = format!("{}/api/docker-hub/search", self.base_url);
        tracing::info!("GET {} q={}", url, query);

        let response = self
            .client
            .get(&url)
            .query(&[("q", query)])
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| self.map_send_error(e, "searching"))?;

        let response = Self::check_status(response).await?;
        response
            .json::<SearchResults>()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    /// Fetch repository details. `Ok(None)` means Docker Hub has no such
    /// repository.
    ///
    /// Official images are addressed by bare name (`nginx`), which is how the
    /// dashboard looks them up; a `library/` prefix is removed.
    pub async fn repo_info(&self, repo: &str) -> Result<Option<RepoInfo>, ApiError> {
        let url = format!("{}/api/docker-hub/repo/{}", self.base_url, hub_path(repo)?);
        tracing::info!("GET {}", url);

        let info: RepoInfo = self.get_json(&url, "fetching repository details").await?;
        if let Some(error) = &info.error {
            tracing::warn!("Dashboard could not load {}: {}", repo, error);
        }
        Ok(info.found.then_some(info))
    }

    /// Fetch details of one tag. `Ok(None)` means the tag is unknown.
    pub async fn tag_info(&self, image: &ImageRef) -> Result<Option<TagInfo>, ApiError> {
        let url = format!(
            "{}/api/docker-hub/tag/{}/{}",
            self.base_url,
            hub_path(image.repo())?,
            image.tag()
        );
        tracing::info!("GET {}", url);

        let info: TagInfo = self.get_json(&url, "fetching tag details").await?;
        Ok(info.is_known().then_some(info))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        action: &str,
    ) -> Result<T, ApiError> {
        let response = self
            .client
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| self.map_send_error(e, action))?;

        let response = Self::check_status(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    /// Ask the dashboard to pull an image without streaming progress.
    pub async fn trigger_pull(&self, image: &ImageRef) -> Result<PullTrigger, ApiError> {
        let url = format!("{}/images/pull", self.base_url);
        tracing::info!("POST {} image={}", url, image);

        let response = self
            .client
            .post(&url)
            .form(&[("repo", image.repo()), ("tag", image.tag())])
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| self.map_send_error(e, "starting the pull"))?;

        let redirected = response.url().as_str() != url;
        let status = response.status();
        if status.is_success() || status.is_redirection() || redirected {
            Ok(PullTrigger::Accepted)
        } else {
            tracing::warn!("Pull of {} rejected: HTTP {}", image, status);
            Ok(PullTrigger::Rejected(status.as_u16()))
        }
    }

    /// Open the streaming pull endpoint.
    ///
    /// The returned stream yields the raw NDJSON body; feed it to a
    /// [`PullSession`](crate::pull::PullSession).
    pub async fn pull_stream(
        &self,
        image: &ImageRef,
    ) -> Result<impl Stream<Item = Result<impl AsRef<[u8]>, reqwest::Error>>, ApiError> {
        let url = format!("{}/images/pull-stream", self.base_url);
        tracing::info!("GET {} image={}", url, image);

        let response = self
            .client
            .get(&url)
            .query(&[("image", image.to_string())])
            .timeout(self.pull_timeout)
            .send()
            .await
            .map_err(|e| self.map_send_error(e, "opening the pull stream"))?;

        let response = Self::check_status(response).await?;
        Ok(response.bytes_stream())
    }

    fn map_send_error(&self, e: reqwest::Error, action: &str) -> ApiError {
        if e.is_connect() {
            ApiError::Unreachable(format!(
                "Cannot connect to the dashboard at {}. Is it running?",
                self.base_url
            ))
        } else if e.is_timeout() {
            ApiError::Timeout(format!("Timed out while {}", action))
        } else {
            ApiError::Network(e.to_string())
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Http {
            status: status.as_u16(),
            body: body.trim().to_string(),
        })
    }
}

/// Repository path as the dashboard's detail endpoints expect it.
fn hub_path(repo: &str) -> Result<&str, ApiError> {
    let path = repo.trim().trim_matches('/');
    let path = path.strip_prefix("library/").unwrap_or(path);
    if path.is_empty() {
        return Err(ApiError::InvalidRequest("image name is empty".to_string()));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hub_path() {
        assert_eq!(hub_path("library/nginx").unwrap(), "nginx");
        assert_eq!(hub_path("nginx").unwrap(), "nginx");
        assert_eq!(hub_path("bitnami/redis").unwrap(), "bitnami/redis");
        assert!(matches!(hub_path(" / "), Err(ApiError::InvalidRequest(_))));
    }

    #[test]
    fn test_unknown_tag_answer() {
        let tag: TagInfo = serde_json::from_str("{}").unwrap();
        assert!(!tag.is_known());

        let tag: TagInfo =
            serde_json::from_str(r#"{"name":"1.27","full_size":null,"images":[{"os":"linux"}]}"#)
                .unwrap();
        assert!(tag.is_known());
        assert_eq!(tag.images.len(), 1);
    }

    #[test]
    fn test_client_url_normalization() {
        let client = DashboardClient::with_url("http://localhost:5000/");
        assert_eq!(client.base_url(), "http://localhost:5000");

        let client = DashboardClient::new();
        assert_eq!(client.base_url(), DEFAULT_DASHBOARD_URL);
    }

    #[test]
    fn test_search_result_fallbacks() {
        let results: SearchResults = serde_json::from_str(
            r#"{"results":[
                {"namespace":"library","name":"nginx","pull_count":1500000000,"is_official":true,
                 "tagInfo":{"name":"1.27","last_updated":"2024-10-01T12:00:00Z","full_size":73400320}},
                {"namespace":"bitnami","name":"redis","latest_tag":"7.4","size":1024},
                {"name":"orphan"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(results.results.len(), 3);
        let valid = results.valid();
        assert_eq!(valid.len(), 2);

        assert_eq!(valid[0].full_name(), "library/nginx");
        assert_eq!(valid[0].tag_name(), "1.27");
        assert_eq!(valid[0].size_bytes(), 73_400_320);
        assert_eq!(valid[0].last_updated(), Some("2024-10-01T12:00:00Z"));

        assert_eq!(valid[1].tag_name(), "7.4");
        assert_eq!(valid[1].size_bytes(), 1024);
        assert!(!valid[1].is_official);
        assert_eq!(valid[1].last_updated(), None);

        assert_eq!(results.results[2].full_name(), "");
        assert_eq!(results.results[2].tag_name(), "latest");
    }

    #[test]
    fn test_missing_results_key_is_empty() {
        let results: SearchResults = serde_json::from_str("{}").unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_api_error_display() {
        let err = ApiError::Http {
            status: 502,
            body: String::new(),
        };
        assert_eq!(err.to_string(), "HTTP 502");

        let err = ApiError::Http {
            status: 500,
            body: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 500: boom");

        let err = ApiError::Unreachable("test".to_string());
        assert!(err.to_string().contains("unreachable"));
    }
}
