//! Time-boxed "latest release" cache for runtime operators
//!
//! Each provider owns one [`VersionCache`]. Reads are served from the cache
//! until the entry goes stale, then refreshed through a [`VersionSource`].
//! A failed lookup falls back to the provider's pinned version. Concurrent
//! refreshes may both hit the source; the last write wins.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::{debug, warn};

use kubefoundry_common::{Error, Result};

/// How long a fetched version is trusted (1 hour)
pub const DEFAULT_VERSION_TTL: Duration = Duration::from_secs(3600);

/// Public GitHub API
pub const GITHUB_API_BASE: &str = "https://api.github.com";

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// A cached version string and when it was fetched
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedVersion {
    /// Version without a leading `v`
    pub value: String,
    /// Fetch time
    pub fetched_at: Instant,
}

impl CachedVersion {
    /// True once `ttl` has elapsed since the fetch
    pub fn is_stale(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.fetched_at) >= ttl
    }
}

/// Where the latest release of a repository is looked up
#[cfg_attr(test, automock)]
#[async_trait]
pub trait VersionSource: Send + Sync {
    /// Latest release version of `owner/repo`, without a leading `v`
    async fn latest(&self, repository: &str) -> Result<String>;
}

#[derive(Deserialize)]
struct Release {
    tag_name: String,
}

/// GitHub "latest release" lookup
#[derive(Clone, Debug)]
pub struct GithubReleases {
    client: reqwest::Client,
    api_base: String,
}

impl GithubReleases {
    /// Client against the public GitHub API
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("kubefoundry/", env!("CARGO_PKG_VERSION")))
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::internal_with_context("github", e.to_string()))?;
        Ok(Self {
            client,
            api_base: GITHUB_API_BASE.to_string(),
        })
    }

    /// Point at a different API base (GitHub Enterprise, test servers)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

#[async_trait]
impl VersionSource for GithubReleases {
    async fn latest(&self, repository: &str) -> Result<String> {
        let url = format!("{}/repos/{}/releases/latest", self.api_base, repository);
        debug!(url = %url, "Fetching latest release");

        let release: Release = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| Error::internal_with_context(repository, e.to_string()))?
            .json()
            .await
            .map_err(|e| Error::internal_with_context(repository, e.to_string()))?;

        Ok(strip_version_prefix(&release.tag_name).to_string())
    }
}

/// `v1.2.3` → `1.2.3`
pub fn strip_version_prefix(tag: &str) -> &str {
    tag.strip_prefix('v').unwrap_or(tag)
}

/// Latest-version cache for one runtime
pub struct VersionCache {
    repository: &'static str,
    pinned: String,
    ttl: Duration,
    source: Option<Arc<dyn VersionSource>>,
    cached: RwLock<Option<CachedVersion>>,
}

impl VersionCache {
    /// Cache that always answers `pinned` until a source is attached
    pub fn new(repository: &'static str, pinned: impl Into<String>) -> Self {
        Self {
            repository,
            pinned: pinned.into(),
            ttl: DEFAULT_VERSION_TTL,
            source: None,
            cached: RwLock::new(None),
        }
    }

    /// Attach a lookup source
    pub fn with_source(mut self, source: Option<Arc<dyn VersionSource>>) -> Self {
        self.source = source;
        self
    }

    /// Override the TTL
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// `owner/repo` this cache looks up
    pub fn repository(&self) -> &'static str {
        self.repository
    }

    /// Fallback version
    pub fn pinned(&self) -> &str {
        &self.pinned
    }

    /// Cached value without refreshing, or the pinned version
    pub fn peek(&self) -> String {
        self.cached
            .read()
            .as_ref()
            .map(|c| c.value.clone())
            .unwrap_or_else(|| self.pinned.clone())
    }

    /// Current version, refreshing the entry when stale
    pub async fn get(&self) -> String {
        {
            let cached = self.cached.read();
            if let Some(entry) = cached.as_ref() {
                if !entry.is_stale(Instant::now(), self.ttl) {
                    return entry.value.clone();
                }
            }
        }

        let Some(source) = self.source.clone() else {
            return self.pinned.clone();
        };

        let value = match source.latest(self.repository).await {
            Ok(version) => {
                debug!(repository = self.repository, version = %version, "Refreshed latest version");
                version
            }
            Err(e) => {
                warn!(
                    repository = self.repository,
                    pinned = %self.pinned,
                    error = %e,
                    "Version lookup failed, using pinned version"
                );
                self.pinned.clone()
            }
        };

        *self.cached.write() = Some(CachedVersion {
            value: value.clone(),
            fetched_at: Instant::now(),
        });
        value
    }
}

impl std::fmt::Debug for VersionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionCache")
            .field("repository", &self.repository)
            .field("pinned", &self.pinned)
            .field("ttl", &self.ttl)
            .field("has_source", &self.source.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_returning(version: &'static str, times: usize) -> Arc<dyn VersionSource> {
        let mut source = MockVersionSource::new();
        source
            .expect_latest()
            .withf(|repo| repo == "kaito-project/kaito")
            .times(times)
            .returning(move |_| Ok(version.to_string()));
        Arc::new(source)
    }

    #[test]
    fn staleness_is_relative_to_fetch_time() {
        let fetched_at = Instant::now();
        let entry = CachedVersion {
            value: "0.6.0".to_string(),
            fetched_at,
        };
        let ttl = Duration::from_secs(60);
        assert!(!entry.is_stale(fetched_at, ttl));
        assert!(!entry.is_stale(fetched_at + Duration::from_secs(59), ttl));
        assert!(entry.is_stale(fetched_at + Duration::from_secs(60), ttl));
    }

    #[test]
    fn tag_prefix_is_stripped() {
        assert_eq!(strip_version_prefix("v0.6.2"), "0.6.2");
        assert_eq!(strip_version_prefix("1.4.2"), "1.4.2");
    }

    #[tokio::test]
    async fn no_source_answers_pinned() {
        let cache = VersionCache::new("kaito-project/kaito", "0.6.0");
        assert_eq!(cache.get().await, "0.6.0");
        assert_eq!(cache.peek(), "0.6.0");
    }

    #[tokio::test]
    async fn fresh_entry_is_served_from_cache() {
        let cache = VersionCache::new("kaito-project/kaito", "0.6.0")
            .with_source(Some(source_returning("0.7.1", 1)));

        assert_eq!(cache.get().await, "0.7.1");
        assert_eq!(cache.get().await, "0.7.1");
        assert_eq!(cache.peek(), "0.7.1");
    }

    #[tokio::test]
    async fn stale_entry_is_refreshed() {
        let cache = VersionCache::new("kaito-project/kaito", "0.6.0")
            .with_source(Some(source_returning("0.7.1", 2)))
            .with_ttl(Duration::ZERO);

        cache.get().await;
        cache.get().await;
    }

    #[tokio::test]
    async fn lookup_failure_falls_back_to_pinned() {
        let mut source = MockVersionSource::new();
        source
            .expect_latest()
            .returning(|repo| Err(Error::internal_with_context(repo, "rate limited")));
        let cache = VersionCache::new("kaito-project/kaito", "0.6.0")
            .with_source(Some(Arc::new(source)));

        assert_eq!(cache.get().await, "0.6.0");
        assert_eq!(cache.peek(), "0.6.0");
    }
}
