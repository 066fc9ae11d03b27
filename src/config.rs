//! kubefoundry configuration file
//!
//! The file is YAML (JSON is accepted too) and every field is optional.
//! Lookup order for the file itself (highest priority first):
//! 1. Explicit `--config` flag
//! 2. `KUBEFOUNDRY_CONFIG` environment variable
//! 3. `~/.kubefoundry/config.yaml`
//! 4. Built-in defaults
//!
//! The kubeconfig resolution chain (highest priority first):
//! 1. Explicit `--kubeconfig` flag
//! 2. `KUBEFOUNDRY_KUBECONFIG` environment variable
//! 3. `kubeconfig` in the config file
//! 4. Fall back to kube default (`KUBECONFIG` env / `~/.kube/config`)

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use kubefoundry_common::retry::RetryConfig;
use kubefoundry_common::{Error, Result};

use crate::provider::{GithubReleases, RegistryOptions, VersionSource};

const CONFIG_DIR_NAME: &str = ".kubefoundry";
const CONFIG_FILE_NAME: &str = "config.yaml";

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "KUBEFOUNDRY_CONFIG";

/// Environment variable naming the kubeconfig
pub const KUBECONFIG_ENV: &str = "KUBEFOUNDRY_KUBECONFIG";

/// Retry policy for cluster calls
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrySettings {
    /// Attempts per call, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay_ms: u64,
    /// Upper bound on the backoff delay
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_attempts: defaults.max_attempts,
            initial_delay_ms: defaults.initial_delay.as_millis() as u64,
            max_delay_ms: defaults.max_delay.as_millis() as u64,
        }
    }
}

impl RetrySettings {
    /// Retry policy for [`KubeClusterQuery`](crate::cluster::KubeClusterQuery)
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts.max(1),
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms.max(self.initial_delay_ms)),
            ..Default::default()
        }
    }
}

/// Operator version lookup
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VersionSettings {
    /// How long a looked-up release stays fresh
    pub cache_ttl_secs: u64,
    /// Provider id to version; replaces the built-in pinned version
    pub pinned: BTreeMap<String, String>,
    /// Never call the GitHub releases API
    pub offline: bool,
    /// GitHub API base URL, for GitHub Enterprise mirrors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
}

impl Default for VersionSettings {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 3600,
            pinned: BTreeMap::new(),
            offline: false,
            api_base: None,
        }
    }
}

/// Persistent configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FoundryConfig {
    /// Kubeconfig to use when neither the flag nor the env var is set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<PathBuf>,
    /// Namespace used when a command is not given one
    pub default_namespace: String,
    /// Cluster call retry policy
    pub retry: RetrySettings,
    /// Operator version lookup
    pub versions: VersionSettings,
}

impl Default for FoundryConfig {
    fn default() -> Self {
        Self {
            kubeconfig: None,
            default_namespace: "default".to_string(),
            retry: RetrySettings::default(),
            versions: VersionSettings::default(),
        }
    }
}

/// Path to `~/.kubefoundry/config.yaml`, if a home directory exists
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Resolve which config file to read, if any
///
/// An explicit path or `KUBEFOUNDRY_CONFIG` is returned even when the file
/// does not exist so that loading reports it. The home directory file is
/// only returned when present.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    default_config_path().filter(|path| path.exists())
}

impl FoundryConfig {
    /// Parse a YAML or JSON document
    pub fn parse(data: &str) -> Result<Self> {
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(data).map_err(|e| {
            Error::internal_with_context("config", format!("failed to parse config: {}", e))
        })
    }

    /// Read a config file
    pub fn read(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            Error::internal_with_context(
                "config",
                format!("failed to read {}: {}", path.display(), e),
            )
        })?;
        Self::parse(&data).map_err(|e| match e {
            Error::Internal { message, context } => Error::Internal {
                message: format!("{}: {}", path.display(), message),
                context,
            },
            other => other,
        })
    }

    /// Load the config using the lookup chain, falling back to defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match resolve_config_path(explicit) {
            Some(path) => {
                debug!(path = %path.display(), "Loading config");
                Self::read(&path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Resolve the kubeconfig path; `None` means use kube defaults
    pub fn resolve_kubeconfig(&self, explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }

        if let Ok(path) = std::env::var(KUBECONFIG_ENV) {
            if !path.is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        self.kubeconfig.clone()
    }

    /// Version cache TTL
    pub fn version_ttl(&self) -> Duration {
        Duration::from_secs(self.versions.cache_ttl_secs)
    }

    /// How the provider registry should be built
    ///
    /// Offline configs keep every provider on its pinned version.
    pub fn registry_options(&self) -> Result<RegistryOptions> {
        let version_source: Option<Arc<dyn VersionSource>> = if self.versions.offline {
            None
        } else {
            let releases = GithubReleases::new()?;
            Some(Arc::new(match &self.versions.api_base {
                Some(base) => releases.with_api_base(base.as_str()),
                None => releases,
            }))
        };

        Ok(RegistryOptions {
            version_source,
            version_ttl: self.version_ttl(),
            pinned_versions: self.versions.pinned.clone(),
        })
    }
}
