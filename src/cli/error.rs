//! Error types for the CLI

use std::path::PathBuf;

use kubefoundry_common::telemetry::TelemetryError;

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Engine, cluster or config failure
    #[error(transparent)]
    Engine(#[from] kubefoundry_common::Error),

    /// Logging could not be set up
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    /// Reading a request file or stdin failed
    #[error("failed to read {path}: {source}")]
    Read {
        /// File that was being read (`-` for stdin)
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// A request file is not YAML or JSON
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// File that was being parsed
        path: PathBuf,
        /// Underlying parser error
        source: serde_yaml::Error,
    },

    /// Writing YAML output failed
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Writing JSON output failed
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The request failed validation; the errors were already printed
    #[error("request rejected with {count} validation error(s)")]
    Rejected {
        /// Number of field errors
        count: usize,
    },

    /// `--require-fit` was given and the request does not fit
    #[error("deployment does not fit the cluster: {reasons}")]
    DoesNotFit {
        /// Every fit warning, joined
        reasons: String,
    },

    /// The provider's operator is not installed on the cluster
    #[error("{provider} is not installed: {message}")]
    NotInstalled {
        /// Provider id
        provider: String,
        /// Installation check explanation
        message: String,
    },

    /// No deployment with that name exists for the provider
    #[error("deployment not found: {namespace}/{name}")]
    DeploymentNotFound {
        /// Namespace searched
        namespace: String,
        /// Deployment name
        name: String,
    },
}

impl Error {
    /// Create a read error
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Read {
            path: path.into(),
            source,
        }
    }

    /// Create a not-found error for a deployment
    pub fn deployment_not_found(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Error::DeploymentNotFound {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}
