//! Error types for kubefoundry
//!
//! Errors are structured with fields so callers can branch on the failure
//! category (bad input, unknown provider, unreachable cluster, missing
//! permission) without parsing messages.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single field-qualified validation problem
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Field path in the request (e.g. `name`, `resources.gpu`)
    pub field: String,
    /// Human readable description of what is wrong
    pub message: String,
}

impl FieldError {
    /// Create a field error
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Main error type for kubefoundry operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error that does not map to a more specific category
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Deployment request failed validation
    #[error("validation error: {}", join_field_errors(.errors))]
    Validation {
        /// Every problem found, in field order
        errors: Vec<FieldError>,
    },

    /// No provider is registered under the given id
    #[error("unknown provider: {id}")]
    UnknownProvider {
        /// The id that was requested
        id: String,
    },

    /// A premade model key is not in the provider's catalog
    #[error("unknown catalog entry [{provider}]: {key}")]
    UnknownCatalogEntry {
        /// Provider whose catalog was searched
        provider: String,
        /// The key that was requested
        key: String,
    },

    /// The cluster could not be reached or answered with a transient failure
    #[error("cluster unavailable [{context}]: {message}")]
    ClusterUnavailable {
        /// Operation that was attempted (e.g. "list_nodes")
        context: String,
        /// Description of what failed
        message: String,
    },

    /// The API server refused the request (HTTP 403)
    #[error("permission denied [{context}]: {message}")]
    Permission {
        /// Operation that was attempted
        context: String,
        /// Message returned by the API server
        message: String,
    },

    /// The requested object or resource type does not exist (HTTP 404)
    #[error("resource not found [{context}]: {message}")]
    ResourceNotFound {
        /// Operation that was attempted
        context: String,
        /// Message returned by the API server
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "config", "version_lookup")
        context: String,
    },
}

impl Error {
    /// Create a validation error carrying a single field problem
    pub fn validation_for_field(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            errors: vec![FieldError::new(field, msg)],
        }
    }

    /// Create a validation error from a list of field problems
    pub fn validation(errors: Vec<FieldError>) -> Self {
        Self::Validation { errors }
    }

    /// Create an unknown provider error
    pub fn unknown_provider(id: impl Into<String>) -> Self {
        Self::UnknownProvider { id: id.into() }
    }

    /// Create an unknown catalog entry error
    pub fn unknown_catalog_entry(provider: impl Into<String>, key: impl Into<String>) -> Self {
        Self::UnknownCatalogEntry {
            provider: provider.into(),
            key: key.into(),
        }
    }

    /// Create a cluster-unavailable error
    pub fn cluster_unavailable(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ClusterUnavailable {
            context: context.into(),
            message: msg.into(),
        }
    }

    /// Create a permission error
    pub fn permission(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Permission {
            context: context.into(),
            message: msg.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ResourceNotFound {
            context: context.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Classify a kube-rs error by what the caller can do about it
    ///
    /// 403 becomes [`Error::Permission`], 404 becomes [`Error::ResourceNotFound`],
    /// 429/5xx and transport failures become [`Error::ClusterUnavailable`].
    /// Other API errors are kept as [`Error::Kube`].
    pub fn from_kube(context: impl Into<String>, err: kube::Error) -> Self {
        let context = context.into();
        let code = match &err {
            kube::Error::Api(response) => Some(response.code),
            _ => None,
        };
        let message = match &err {
            kube::Error::Api(response) => response.message.clone(),
            other => other.to_string(),
        };

        match code {
            Some(403) => Self::Permission { context, message },
            Some(404) => Self::ResourceNotFound { context, message },
            Some(code) if code == 429 || code >= 500 => {
                Self::ClusterUnavailable { context, message }
            }
            Some(_) => Self::Kube { source: err },
            None => Self::ClusterUnavailable { context, message },
        }
    }

    /// Check if this error is retryable
    ///
    /// Only transient cluster failures are retried. Validation, permission and
    /// not-found errors need a human to change something first.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code)
            ),
            Error::ClusterUnavailable { .. } => true,
            Error::Validation { .. } => false,
            Error::UnknownProvider { .. } => false,
            Error::UnknownCatalogEntry { .. } => false,
            Error::Permission { .. } => false,
            Error::ResourceNotFound { .. } => false,
            Error::Serialization { .. } => false,
            Error::Internal { .. } => false,
        }
    }

    /// True when the error means the object or resource type is absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::ResourceNotFound { .. })
    }

    /// Field problems carried by a validation error
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Error::Validation { errors } => errors,
            _ => &[],
        }
    }

    /// Get the context if this error has one
    pub fn context(&self) -> Option<&str> {
        match self {
            Error::ClusterUnavailable { context, .. }
            | Error::Permission { context, .. }
            | Error::ResourceNotFound { context, .. }
            | Error::Internal { context, .. } => Some(context),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::serialization(err.to_string())
    }
}
