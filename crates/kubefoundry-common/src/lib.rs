//! Common types for kubefoundry: errors, retry policy, kube helpers, and logging

#![deny(missing_docs)]

pub mod error;
pub mod kube_utils;
pub mod retry;
pub mod telemetry;

pub use error::{Error, FieldError};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Value of the managed-by label on every generated resource
pub const MANAGED_BY: &str = "kubefoundry";

/// Standard Kubernetes name label
pub const LABEL_NAME: &str = "app.kubernetes.io/name";

/// Standard Kubernetes instance label
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";

/// Standard Kubernetes managed-by label
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Provider id that compiled the resource
pub const LABEL_PROVIDER: &str = "kubefoundry.io/provider";

/// Model source variant (`premade`, `huggingface-gguf`, `vllm-hf`)
pub const LABEL_MODEL_SOURCE: &str = "kubefoundry.io/model-source";

/// Compute type (`cpu` or `gpu`)
pub const LABEL_COMPUTE_TYPE: &str = "kubefoundry.io/compute-type";

/// GGUF run mode (`direct` or `build`), only set for GGUF models
pub const LABEL_RUN_MODE: &str = "kubefoundry.io/run-mode";

/// Inference engine serving the model
pub const LABEL_ENGINE: &str = "kubefoundry.io/engine";

/// Annotation holding the logical model identity
pub const ANNOTATION_MODEL_ID: &str = "kubefoundry.io/model-id";

/// Extended resource name for NVIDIA GPUs
pub const GPU_RESOURCE: &str = "nvidia.com/gpu";
