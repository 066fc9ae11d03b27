//! Inference runtime adapters
//!
//! Every runtime implements the [`Provider`] trait: it compiles a validated
//! [`DeploymentRequest`] into its own custom resource, reduces its live
//! objects into a [`CanonicalStatus`], and describes how its operator is
//! installed. Callers select an adapter through the [`ProviderRegistry`] and
//! never branch on provider identity themselves.
//!
//! # Supported Providers
//!
//! - [`KaitoProvider`] - KAITO `Workspace` / `InferenceSet`
//! - [`DynamoProvider`] - NVIDIA Dynamo `DynamoGraphDeployment`
//! - [`KubeRayProvider`] - KubeRay `RayService`

pub mod dynamo;
pub mod install;
pub mod kaito;
pub mod kuberay;
pub mod manifest;
pub mod registry;
pub mod version;

pub use dynamo::DynamoProvider;
pub use install::{
    HelmChart, HelmRepo, InstallStep, InstallationStatus, OperatorRef, UninstallResources,
};
pub use kaito::KaitoProvider;
pub use kuberay::KubeRayProvider;
pub use manifest::ManifestMetadata;
pub use registry::{ProviderRegistry, RegistryOptions};
pub use version::{GithubReleases, VersionCache, VersionSource};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use kubefoundry_common::Result;

use crate::catalog::ModelCatalog;
use crate::cluster::{ClusterQuery, CrdConfig};
use crate::request::{DeploymentRequest, InferenceEngine, ModelSourceKind, ResourceVariant};
use crate::status::CanonicalStatus;
use crate::validation::{validate_request, ValidationOutcome};

/// What a runtime can serve
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderFeatures {
    /// Accepted model sources
    pub model_sources: &'static [ModelSourceKind],
    /// Accepted inference engines
    pub engines: &'static [InferenceEngine],
    /// Accepted custom-resource shapes
    pub resource_variants: &'static [ResourceVariant],
    /// Supports separate prefill and decode pools
    pub disaggregated: bool,
}

/// Where the serving containers expose Prometheus metrics
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct MetricsEndpoint {
    /// Container port
    pub port: u16,
    /// HTTP path
    pub path: &'static str,
}

/// A Prometheus metric worth watching
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct KeyMetric {
    /// Metric name
    pub name: &'static str,
    /// What it measures
    pub description: &'static str,
}

/// Summary of a registered provider
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfo {
    /// Registry id
    pub id: &'static str,
    /// Human readable name
    pub display_name: &'static str,
    /// One-line description
    pub description: &'static str,
    /// Default custom resource
    pub crd: CrdConfig,
    /// Capabilities
    pub features: ProviderFeatures,
    /// Version the install steps target (cached or pinned)
    pub version: String,
}

/// A Kubernetes-native inference runtime
#[async_trait]
pub trait Provider: Send + Sync {
    /// Registry id (`kaito`, `dynamo`, `kuberay`)
    fn id(&self) -> &'static str;

    /// Human readable name
    fn display_name(&self) -> &'static str;

    /// One-line description
    fn description(&self) -> &'static str;

    /// What this runtime can serve
    fn features(&self) -> &'static ProviderFeatures;

    /// Curated premade models, for runtimes that have them
    fn catalog(&self) -> Option<&ModelCatalog> {
        None
    }

    /// Custom resource for a variant; `None` selects the default variant
    fn crd_config(&self, variant: Option<ResourceVariant>) -> CrdConfig;

    /// Custom resource matching a live object's `apiVersion`/`kind`
    fn crd_for_object(&self, _raw: &Value) -> CrdConfig {
        self.crd_config(None)
    }

    /// Where the operator runs
    fn operator(&self) -> OperatorRef;

    /// Compile a validated request into this runtime's custom resource
    ///
    /// Pure: never calls the cluster.
    fn generate_manifest(&self, request: &DeploymentRequest) -> Result<Value>;

    /// Reduce a live custom object into the canonical status
    fn parse_status(&self, raw: &Value) -> CanonicalStatus;

    /// Validate a raw request document against this runtime's features
    fn validate_config(&self, raw: &Value) -> ValidationOutcome {
        validate_request(raw, self.id(), self.features(), self.catalog())
    }

    /// Check that the CRD exists and the operator is running
    async fn check_installation(&self, cluster: &dyn ClusterQuery) -> Result<InstallationStatus> {
        install::check_installation(
            cluster,
            self.display_name(),
            &self.crd_config(None),
            &self.operator(),
        )
        .await
    }

    /// Chart repositories the install needs
    fn helm_repos(&self) -> Vec<HelmRepo>;

    /// Charts to install, at the current version
    async fn helm_charts(&self) -> Vec<HelmChart>;

    /// Ordered install commands
    async fn install_steps(&self) -> Vec<InstallStep> {
        let charts = self.helm_charts().await;
        install::render_install_steps(&self.helm_repos(), &charts)
    }

    /// What to remove on uninstall
    fn uninstall_resources(&self) -> UninstallResources;

    /// Serving metrics endpoint
    fn metrics_endpoint(&self) -> MetricsEndpoint;

    /// Metrics worth watching
    fn key_metrics(&self) -> &'static [KeyMetric];

    /// Version cache backing the install metadata
    fn versions(&self) -> &VersionCache;

    /// Latest operator version (cached, falling back to the pinned one)
    async fn latest_version(&self) -> String {
        self.versions().get().await
    }

    /// Listing summary
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            id: self.id(),
            display_name: self.display_name(),
            description: self.description(),
            crd: self.crd_config(None),
            features: *self.features(),
            version: self.versions().peek(),
        }
    }
}
