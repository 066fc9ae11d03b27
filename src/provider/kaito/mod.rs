//! KAITO (Kubernetes AI Toolchain Operator)
//!
//! Serves premade AIKit images, GGUF files through llama.cpp and Hugging Face
//! repositories through vLLM, as either a flat `Workspace` or a nested
//! `InferenceSet`.

mod catalog;
mod compiler;
mod status;
mod types;

pub use catalog::KAITO_CATALOG;
pub use compiler::{
    model_identity, LLAMA_CPP_CPU_RUNNER, LLAMA_CPP_CUDA_RUNNER, SERVING_PORT, VLLM_IMAGE,
};
pub use status::REQUIRED_CONDITIONS;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use kubefoundry_common::Result;

use crate::catalog::ModelCatalog;
use crate::cluster::CrdConfig;
use crate::request::{DeploymentRequest, InferenceEngine, ModelSourceKind, ResourceVariant};
use crate::status::CanonicalStatus;

use super::install::{HelmChart, HelmRepo, OperatorRef, UninstallResources};
use super::version::VersionCache;
use super::{KeyMetric, MetricsEndpoint, Provider, ProviderFeatures};

/// Registry id
pub const PROVIDER_ID: &str = "kaito";

/// GitHub repository releases are looked up in
pub const GITHUB_REPOSITORY: &str = "kaito-project/kaito";

/// Operator version used when the latest release cannot be looked up
pub const PINNED_VERSION: &str = "0.6.0";

/// Flat variant
pub const WORKSPACE_CRD: CrdConfig = CrdConfig {
    api_group: "kaito.sh",
    api_version: "v1beta1",
    plural: "workspaces",
    kind: "Workspace",
};

/// Nested variant
pub const INFERENCE_SET_CRD: CrdConfig = CrdConfig {
    api_group: "kaito.sh",
    api_version: "v1alpha1",
    plural: "inferencesets",
    kind: "InferenceSet",
};

const OPERATOR_NAMESPACE: &str = "kaito-workspace";
const HELM_REPO_NAME: &str = "kaito";
const HELM_REPO_URL: &str = "https://kaito-project.github.io/kaito/charts/kaito";

static FEATURES: ProviderFeatures = ProviderFeatures {
    model_sources: &[
        ModelSourceKind::Premade,
        ModelSourceKind::HuggingFaceGguf,
        ModelSourceKind::VllmHf,
    ],
    engines: &[InferenceEngine::Llamacpp, InferenceEngine::Vllm],
    resource_variants: &[ResourceVariant::Flat, ResourceVariant::Nested],
    disaggregated: false,
};

const KEY_METRICS: &[KeyMetric] = &[
    KeyMetric {
        name: "vllm:num_requests_running",
        description: "Requests currently being processed",
    },
    KeyMetric {
        name: "vllm:num_requests_waiting",
        description: "Requests queued for processing",
    },
    KeyMetric {
        name: "vllm:gpu_cache_usage_perc",
        description: "KV cache utilization on the GPU",
    },
    KeyMetric {
        name: "vllm:time_to_first_token_seconds",
        description: "Latency until the first generated token",
    },
    KeyMetric {
        name: "vllm:e2e_request_latency_seconds",
        description: "End-to-end request latency",
    },
];

/// KAITO adapter
#[derive(Debug)]
pub struct KaitoProvider {
    versions: VersionCache,
}

impl KaitoProvider {
    /// Adapter with the given version cache
    pub fn new(versions: VersionCache) -> Self {
        Self { versions }
    }
}

impl Default for KaitoProvider {
    fn default() -> Self {
        Self::new(VersionCache::new(GITHUB_REPOSITORY, PINNED_VERSION))
    }
}

#[async_trait]
impl Provider for KaitoProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn display_name(&self) -> &'static str {
        "KAITO"
    }

    fn description(&self) -> &'static str {
        "Kubernetes AI Toolchain Operator: premade AIKit images, GGUF via llama.cpp, and vLLM"
    }

    fn features(&self) -> &'static ProviderFeatures {
        &FEATURES
    }

    fn catalog(&self) -> Option<&ModelCatalog> {
        Some(&KAITO_CATALOG)
    }

    fn crd_config(&self, variant: Option<ResourceVariant>) -> CrdConfig {
        match variant.unwrap_or_default() {
            ResourceVariant::Flat => WORKSPACE_CRD,
            ResourceVariant::Nested => INFERENCE_SET_CRD,
        }
    }

    fn crd_for_object(&self, raw: &Value) -> CrdConfig {
        match raw.get("kind").and_then(Value::as_str) {
            Some(kind) if kind == INFERENCE_SET_CRD.kind => INFERENCE_SET_CRD,
            _ => WORKSPACE_CRD,
        }
    }

    fn operator(&self) -> OperatorRef {
        OperatorRef {
            namespace: OPERATOR_NAMESPACE,
            label_selector: "app.kubernetes.io/name=workspace",
        }
    }

    fn generate_manifest(&self, request: &DeploymentRequest) -> Result<Value> {
        compiler::compile(request, &KAITO_CATALOG)
    }

    fn parse_status(&self, raw: &Value) -> CanonicalStatus {
        status::parse_status(raw, &KAITO_CATALOG)
    }

    fn helm_repos(&self) -> Vec<HelmRepo> {
        vec![HelmRepo {
            name: HELM_REPO_NAME.to_string(),
            url: HELM_REPO_URL.to_string(),
        }]
    }

    async fn helm_charts(&self) -> Vec<HelmChart> {
        vec![HelmChart {
            name: "kaito-workspace".to_string(),
            chart: format!("{}/workspace", HELM_REPO_NAME),
            version: self.versions.get().await,
            namespace: OPERATOR_NAMESPACE.to_string(),
            create_namespace: true,
            values: BTreeMap::from([(
                "featureGates.enableInferenceSetController".to_string(),
                "true".to_string(),
            )]),
        }]
    }

    fn uninstall_resources(&self) -> UninstallResources {
        UninstallResources {
            namespaces: vec![OPERATOR_NAMESPACE.to_string()],
            crds: vec![WORKSPACE_CRD.crd_name(), INFERENCE_SET_CRD.crd_name()],
            helm_releases: vec![format!("{}/kaito-workspace", OPERATOR_NAMESPACE)],
        }
    }

    fn metrics_endpoint(&self) -> MetricsEndpoint {
        MetricsEndpoint {
            port: 5000,
            path: "/metrics",
        }
    }

    fn key_metrics(&self) -> &'static [KeyMetric] {
        KEY_METRICS
    }

    fn versions(&self) -> &VersionCache {
        &self.versions
    }
}
