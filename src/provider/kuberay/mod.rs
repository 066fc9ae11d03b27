//! KubeRay
//!
//! Serves Hugging Face repositories with Ray Serve's vLLM integration on a
//! `RayService`: a CPU head group plus one GPU worker group.

mod compiler;
mod types;

pub use compiler::{serve_config_model_id, RAY_LLM_IMAGE, RAY_VERSION, SERVE_PORT};

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use kubefoundry_common::Result;

use crate::cluster::CrdConfig;
use crate::request::{DeploymentRequest, InferenceEngine, ModelSourceKind, ResourceVariant};
use crate::status::{
    object_phase, parse_conditions, resolve_model_id, CanonicalStatus, DeploymentMode,
    ModelIdContext, ModelIdStrategy, ObjectView, ReplicaStatus, MODEL_ANNOTATION,
};

use super::install::{HelmChart, HelmRepo, OperatorRef, UninstallResources};
use super::version::VersionCache;
use super::{KeyMetric, MetricsEndpoint, Provider, ProviderFeatures};

/// Registry id
pub const PROVIDER_ID: &str = "kuberay";

/// GitHub repository releases are looked up in
pub const GITHUB_REPOSITORY: &str = "ray-project/kuberay";

/// Operator version used when the latest release cannot be looked up
pub const PINNED_VERSION: &str = "1.4.2";

/// The RayService resource
pub const SERVICE_CRD: CrdConfig = CrdConfig {
    api_group: "ray.io",
    api_version: "v1",
    plural: "rayservices",
    kind: "RayService",
};

/// Conditions that together mean the service is serving
pub const REQUIRED_CONDITIONS: &[&str] = &["Ready"];

const OPERATOR_NAMESPACE: &str = "ray-system";
const HELM_REPO_NAME: &str = "kuberay";
const HELM_REPO_URL: &str = "https://ray-project.github.io/kuberay-helm/";

fn serve_config_applies(ctx: &ModelIdContext<'_>) -> bool {
    ctx.object.str_at("/spec/serveConfigV2").is_some()
}

fn serve_config_extract(ctx: &ModelIdContext<'_>) -> Option<String> {
    ctx.object
        .str_at("/spec/serveConfigV2")
        .and_then(serve_config_model_id)
}

/// Model id from the embedded Ray Serve config
const SERVE_CONFIG: ModelIdStrategy = ModelIdStrategy {
    name: "serve-config",
    applies: serve_config_applies,
    extract: serve_config_extract,
};

const STRATEGIES: &[ModelIdStrategy] = &[SERVE_CONFIG, MODEL_ANNOTATION];

static FEATURES: ProviderFeatures = ProviderFeatures {
    model_sources: &[ModelSourceKind::VllmHf],
    engines: &[InferenceEngine::Vllm],
    resource_variants: &[ResourceVariant::Flat],
    disaggregated: false,
};

const KEY_METRICS: &[KeyMetric] = &[
    KeyMetric {
        name: "ray_serve_num_http_requests",
        description: "HTTP requests handled by Ray Serve",
    },
    KeyMetric {
        name: "ray_serve_http_request_latency_ms",
        description: "End-to-end HTTP request latency",
    },
    KeyMetric {
        name: "ray_serve_deployment_queued_queries",
        description: "Requests waiting for a replica",
    },
    KeyMetric {
        name: "ray_vllm:num_requests_running",
        description: "Requests currently being processed by vLLM",
    },
];

/// KubeRay adapter
#[derive(Debug)]
pub struct KubeRayProvider {
    versions: VersionCache,
}

impl KubeRayProvider {
    /// Adapter with the given version cache
    pub fn new(versions: VersionCache) -> Self {
        Self { versions }
    }
}

impl Default for KubeRayProvider {
    fn default() -> Self {
        Self::new(VersionCache::new(GITHUB_REPOSITORY, PINNED_VERSION))
    }
}

/// Reduce a live RayService into the canonical status
pub fn parse_status(raw: &Value) -> CanonicalStatus {
    let object = ObjectView::new(raw);
    let conditions = parse_conditions(raw, "/status/conditions");
    let phase = object_phase(
        &object,
        object.str_at("/status/serviceStatus"),
        &conditions,
        REQUIRED_CONDITIONS,
    );

    let desired = object
        .u32_at("/spec/rayClusterConfig/workerGroupSpecs/0/replicas")
        .unwrap_or(1);
    let observed = object.u32_at("/status/numServeEndpoints").unwrap_or(0);

    let ctx = ModelIdContext::new(object, &[], None);

    CanonicalStatus {
        name: object.name().to_string(),
        namespace: object.namespace().to_string(),
        provider: PROVIDER_ID.to_string(),
        model_id: resolve_model_id(&ctx, STRATEGIES),
        engine: Some(
            object
                .engine()
                .unwrap_or_else(|| InferenceEngine::Vllm.as_str().to_string()),
        ),
        mode: DeploymentMode::Aggregated,
        phase,
        replicas: ReplicaStatus::for_phase(phase, observed, desired),
        conditions,
        frontend_service_ref: format!("{}-serve-svc", object.name()),
        created_at: object.created_at(),
    }
}

#[async_trait]
impl Provider for KubeRayProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn display_name(&self) -> &'static str {
        "KubeRay"
    }

    fn description(&self) -> &'static str {
        "Ray Serve LLM applications on a KubeRay RayService"
    }

    fn features(&self) -> &'static ProviderFeatures {
        &FEATURES
    }

    fn crd_config(&self, _variant: Option<ResourceVariant>) -> CrdConfig {
        SERVICE_CRD
    }

    fn operator(&self) -> OperatorRef {
        OperatorRef {
            namespace: OPERATOR_NAMESPACE,
            label_selector: "app.kubernetes.io/name=kuberay-operator",
        }
    }

    fn generate_manifest(&self, request: &DeploymentRequest) -> Result<Value> {
        compiler::compile(request)
    }

    fn parse_status(&self, raw: &Value) -> CanonicalStatus {
        parse_status(raw)
    }

    fn helm_repos(&self) -> Vec<HelmRepo> {
        vec![HelmRepo {
            name: HELM_REPO_NAME.to_string(),
            url: HELM_REPO_URL.to_string(),
        }]
    }

    async fn helm_charts(&self) -> Vec<HelmChart> {
        vec![HelmChart {
            name: "kuberay-operator".to_string(),
            chart: format!("{}/kuberay-operator", HELM_REPO_NAME),
            version: self.versions.get().await,
            namespace: OPERATOR_NAMESPACE.to_string(),
            create_namespace: true,
            values: BTreeMap::new(),
        }]
    }

    fn uninstall_resources(&self) -> UninstallResources {
        UninstallResources {
            namespaces: vec![OPERATOR_NAMESPACE.to_string()],
            crds: vec![
                SERVICE_CRD.crd_name(),
                "rayclusters.ray.io".to_string(),
                "rayjobs.ray.io".to_string(),
            ],
            helm_releases: vec![format!("{}/kuberay-operator", OPERATOR_NAMESPACE)],
        }
    }

    fn metrics_endpoint(&self) -> MetricsEndpoint {
        MetricsEndpoint {
            port: 8080,
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
