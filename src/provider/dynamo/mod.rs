//! NVIDIA Dynamo
//!
//! Serves Hugging Face repositories through vLLM, SGLang or TensorRT-LLM
//! workers behind a shared frontend, aggregated or split into prefill and
//! decode pools.

mod compiler;
mod types;

pub use compiler::{runtime_image, FRONTEND_PORT, FRONTEND_SERVICE, RUNTIME_TAG};

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use kubefoundry_common::Result;

use crate::cluster::CrdConfig;
use crate::request::{DeploymentRequest, InferenceEngine, ModelSourceKind, ResourceVariant};
use crate::status::{
    object_phase, parse_conditions, resolve_model_id, CanonicalStatus, DeploymentMode,
    ModelIdContext, ModelIdStrategy, ObjectView, Phase, ReplicaStatus, MODEL_ANNOTATION,
    MODEL_FLAG, MODEL_PATH_FLAG,
};

use super::install::{HelmChart, HelmRepo, OperatorRef, UninstallResources};
use super::version::VersionCache;
use super::{KeyMetric, MetricsEndpoint, Provider, ProviderFeatures};

/// Registry id
pub const PROVIDER_ID: &str = "dynamo";

/// GitHub repository releases are looked up in
pub const GITHUB_REPOSITORY: &str = "ai-dynamo/dynamo";

/// Platform version used when the latest release cannot be looked up
pub const PINNED_VERSION: &str = "0.5.0";

/// The graph deployment resource
pub const GRAPH_CRD: CrdConfig = CrdConfig {
    api_group: "nvidia.com",
    api_version: "v1alpha1",
    plural: "dynamographdeployments",
    kind: "DynamoGraphDeployment",
};

/// Conditions that together mean the graph is serving
pub const REQUIRED_CONDITIONS: &[&str] = &["Ready"];

const OPERATOR_NAMESPACE: &str = "dynamo-system";
const HELM_REPO_BASE: &str = "https://helm.ngc.nvidia.com/nvidia/ai-dynamo/charts";

const STRATEGIES: &[ModelIdStrategy] = &[MODEL_FLAG, MODEL_PATH_FLAG, MODEL_ANNOTATION];

static FEATURES: ProviderFeatures = ProviderFeatures {
    model_sources: &[ModelSourceKind::VllmHf],
    engines: &[
        InferenceEngine::Vllm,
        InferenceEngine::Sglang,
        InferenceEngine::Trtllm,
    ],
    resource_variants: &[ResourceVariant::Flat],
    disaggregated: true,
};

const KEY_METRICS: &[KeyMetric] = &[
    KeyMetric {
        name: "dynamo_frontend_requests_total",
        description: "Requests received by the frontend",
    },
    KeyMetric {
        name: "dynamo_frontend_inflight_requests",
        description: "Requests currently in flight",
    },
    KeyMetric {
        name: "dynamo_frontend_time_to_first_token_seconds",
        description: "Latency until the first generated token",
    },
    KeyMetric {
        name: "dynamo_frontend_inter_token_latency_seconds",
        description: "Latency between generated tokens",
    },
];

/// Dynamo adapter
#[derive(Debug)]
pub struct DynamoProvider {
    versions: VersionCache,
}

impl DynamoProvider {
    /// Adapter with the given version cache
    pub fn new(versions: VersionCache) -> Self {
        Self { versions }
    }
}

impl Default for DynamoProvider {
    fn default() -> Self {
        Self::new(VersionCache::new(GITHUB_REPOSITORY, PINNED_VERSION))
    }
}

fn worker_services(raw: &Value) -> Vec<&Value> {
    raw.pointer("/spec/services")
        .and_then(Value::as_object)
        .map(|services| {
            services
                .values()
                .filter(|s| s.get("componentType").and_then(Value::as_str) == Some("worker"))
                .collect()
        })
        .unwrap_or_default()
}

/// Reduce a live graph deployment into the canonical status
pub fn parse_status(raw: &Value) -> CanonicalStatus {
    let object = ObjectView::new(raw);
    let workers = worker_services(raw);

    let raw_phase = object.str_at("/status/state").map(|state| {
        if state.eq_ignore_ascii_case("successful") {
            "running"
        } else {
            state
        }
    });
    let conditions = parse_conditions(raw, "/status/conditions");
    let phase = object_phase(&object, raw_phase, &conditions, REQUIRED_CONDITIONS);

    let desired = workers
        .iter()
        .filter_map(|w| w.get("replicas").and_then(Value::as_u64))
        .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
        .fold(0u32, u32::saturating_add)
        .max(1);
    let observed = if phase == Phase::Running { desired } else { 0 };

    let mode = if workers.iter().any(|w| w.get("subComponentType").is_some()) {
        DeploymentMode::Disaggregated
    } else {
        DeploymentMode::Aggregated
    };

    let containers: Vec<&Value> = workers
        .iter()
        .filter_map(|w| w.pointer("/extraPodSpec/mainContainer"))
        .collect();
    let ctx = ModelIdContext::new(object, &containers, None);

    CanonicalStatus {
        name: object.name().to_string(),
        namespace: object.namespace().to_string(),
        provider: PROVIDER_ID.to_string(),
        model_id: resolve_model_id(&ctx, STRATEGIES),
        engine: object
            .engine()
            .or_else(|| object.str_at("/spec/backendFramework").map(str::to_string)),
        mode,
        phase,
        replicas: ReplicaStatus::for_phase(phase, observed, desired),
        conditions,
        frontend_service_ref: format!("{}-frontend", object.name()),
        created_at: object.created_at(),
    }
}

#[async_trait]
impl Provider for DynamoProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn display_name(&self) -> &'static str {
        "NVIDIA Dynamo"
    }

    fn description(&self) -> &'static str {
        "Datacenter-scale serving with vLLM, SGLang or TensorRT-LLM and disaggregated prefill/decode"
    }

    fn features(&self) -> &'static ProviderFeatures {
        &FEATURES
    }

    fn crd_config(&self, _variant: Option<ResourceVariant>) -> CrdConfig {
        GRAPH_CRD
    }

    fn operator(&self) -> OperatorRef {
        OperatorRef {
            namespace: OPERATOR_NAMESPACE,
            label_selector: "app.kubernetes.io/name=dynamo-operator",
        }
    }

    fn generate_manifest(&self, request: &DeploymentRequest) -> Result<Value> {
        compiler::compile(request)
    }

    fn parse_status(&self, raw: &Value) -> CanonicalStatus {
        parse_status(raw)
    }

    fn helm_repos(&self) -> Vec<HelmRepo> {
        Vec::new()
    }

    async fn helm_charts(&self) -> Vec<HelmChart> {
        let version = self.versions.get().await;
        ["dynamo-crds", "dynamo-platform"]
            .iter()
            .map(|chart| HelmChart {
                name: chart.to_string(),
                chart: format!("{}/{}-{}.tgz", HELM_REPO_BASE, chart, version),
                version: version.clone(),
                namespace: OPERATOR_NAMESPACE.to_string(),
                create_namespace: true,
                values: BTreeMap::new(),
            })
            .collect()
    }

    fn uninstall_resources(&self) -> UninstallResources {
        UninstallResources {
            namespaces: vec![OPERATOR_NAMESPACE.to_string()],
            crds: vec![
                GRAPH_CRD.crd_name(),
                "dynamocomponentdeployments.nvidia.com".to_string(),
            ],
            helm_releases: vec![
                format!("{}/dynamo-platform", OPERATOR_NAMESPACE),
                format!("{}/dynamo-crds", OPERATOR_NAMESPACE),
            ],
        }
    }

    fn metrics_endpoint(&self) -> MetricsEndpoint {
        MetricsEndpoint {
            port: FRONTEND_PORT,
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
