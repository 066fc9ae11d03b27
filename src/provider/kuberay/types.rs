//! RayService serialization types

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::PodTemplateSpec;
use serde::{Deserialize, Serialize};

use crate::provider::ManifestMetadata;

/// `ray.io/v1` RayService
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RayService {
    pub api_version: String,
    pub kind: String,
    pub metadata: ManifestMetadata,
    pub spec: RayServiceSpec,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RayServiceSpec {
    /// Ray Serve config, embedded as a YAML string
    #[serde(rename = "serveConfigV2")]
    pub serve_config_v2: String,
    pub ray_cluster_config: RayClusterConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RayClusterConfig {
    pub ray_version: String,
    pub head_group_spec: HeadGroupSpec,
    pub worker_group_specs: Vec<WorkerGroupSpec>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HeadGroupSpec {
    pub ray_start_params: BTreeMap<String, String>,
    pub template: PodTemplateSpec,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkerGroupSpec {
    pub group_name: String,
    pub replicas: u32,
    pub min_replicas: u32,
    pub max_replicas: u32,
    pub ray_start_params: BTreeMap<String, String>,
    pub template: PodTemplateSpec,
}

// Ray Serve's own config keeps Python's snake_case field names.

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ServeConfig {
    pub applications: Vec<ServeApplication>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ServeApplication {
    pub name: String,
    pub import_path: String,
    pub route_prefix: String,
    pub args: LlmAppArgs,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LlmAppArgs {
    pub llm_configs: Vec<LlmConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LlmConfig {
    pub model_loading_config: ModelLoadingConfig,
    pub engine_kwargs: EngineKwargs,
    pub deployment_config: DeploymentConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ModelLoadingConfig {
    pub model_id: String,
    pub model_source: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EngineKwargs {
    pub tensor_parallel_size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_model_len: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DeploymentConfig {
    pub autoscaling_config: AutoscalingConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AutoscalingConfig {
    pub min_replicas: u32,
    pub max_replicas: u32,
}
