//! RayService compilation

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Container, ContainerPort, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::Value;

use kubefoundry_common::{Error, Result};

use crate::provider::manifest::{
    container_resources, hf_token_env, node_selector, standard_labels, to_document,
    ManifestMetadata,
};
use crate::request::{DeploymentRequest, ModelSource, ResourceShape};

use super::types::{
    AutoscalingConfig, DeploymentConfig, EngineKwargs, HeadGroupSpec, LlmAppArgs, LlmConfig,
    ModelLoadingConfig, RayClusterConfig, RayService, RayServiceSpec, ServeApplication,
    ServeConfig, WorkerGroupSpec,
};
use super::SERVICE_CRD;

/// Ray release the cluster runs
pub const RAY_VERSION: &str = "2.46.0";

/// Ray image with the LLM serving extras
pub const RAY_LLM_IMAGE: &str = "rayproject/ray-llm:2.46.0-py311-cu124";

/// Port Ray Serve answers HTTP on
pub const SERVE_PORT: i32 = 8000;

const LLM_IMPORT_PATH: &str = "ray.serve.llm:build_openai_app";
const WORKER_GROUP: &str = "gpu-group";

fn ports(named: &[(&str, i32)]) -> Vec<ContainerPort> {
    named
        .iter()
        .map(|(name, port)| ContainerPort {
            name: Some(name.to_string()),
            container_port: *port,
            ..Default::default()
        })
        .collect()
}

/// Ray Serve application config for one LLM
fn serve_config(request: &DeploymentRequest, repo: &str) -> ServeConfig {
    ServeConfig {
        applications: vec![ServeApplication {
            name: "llms".to_string(),
            import_path: LLM_IMPORT_PATH.to_string(),
            route_prefix: "/".to_string(),
            args: LlmAppArgs {
                llm_configs: vec![LlmConfig {
                    model_loading_config: ModelLoadingConfig {
                        model_id: repo.to_string(),
                        model_source: repo.to_string(),
                    },
                    engine_kwargs: EngineKwargs {
                        tensor_parallel_size: request.gpus_per_replica().max(1),
                        max_model_len: request.tuning.max_model_len,
                    },
                    deployment_config: DeploymentConfig {
                        autoscaling_config: AutoscalingConfig {
                            min_replicas: request.replicas,
                            max_replicas: request.replicas,
                        },
                    },
                }],
            },
        }],
    }
}

fn head_group(request: &DeploymentRequest, image: &str) -> HeadGroupSpec {
    let head_shape = ResourceShape {
        memory: Some("8Gi".to_string()),
        cpu: Some("2".to_string()),
        gpu: None,
    };
    HeadGroupSpec {
        ray_start_params: BTreeMap::from([("dashboard-host".to_string(), "0.0.0.0".to_string())]),
        template: PodTemplateSpec {
            metadata: Some(ObjectMeta {
                labels: Some(standard_labels(request)),
                ..Default::default()
            }),
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "ray-head".to_string(),
                    image: Some(image.to_string()),
                    ports: Some(ports(&[
                        ("gcs-server", 6379),
                        ("dashboard", 8265),
                        ("client", 10001),
                        ("serve", SERVE_PORT),
                    ])),
                    resources: container_resources(&head_shape, 0),
                    env: hf_token_env(request).map(|env| vec![env]),
                    ..Default::default()
                }],
                ..Default::default()
            }),
        },
    }
}

fn worker_group(request: &DeploymentRequest, image: &str) -> WorkerGroupSpec {
    WorkerGroupSpec {
        group_name: WORKER_GROUP.to_string(),
        replicas: request.replicas,
        min_replicas: request.replicas,
        max_replicas: request.replicas,
        ray_start_params: BTreeMap::new(),
        template: PodTemplateSpec {
            metadata: Some(ObjectMeta {
                labels: Some(standard_labels(request)),
                ..Default::default()
            }),
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "llm".to_string(),
                    image: Some(image.to_string()),
                    resources: container_resources(&request.resources, request.gpus_per_replica()),
                    env: hf_token_env(request).map(|env| vec![env]),
                    ..Default::default()
                }],
                node_selector: Some(node_selector(request)),
                ..Default::default()
            }),
        },
    }
}

/// Compile a request into a typed RayService
pub fn compile_service(request: &DeploymentRequest) -> Result<RayService> {
    let ModelSource::VllmHf { repo_id } = &request.model else {
        return Err(Error::validation_for_field(
            "modelSource",
            "kuberay serves Hugging Face repositories only",
        ));
    };
    let image = request.image_ref.as_deref().unwrap_or(RAY_LLM_IMAGE);

    let serve_config_v2 = serde_yaml::to_string(&serve_config(request, repo_id))
        .map_err(|e| Error::serialization_for_kind("serveConfigV2", e.to_string()))?;

    Ok(RayService {
        api_version: SERVICE_CRD.full_api_version(),
        kind: SERVICE_CRD.kind.to_string(),
        metadata: ManifestMetadata::for_request(request, repo_id),
        spec: RayServiceSpec {
            serve_config_v2,
            ray_cluster_config: RayClusterConfig {
                ray_version: RAY_VERSION.to_string(),
                head_group_spec: head_group(request, image),
                worker_group_specs: vec![worker_group(request, image)],
            },
        },
    })
}

/// Compile a request into a manifest document
pub fn compile(request: &DeploymentRequest) -> Result<Value> {
    to_document(SERVICE_CRD.kind, &compile_service(request)?)
}

/// Model id of the first LLM in an embedded serve config
pub fn serve_config_model_id(serve_config: &str) -> Option<String> {
    let config: ServeConfig = serde_yaml::from_str(serve_config).ok()?;
    config
        .applications
        .into_iter()
        .flat_map(|app| app.args.llm_configs)
        .map(|llm| llm.model_loading_config.model_id)
        .find(|id| !id.is_empty())
}
