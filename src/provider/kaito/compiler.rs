//! Workspace / InferenceSet compilation
//!
//! Both variants share the same pod template and resource block; only the
//! envelope differs.

use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EmptyDirVolumeSource, HTTPGetAction, PodSpec, PodTemplateSpec,
    Probe, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde_json::Value;

use kubefoundry_common::{Error, Result};

use crate::catalog::ModelCatalog;
use crate::provider::manifest::{
    container_resources, hf_token_env, node_selector, standard_labels, to_document,
    ManifestMetadata,
};
use crate::request::{ComputeType, DeploymentRequest, GgufRunMode, ModelSource, ResourceVariant};

use super::types::{
    InferenceSet, InferenceSetSpec, InferenceSetTemplate, InferenceSpec, Workspace,
    WorkspaceResource,
};
use super::{INFERENCE_SET_CRD, WORKSPACE_CRD};

/// Port every KAITO serving container listens on
pub const SERVING_PORT: i32 = 5000;

/// llama.cpp runner for CPU nodes
pub const LLAMA_CPP_CPU_RUNNER: &str = "ghcr.io/kaito-project/aikit/runners/llama-cpp-cpu:latest";

/// llama.cpp runner for CUDA nodes
pub const LLAMA_CPP_CUDA_RUNNER: &str = "ghcr.io/kaito-project/aikit/runners/llama-cpp-cuda:latest";

/// vLLM OpenAI-compatible server
pub const VLLM_IMAGE: &str = "vllm/vllm-openai:v0.10.1";

const CONTAINER_NAME: &str = "model";
const SHM_VOLUME: &str = "dshm";
const HEALTH_PATH: &str = "/health";
const LIVENESS_INITIAL_DELAY: i32 = 600;
const READINESS_INITIAL_DELAY: i32 = 30;

/// Image, command and arguments of the serving container
#[derive(Clone, Debug, PartialEq, Eq)]
struct Serving {
    image: String,
    command: Vec<String>,
    args: Vec<String>,
    vllm: bool,
}

fn run_args() -> Vec<String> {
    vec!["run".to_string(), format!("--address=:{}", SERVING_PORT)]
}

fn resolve_serving(request: &DeploymentRequest, catalog: &ModelCatalog) -> Result<Serving> {
    let generic = |image: String| Serving {
        image,
        command: Vec::new(),
        args: run_args(),
        vllm: false,
    };

    match &request.model {
        ModelSource::Premade { key } => match &request.image_ref {
            Some(image) => Ok(generic(image.clone())),
            None => catalog
                .get(key)
                .map(|entry| generic(entry.image.to_string()))
                .ok_or_else(|| Error::unknown_catalog_entry("kaito", key.as_str())),
        },
        ModelSource::HuggingFaceGguf {
            repo_id,
            filename,
            run_mode: GgufRunMode::Direct,
        } => {
            let runner = match request.compute_type {
                ComputeType::Cpu => LLAMA_CPP_CPU_RUNNER,
                ComputeType::Gpu => LLAMA_CPP_CUDA_RUNNER,
            };
            let mut args = run_args();
            args.push(format!("huggingface://{}/{}", repo_id, filename));
            Ok(Serving {
                image: request.image_ref.clone().unwrap_or_else(|| runner.to_string()),
                command: Vec::new(),
                args,
                vllm: false,
            })
        }
        ModelSource::HuggingFaceGguf {
            run_mode: GgufRunMode::Build,
            ..
        } => request.image_ref.clone().map(generic).ok_or_else(|| {
            Error::validation_for_field("imageRef", "build mode needs a pre-built image reference")
        }),
        ModelSource::VllmHf { repo_id } => {
            let mut args = vec![
                "--model".to_string(),
                repo_id.clone(),
                "--tensor-parallel-size".to_string(),
                request.gpus_per_replica().max(1).to_string(),
            ];
            if let Some(max_len) = request.tuning.max_model_len {
                args.push("--max-model-len".to_string());
                args.push(max_len.to_string());
            }
            args.push("--trust-remote-code".to_string());
            args.push("--port".to_string());
            args.push(SERVING_PORT.to_string());

            Ok(Serving {
                image: request
                    .image_ref
                    .clone()
                    .unwrap_or_else(|| VLLM_IMAGE.to_string()),
                command: ["python3", "-m", "vllm.entrypoints.openai.api_server"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                args,
                vllm: true,
            })
        }
    }
}

/// Logical model identity written to the model-id annotation
pub fn model_identity(request: &DeploymentRequest, catalog: &ModelCatalog) -> String {
    match &request.model {
        ModelSource::Premade { key } => catalog
            .get(key)
            .map(|entry| entry.model_name.to_string())
            .unwrap_or_else(|| key.clone()),
        ModelSource::HuggingFaceGguf { filename, .. } => filename.clone(),
        ModelSource::VllmHf { repo_id } => repo_id.clone(),
    }
}

fn health_probe(initial_delay: i32) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(HEALTH_PATH.to_string()),
            port: IntOrString::Int(SERVING_PORT),
            ..Default::default()
        }),
        initial_delay_seconds: Some(initial_delay),
        period_seconds: Some(10),
        ..Default::default()
    }
}

fn pod_template(request: &DeploymentRequest, serving: Serving) -> PodTemplateSpec {
    let mut container = Container {
        name: CONTAINER_NAME.to_string(),
        image: Some(serving.image),
        command: (!serving.command.is_empty()).then_some(serving.command),
        args: Some(serving.args),
        ports: Some(vec![ContainerPort {
            container_port: SERVING_PORT,
            name: Some("http".to_string()),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        resources: container_resources(&request.resources, request.gpus_per_replica()),
        env: hf_token_env(request).map(|env| vec![env]),
        ..Default::default()
    };

    let mut volumes = None;
    if serving.vllm {
        container.volume_mounts = Some(vec![VolumeMount {
            name: SHM_VOLUME.to_string(),
            mount_path: "/dev/shm".to_string(),
            ..Default::default()
        }]);
        container.liveness_probe = Some(health_probe(LIVENESS_INITIAL_DELAY));
        container.readiness_probe = Some(health_probe(READINESS_INITIAL_DELAY));
        volumes = Some(vec![Volume {
            name: SHM_VOLUME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource {
                medium: Some("Memory".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }]);
    }

    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(standard_labels(request)),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            containers: vec![container],
            volumes,
            ..Default::default()
        }),
    }
}

fn resource_block(request: &DeploymentRequest, count: Option<u32>) -> WorkspaceResource {
    WorkspaceResource {
        count,
        instance_type: request.placement.instance_type.clone(),
        label_selector: LabelSelector {
            match_labels: Some(node_selector(request)),
            ..Default::default()
        },
        preferred_nodes: request.placement.preferred_nodes.clone(),
    }
}

/// Compile the flat `Workspace` shape
pub fn compile_workspace(request: &DeploymentRequest, catalog: &ModelCatalog) -> Result<Workspace> {
    let serving = resolve_serving(request, catalog)?;
    Ok(Workspace {
        api_version: WORKSPACE_CRD.full_api_version(),
        kind: WORKSPACE_CRD.kind.to_string(),
        metadata: ManifestMetadata::for_request(request, &model_identity(request, catalog)),
        resource: resource_block(request, Some(request.replicas)),
        inference: InferenceSpec {
            template: pod_template(request, serving),
        },
    })
}

/// Compile the nested `InferenceSet` shape
pub fn compile_inference_set(
    request: &DeploymentRequest,
    catalog: &ModelCatalog,
) -> Result<InferenceSet> {
    let serving = resolve_serving(request, catalog)?;
    Ok(InferenceSet {
        api_version: INFERENCE_SET_CRD.full_api_version(),
        kind: INFERENCE_SET_CRD.kind.to_string(),
        metadata: ManifestMetadata::for_request(request, &model_identity(request, catalog)),
        spec: InferenceSetSpec {
            replicas: request.replicas,
            template: InferenceSetTemplate {
                resource: resource_block(request, None),
                inference: InferenceSpec {
                    template: pod_template(request, serving),
                },
            },
        },
    })
}

/// Compile a request into the variant it asks for
pub fn compile(request: &DeploymentRequest, catalog: &ModelCatalog) -> Result<Value> {
    match request.resource_variant {
        ResourceVariant::Flat => {
            to_document(WORKSPACE_CRD.kind, &compile_workspace(request, catalog)?)
        }
        ResourceVariant::Nested => to_document(
            INFERENCE_SET_CRD.kind,
            &compile_inference_set(request, catalog)?,
        ),
    }
}
