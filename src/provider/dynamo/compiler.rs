//! DynamoGraphDeployment compilation

use std::collections::BTreeMap;

use serde_json::Value;

use kubefoundry_common::{Error, Result};

use crate::provider::manifest::{node_selector, to_document, ManifestMetadata};
use crate::request::{DeploymentRequest, InferenceEngine, ModelSource, Topology};

use super::types::{
    DynamoGraphDeployment, DynamoGraphDeploymentSpec, DynamoResources, DynamoService,
    ExtraPodSpec, MainContainer, ResourceItem,
};
use super::GRAPH_CRD;

/// Tag of the Dynamo runtime images
pub const RUNTIME_TAG: &str = "0.5.0";

/// Port the frontend serves the OpenAI API on
pub const FRONTEND_PORT: u16 = 8000;

/// Service name of the HTTP frontend
pub const FRONTEND_SERVICE: &str = "Frontend";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WorkerRole {
    Aggregated,
    Prefill,
    Decode,
}

impl WorkerRole {
    fn service_suffix(self) -> &'static str {
        match self {
            WorkerRole::Aggregated => "Worker",
            WorkerRole::Prefill => "PrefillWorker",
            WorkerRole::Decode => "DecodeWorker",
        }
    }

    fn sub_component_type(self) -> Option<&'static str> {
        match self {
            WorkerRole::Aggregated => None,
            WorkerRole::Prefill => Some("prefill"),
            WorkerRole::Decode => Some("decode"),
        }
    }
}

/// Engine names as Dynamo spells them
struct Backend {
    framework: &'static str,
    service_prefix: &'static str,
    image_name: &'static str,
    model_flag: &'static str,
    max_len_flag: &'static str,
}

fn backend(engine: InferenceEngine) -> Result<Backend> {
    match engine {
        InferenceEngine::Vllm => Ok(Backend {
            framework: "vllm",
            service_prefix: "Vllm",
            image_name: "vllm-runtime",
            model_flag: "--model",
            max_len_flag: "--max-model-len",
        }),
        InferenceEngine::Sglang => Ok(Backend {
            framework: "sglang",
            service_prefix: "Sglang",
            image_name: "sglang-runtime",
            model_flag: "--model-path",
            max_len_flag: "--context-length",
        }),
        InferenceEngine::Trtllm => Ok(Backend {
            framework: "trtllm",
            service_prefix: "Trtllm",
            image_name: "tensorrtllm-runtime",
            model_flag: "--model-path",
            max_len_flag: "--max-seq-len",
        }),
        InferenceEngine::Llamacpp => Err(Error::validation_for_field(
            "engine",
            "dynamo does not support the llamacpp engine",
        )),
    }
}

/// Runtime image for an engine
pub fn runtime_image(engine: InferenceEngine) -> Result<String> {
    let backend = backend(engine)?;
    Ok(format!(
        "nvcr.io/nvidia/ai-dynamo/{}:{}",
        backend.image_name, RUNTIME_TAG
    ))
}

fn worker_args(
    request: &DeploymentRequest,
    backend: &Backend,
    repo: &str,
    role: WorkerRole,
    gpus: u32,
) -> Vec<String> {
    let mut args = vec![backend.model_flag.to_string(), repo.to_string()];

    if gpus > 1 {
        args.push("--tensor-parallel-size".to_string());
        args.push(gpus.to_string());
    }
    if let Some(max_len) = request.tuning.max_model_len {
        args.push(backend.max_len_flag.to_string());
        args.push(max_len.to_string());
    }

    match (request.engine, role.sub_component_type()) {
        (_, None) => {}
        (InferenceEngine::Vllm, Some("prefill")) => args.push("--is-prefill-worker".to_string()),
        (InferenceEngine::Vllm, Some(_)) => {}
        (_, Some(mode)) => {
            args.push("--disaggregation-mode".to_string());
            args.push(mode.to_string());
        }
    }
    args
}

fn worker_resources(request: &DeploymentRequest, gpus: u32) -> DynamoResources {
    let gpu = (gpus > 0).then(|| gpus.to_string());
    DynamoResources {
        requests: Some(ResourceItem {
            cpu: request.resources.cpu.clone(),
            memory: request.resources.memory.clone(),
            gpu: gpu.clone(),
        }),
        limits: gpu.map(|gpu| ResourceItem {
            gpu: Some(gpu),
            ..Default::default()
        }),
    }
}

fn worker(
    request: &DeploymentRequest,
    backend: &Backend,
    repo: &str,
    image: &str,
    role: WorkerRole,
    replicas: u32,
    gpus: u32,
) -> DynamoService {
    DynamoService {
        component_type: "worker".to_string(),
        sub_component_type: role.sub_component_type().map(str::to_string),
        replicas,
        resources: Some(worker_resources(request, gpus)),
        env_from_secret: request.tuning.hf_token_secret.clone(),
        extra_pod_spec: ExtraPodSpec {
            node_selector: node_selector(request),
            main_container: MainContainer {
                image: image.to_string(),
                command: vec![
                    "python3".to_string(),
                    "-m".to_string(),
                    format!("dynamo.{}", backend.framework),
                ],
                args: worker_args(request, backend, repo, role, gpus),
            },
        },
    }
}

fn frontend(image: &str) -> DynamoService {
    DynamoService {
        component_type: "frontend".to_string(),
        sub_component_type: None,
        replicas: 1,
        resources: None,
        env_from_secret: None,
        extra_pod_spec: ExtraPodSpec {
            node_selector: BTreeMap::new(),
            main_container: MainContainer {
                image: image.to_string(),
                command: vec![
                    "python3".to_string(),
                    "-m".to_string(),
                    "dynamo.frontend".to_string(),
                ],
                args: vec!["--http-port".to_string(), FRONTEND_PORT.to_string()],
            },
        },
    }
}

/// Compile a request into a typed graph deployment
pub fn compile_graph(request: &DeploymentRequest) -> Result<DynamoGraphDeployment> {
    let ModelSource::VllmHf { repo_id } = &request.model else {
        return Err(Error::validation_for_field(
            "modelSource",
            "dynamo serves Hugging Face repositories only",
        ));
    };
    let backend = backend(request.engine)?;
    let image = request
        .image_ref
        .clone()
        .map_or_else(|| runtime_image(request.engine), Ok)?;

    let mut services = BTreeMap::from([(FRONTEND_SERVICE.to_string(), frontend(&image))]);
    let mut add = |role: WorkerRole, replicas: u32, gpus: u32| {
        services.insert(
            format!("{}{}", backend.service_prefix, role.service_suffix()),
            worker(request, &backend, repo_id, &image, role, replicas, gpus),
        );
    };

    match request.topology {
        Topology::Aggregated => add(
            WorkerRole::Aggregated,
            request.replicas,
            request.gpus_per_replica(),
        ),
        Topology::Disaggregated { prefill, decode } => {
            add(WorkerRole::Prefill, prefill.replicas, prefill.gpus);
            add(WorkerRole::Decode, decode.replicas, decode.gpus);
        }
    }

    Ok(DynamoGraphDeployment {
        api_version: GRAPH_CRD.full_api_version(),
        kind: GRAPH_CRD.kind.to_string(),
        metadata: ManifestMetadata::for_request(request, repo_id),
        spec: DynamoGraphDeploymentSpec {
            backend_framework: backend.framework.to_string(),
            services,
        },
    })
}

/// Compile a request into a manifest document
pub fn compile(request: &DeploymentRequest) -> Result<Value> {
    to_document(GRAPH_CRD.kind, &compile_graph(request)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::manifest::fixtures;
    use crate::request::WorkerPool;
    use serde_json::json;

    #[test]
    fn aggregated_graph_has_frontend_and_one_worker() {
        let mut request = fixtures::vllm("dynamo", "Qwen/Qwen3-0.6B");
        request.replicas = 2;
        let doc = compile(&request).unwrap();

        assert_eq!(doc["apiVersion"], "nvidia.com/v1alpha1");
        assert_eq!(doc["kind"], "DynamoGraphDeployment");
        assert_eq!(doc["spec"]["backendFramework"], "vllm");

        let services = doc["spec"]["services"].as_object().unwrap();
        assert_eq!(services.len(), 2);
        assert_eq!(services["Frontend"]["componentType"], "frontend");
        assert_eq!(services["Frontend"]["replicas"], 1);

        let worker = &services["VllmWorker"];
        assert_eq!(worker["componentType"], "worker");
        assert_eq!(worker["replicas"], 2);
        assert!(worker.get("subComponentType").is_none());
        assert_eq!(worker["resources"]["limits"]["gpu"], "1");
        assert_eq!(
            worker["extraPodSpec"]["mainContainer"]["command"],
            json!(["python3", "-m", "dynamo.vllm"])
        );
        assert_eq!(
            worker["extraPodSpec"]["mainContainer"]["args"],
            json!(["--model", "Qwen/Qwen3-0.6B"])
        );
        assert_eq!(
            worker["extraPodSpec"]["mainContainer"]["image"],
            "nvcr.io/nvidia/ai-dynamo/vllm-runtime:0.5.0"
        );
        assert_eq!(
            worker["extraPodSpec"]["nodeSelector"],
            json!({"nvidia.com/gpu.present": "true"})
        );
    }

    #[test]
    fn disaggregated_graph_splits_workers() {
        let mut request = fixtures::vllm("dynamo", "Qwen/Qwen3-8B");
        request.topology = Topology::Disaggregated {
            prefill: WorkerPool { replicas: 1, gpus: 2 },
            decode: WorkerPool { replicas: 2, gpus: 1 },
        };
        let doc = compile(&request).unwrap();
        let services = doc["spec"]["services"].as_object().unwrap();
        assert_eq!(services.len(), 3);

        let prefill = &services["VllmPrefillWorker"];
        assert_eq!(prefill["subComponentType"], "prefill");
        assert_eq!(prefill["replicas"], 1);
        assert_eq!(prefill["resources"]["requests"]["gpu"], "2");
        assert_eq!(
            prefill["extraPodSpec"]["mainContainer"]["args"],
            json!([
                "--model",
                "Qwen/Qwen3-8B",
                "--tensor-parallel-size",
                "2",
                "--is-prefill-worker"
            ])
        );

        let decode = &services["VllmDecodeWorker"];
        assert_eq!(decode["subComponentType"], "decode");
        assert_eq!(decode["replicas"], 2);
        assert_eq!(
            decode["extraPodSpec"]["mainContainer"]["args"],
            json!(["--model", "Qwen/Qwen3-8B"])
        );
    }

    #[test]
    fn sglang_uses_model_path() {
        let mut request = fixtures::vllm("dynamo", "Qwen/Qwen3-8B");
        request.engine = InferenceEngine::Sglang;
        request.topology = Topology::Disaggregated {
            prefill: WorkerPool { replicas: 1, gpus: 1 },
            decode: WorkerPool { replicas: 1, gpus: 1 },
        };
        let doc = compile(&request).unwrap();
        assert_eq!(doc["spec"]["backendFramework"], "sglang");
        let prefill = &doc["spec"]["services"]["SglangPrefillWorker"];
        assert_eq!(
            prefill["extraPodSpec"]["mainContainer"]["args"],
            json!([
                "--model-path",
                "Qwen/Qwen3-8B",
                "--disaggregation-mode",
                "prefill"
            ])
        );
        assert_eq!(
            prefill["extraPodSpec"]["mainContainer"]["image"],
            "nvcr.io/nvidia/ai-dynamo/sglang-runtime:0.5.0"
        );
    }

    #[test]
    fn token_secret_and_metadata() {
        let mut request = fixtures::vllm("dynamo", "meta-llama/Llama-3.1-8B-Instruct");
        request.tuning.hf_token_secret = Some("hf-token".to_string());
        let doc = compile(&request).unwrap();
        assert_eq!(
            doc["spec"]["services"]["VllmWorker"]["envFromSecret"],
            "hf-token"
        );
        assert!(doc["spec"]["services"]["Frontend"]
            .get("envFromSecret")
            .is_none());
        assert_eq!(
            doc["metadata"]["annotations"]["kubefoundry.io/model-id"],
            "meta-llama/Llama-3.1-8B-Instruct"
        );
        assert_eq!(doc["metadata"]["labels"]["kubefoundry.io/provider"], "dynamo");
    }

    #[test]
    fn llamacpp_is_rejected() {
        let mut request = fixtures::vllm("dynamo", "org/repo");
        request.engine = InferenceEngine::Llamacpp;
        let err = compile(&request).unwrap_err();
        assert_eq!(err.field_errors()[0].field, "engine");
    }
}
