//! Deployment request model
//!
//! [`DeploymentInput`] is the lenient wire form operators submit (every field
//! optional, camelCase JSON or YAML). Validation turns it into the typed,
//! provider-agnostic [`DeploymentRequest`] that compilers consume.

use std::collections::BTreeMap;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Largest replica count a single deployment may ask for
pub const MAX_REPLICAS: u32 = 10;

/// Longest allowed deployment name (DNS label)
pub const MAX_NAME_LENGTH: usize = 63;

/// Most GPUs a single worker may ask for; no node advertises more
pub const MAX_GPUS_PER_WORKER: u32 = 64;

/// Replica count when the request does not give one
pub const DEFAULT_REPLICAS: u32 = 1;

/// Where a deployment runs
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ComputeType {
    /// CPU only
    #[default]
    Cpu,
    /// NVIDIA GPU nodes
    Gpu,
}

impl ComputeType {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            ComputeType::Cpu => "cpu",
            ComputeType::Gpu => "gpu",
        }
    }

    /// Parse a wire name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cpu" => Some(ComputeType::Cpu),
            "gpu" => Some(ComputeType::Gpu),
            _ => None,
        }
    }
}

impl fmt::Display for ComputeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a GGUF model is packaged
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum GgufRunMode {
    /// A generic llama.cpp runner downloads the file at startup
    #[default]
    Direct,
    /// The model was baked into an image beforehand (`imageRef`)
    Build,
}

impl GgufRunMode {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            GgufRunMode::Direct => "direct",
            GgufRunMode::Build => "build",
        }
    }

    /// Parse a wire name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "direct" => Some(GgufRunMode::Direct),
            "build" => Some(GgufRunMode::Build),
            _ => None,
        }
    }
}

/// Which custom-resource shape a provider emits
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResourceVariant {
    /// `resource`/`inference` at the top level of the object
    #[default]
    Flat,
    /// `spec.replicas` plus a `spec.template` wrapping the flat fields
    Nested,
}

impl ResourceVariant {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceVariant::Flat => "flat",
            ResourceVariant::Nested => "nested",
        }
    }

    /// Parse a wire name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "flat" => Some(ResourceVariant::Flat),
            "nested" => Some(ResourceVariant::Nested),
            _ => None,
        }
    }
}

/// Serving engine inside the runtime
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum InferenceEngine {
    /// vLLM OpenAI-compatible server
    Vllm,
    /// SGLang
    Sglang,
    /// TensorRT-LLM
    Trtllm,
    /// llama.cpp (GGUF models)
    Llamacpp,
}

impl InferenceEngine {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            InferenceEngine::Vllm => "vllm",
            InferenceEngine::Sglang => "sglang",
            InferenceEngine::Trtllm => "trtllm",
            InferenceEngine::Llamacpp => "llamacpp",
        }
    }

    /// Parse a wire name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "vllm" => Some(InferenceEngine::Vllm),
            "sglang" => Some(InferenceEngine::Sglang),
            "trtllm" => Some(InferenceEngine::Trtllm),
            "llamacpp" => Some(InferenceEngine::Llamacpp),
            _ => None,
        }
    }

    /// Engine used when the request does not name one
    pub fn default_for(source: ModelSourceKind) -> Self {
        match source {
            ModelSourceKind::VllmHf => InferenceEngine::Vllm,
            ModelSourceKind::Premade | ModelSourceKind::HuggingFaceGguf => {
                InferenceEngine::Llamacpp
            }
        }
    }

    /// Whether this engine can load models from the given source
    pub fn serves(&self, source: ModelSourceKind) -> bool {
        match self {
            InferenceEngine::Llamacpp => source != ModelSourceKind::VllmHf,
            _ => source == ModelSourceKind::VllmHf,
        }
    }
}

impl fmt::Display for InferenceEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discriminant of [`ModelSource`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ModelSourceKind {
    /// Curated catalog model
    #[serde(rename = "premade")]
    Premade,
    /// GGUF file from a Hugging Face repository
    #[serde(rename = "huggingface-gguf")]
    HuggingFaceGguf,
    /// Hugging Face repository served by vLLM
    #[serde(rename = "vllm-hf")]
    VllmHf,
}

impl ModelSourceKind {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelSourceKind::Premade => "premade",
            ModelSourceKind::HuggingFaceGguf => "huggingface-gguf",
            ModelSourceKind::VllmHf => "vllm-hf",
        }
    }

    /// Parse a wire name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "premade" => Some(ModelSourceKind::Premade),
            "huggingface-gguf" => Some(ModelSourceKind::HuggingFaceGguf),
            "vllm-hf" => Some(ModelSourceKind::VllmHf),
            _ => None,
        }
    }
}

impl fmt::Display for ModelSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where model weights come from
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ModelSource {
    /// A curated catalog entry, addressed by key (e.g. `llama3.2:3b`)
    #[serde(rename = "premade")]
    Premade {
        /// Catalog key
        key: String,
    },
    /// A single GGUF file from a Hugging Face repository
    #[serde(rename = "huggingface-gguf", rename_all = "camelCase")]
    HuggingFaceGguf {
        /// `org/repo`
        repo_id: String,
        /// GGUF file inside the repository
        filename: String,
        /// How the file is packaged
        run_mode: GgufRunMode,
    },
    /// A Hugging Face repository served by vLLM
    #[serde(rename = "vllm-hf", rename_all = "camelCase")]
    VllmHf {
        /// `org/repo`
        repo_id: String,
    },
}

impl ModelSource {
    /// Discriminant
    pub fn kind(&self) -> ModelSourceKind {
        match self {
            ModelSource::Premade { .. } => ModelSourceKind::Premade,
            ModelSource::HuggingFaceGguf { .. } => ModelSourceKind::HuggingFaceGguf,
            ModelSource::VllmHf { .. } => ModelSourceKind::VllmHf,
        }
    }

    /// Hugging Face repository id, for sources that have one
    pub fn repo_id(&self) -> Option<&str> {
        match self {
            ModelSource::Premade { .. } => None,
            ModelSource::HuggingFaceGguf { repo_id, .. } | ModelSource::VllmHf { repo_id } => {
                Some(repo_id)
            }
        }
    }
}

/// Per-replica resource requests
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceShape {
    /// Memory request (Kubernetes quantity, e.g. `16Gi`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    /// CPU request (Kubernetes quantity, e.g. `4`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    /// GPUs per replica
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu: Option<u32>,
}

/// Where pods may be scheduled
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementHints {
    /// Node labels that replace the default selector entirely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_selector: Option<BTreeMap<String, String>>,
    /// Node names the runtime should prefer
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preferred_nodes: Vec<String>,
    /// Cloud instance type for runtimes that provision nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_type: Option<String>,
}

/// Engine knobs
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineTuning {
    /// Maximum sequence length
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_model_len: Option<u32>,
    /// Secret holding `HF_TOKEN` for gated models
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hf_token_secret: Option<String>,
}

/// One side of a disaggregated deployment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkerPool {
    /// Worker count
    pub replicas: u32,
    /// GPUs per worker
    pub gpus: u32,
}

/// Serving topology
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Topology {
    /// Every worker does prefill and decode
    #[default]
    Aggregated,
    /// Separate prefill and decode worker pools
    Disaggregated {
        /// Prefill workers
        prefill: WorkerPool,
        /// Decode workers
        decode: WorkerPool,
    },
}

impl Topology {
    /// Wire name of the mode
    pub fn mode_str(&self) -> &'static str {
        match self {
            Topology::Aggregated => "aggregated",
            Topology::Disaggregated { .. } => "disaggregated",
        }
    }
}

/// A validated, provider-agnostic deployment request
///
/// Only produced by validation; compilers may assume every invariant holds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRequest {
    /// DNS label, at most 63 characters
    pub name: String,
    /// Target namespace
    pub namespace: String,
    /// Registry id of the runtime
    pub provider: String,
    /// Model weights
    pub model: ModelSource,
    /// CPU or GPU
    pub compute_type: ComputeType,
    /// 1..=10
    pub replicas: u32,
    /// Per-replica requests
    #[serde(default)]
    pub resources: ResourceShape,
    /// Scheduling hints
    #[serde(default)]
    pub placement: PlacementHints,
    /// Pre-built image that replaces image resolution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
    /// Serving engine
    pub engine: InferenceEngine,
    /// Engine knobs
    #[serde(default)]
    pub tuning: EngineTuning,
    /// Custom-resource shape
    #[serde(default)]
    pub resource_variant: ResourceVariant,
    /// Serving topology
    #[serde(default)]
    pub topology: Topology,
}

impl DeploymentRequest {
    /// True for GPU compute
    pub fn is_gpu(&self) -> bool {
        self.compute_type == ComputeType::Gpu
    }

    /// GPUs each aggregated replica needs (0 for CPU compute)
    pub fn gpus_per_replica(&self) -> u32 {
        if self.is_gpu() {
            self.resources.gpu.unwrap_or(1)
        } else {
            0
        }
    }

    /// GGUF run mode, if the model is a GGUF file
    pub fn run_mode(&self) -> Option<GgufRunMode> {
        match &self.model {
            ModelSource::HuggingFaceGguf { run_mode, .. } => Some(*run_mode),
            _ => None,
        }
    }
}

/// Worker pool as submitted (fields optional so gaps become field errors)
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkerPoolInput {
    /// Worker count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,
    /// GPUs per worker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpus: Option<u32>,
}

/// Deployment request as submitted by an operator
///
/// Enumerated fields are plain strings here so a bad value is reported as a
/// field error instead of failing the whole document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentInput {
    /// Deployment name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Target namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Provider id (`kaito`, `dynamo`, `kuberay`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// `premade`, `huggingface-gguf` or `vllm-hf`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_source: Option<String>,
    /// Catalog key for premade models
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub premade_model: Option<String>,
    /// Hugging Face `org/repo`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_id: Option<String>,
    /// GGUF file inside the repository
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gguf_file: Option<String>,
    /// `direct` or `build`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gguf_run_mode: Option<String>,
    /// `cpu` or `gpu`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute_type: Option<String>,
    /// Replica count; kept loose so floats and strings are reported per field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<serde_json::Value>,
    /// Per-replica requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceShape>,
    /// Node selector override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_selector: Option<BTreeMap<String, String>>,
    /// Preferred node names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_nodes: Option<Vec<String>>,
    /// Cloud instance type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_type: Option<String>,
    /// Pre-built image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
    /// `vllm`, `sglang`, `trtllm` or `llamacpp`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    /// Maximum sequence length
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_model_len: Option<u32>,
    /// Secret holding `HF_TOKEN`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hf_token_secret: Option<String>,
    /// `flat` or `nested`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_variant: Option<String>,
    /// `aggregated` or `disaggregated`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// Prefill pool (disaggregated only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefill: Option<WorkerPoolInput>,
    /// Decode pool (disaggregated only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decode: Option<WorkerPoolInput>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn model_source_is_tagged_by_type() {
        let source = ModelSource::HuggingFaceGguf {
            repo_id: "bartowski/Llama-3.2-1B-Instruct-GGUF".to_string(),
            filename: "Llama-3.2-1B-Instruct-Q4_K_M.gguf".to_string(),
            run_mode: GgufRunMode::Direct,
        };
        let value = serde_json::to_value(&source).unwrap();
        assert_eq!(value["type"], "huggingface-gguf");
        assert_eq!(value["repoId"], "bartowski/Llama-3.2-1B-Instruct-GGUF");
        assert_eq!(value["runMode"], "direct");
        assert_eq!(source.kind(), ModelSourceKind::HuggingFaceGguf);
    }

    #[test]
    fn gpus_per_replica_defaults_to_one_for_gpu() {
        let mut request = DeploymentRequest {
            name: "qwen".to_string(),
            namespace: "default".to_string(),
            provider: "kaito".to_string(),
            model: ModelSource::VllmHf {
                repo_id: "Qwen/Qwen2.5-0.5B-Instruct".to_string(),
            },
            compute_type: ComputeType::Gpu,
            replicas: 1,
            resources: ResourceShape::default(),
            placement: PlacementHints::default(),
            image_ref: None,
            engine: InferenceEngine::Vllm,
            tuning: EngineTuning::default(),
            resource_variant: ResourceVariant::Flat,
            topology: Topology::Aggregated,
        };
        assert_eq!(request.gpus_per_replica(), 1);

        request.resources.gpu = Some(4);
        assert_eq!(request.gpus_per_replica(), 4);

        request.compute_type = ComputeType::Cpu;
        assert_eq!(request.gpus_per_replica(), 0);
    }

    #[test]
    fn engines_match_model_sources() {
        assert!(InferenceEngine::Vllm.serves(ModelSourceKind::VllmHf));
        assert!(!InferenceEngine::Vllm.serves(ModelSourceKind::Premade));
        assert!(InferenceEngine::Llamacpp.serves(ModelSourceKind::HuggingFaceGguf));
        assert!(!InferenceEngine::Llamacpp.serves(ModelSourceKind::VllmHf));
        assert_eq!(
            InferenceEngine::default_for(ModelSourceKind::Premade),
            InferenceEngine::Llamacpp
        );
    }

    #[test]
    fn input_accepts_camel_case_and_unknown_replica_types() {
        let input: DeploymentInput = serde_json::from_value(json!({
            "name": "llama",
            "modelSource": "premade",
            "premadeModel": "llama3.2:3b",
            "replicas": "three",
            "hfTokenSecret": "hf-token"
        }))
        .unwrap();
        assert_eq!(input.model_source.as_deref(), Some("premade"));
        assert_eq!(input.replicas, Some(json!("three")));
        assert_eq!(input.hf_token_secret.as_deref(), Some("hf-token"));
    }

    #[test]
    fn topology_serializes_mode() {
        let topology = Topology::Disaggregated {
            prefill: WorkerPool { replicas: 1, gpus: 2 },
            decode: WorkerPool { replicas: 2, gpus: 1 },
        };
        let value = serde_json::to_value(topology).unwrap();
        assert_eq!(value["mode"], "disaggregated");
        assert_eq!(value["prefill"]["gpus"], 2);
        assert_eq!(topology.mode_str(), "disaggregated");
    }
}
