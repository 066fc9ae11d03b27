//! Sub-builders shared by every provider's manifest compiler

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    EnvVar, EnvVarSource, ResourceRequirements, SecretKeySelector,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use kubefoundry_common::{
    Error, Result, ANNOTATION_MODEL_ID, GPU_RESOURCE, LABEL_COMPUTE_TYPE, LABEL_ENGINE,
    LABEL_INSTANCE, LABEL_MANAGED_BY, LABEL_MODEL_SOURCE, LABEL_NAME, LABEL_PROVIDER,
    LABEL_RUN_MODE, MANAGED_BY,
};

use crate::request::{ComputeType, DeploymentRequest, ResourceShape};

/// Default selector for CPU workloads
pub const CPU_NODE_SELECTOR: (&str, &str) = ("kubernetes.io/os", "linux");

/// Default selector for GPU workloads
pub const GPU_NODE_SELECTOR: (&str, &str) = ("nvidia.com/gpu.present", "true");

/// Key inside the token secret holding the Hugging Face token
pub const HF_TOKEN_KEY: &str = "HF_TOKEN";

/// Env var the serving containers read the token from
pub const HF_TOKEN_ENV: &str = "HF_TOKEN";

/// Metadata block of a generated custom resource
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManifestMetadata {
    /// Resource name
    pub name: String,
    /// Resource namespace
    pub namespace: String,
    /// Labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ManifestMetadata {
    /// Metadata with the standard labels and the model-id annotation
    pub fn for_request(request: &DeploymentRequest, model_id: &str) -> Self {
        Self {
            name: request.name.clone(),
            namespace: request.namespace.clone(),
            labels: standard_labels(request),
            annotations: BTreeMap::from([(ANNOTATION_MODEL_ID.to_string(), model_id.to_string())]),
        }
    }
}

/// Labels every generated resource carries
pub fn standard_labels(request: &DeploymentRequest) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::from([
        (LABEL_NAME.to_string(), request.name.clone()),
        (LABEL_INSTANCE.to_string(), request.name.clone()),
        (LABEL_MANAGED_BY.to_string(), MANAGED_BY.to_string()),
        (LABEL_PROVIDER.to_string(), request.provider.clone()),
        (
            LABEL_MODEL_SOURCE.to_string(),
            request.model.kind().as_str().to_string(),
        ),
        (
            LABEL_COMPUTE_TYPE.to_string(),
            request.compute_type.as_str().to_string(),
        ),
        (LABEL_ENGINE.to_string(), request.engine.as_str().to_string()),
    ]);
    if let Some(mode) = request.run_mode() {
        labels.insert(LABEL_RUN_MODE.to_string(), mode.as_str().to_string());
    }
    labels
}

/// Node selector: the request's own selector, or the compute-type default
///
/// An explicit selector replaces the default entirely.
pub fn node_selector(request: &DeploymentRequest) -> BTreeMap<String, String> {
    if let Some(selector) = &request.placement.label_selector {
        return selector.clone();
    }
    let (key, value) = match request.compute_type {
        ComputeType::Cpu => CPU_NODE_SELECTOR,
        ComputeType::Gpu => GPU_NODE_SELECTOR,
    };
    BTreeMap::from([(key.to_string(), value.to_string())])
}

/// Container resources: memory/CPU requests verbatim, GPUs as request and
/// limit. `None` when there is nothing to request.
pub fn container_resources(shape: &ResourceShape, gpus: u32) -> Option<ResourceRequirements> {
    let mut requests = BTreeMap::new();
    let mut limits = BTreeMap::new();

    if let Some(memory) = &shape.memory {
        requests.insert("memory".to_string(), Quantity(memory.clone()));
    }
    if let Some(cpu) = &shape.cpu {
        requests.insert("cpu".to_string(), Quantity(cpu.clone()));
    }
    if gpus > 0 {
        requests.insert(GPU_RESOURCE.to_string(), Quantity(gpus.to_string()));
        limits.insert(GPU_RESOURCE.to_string(), Quantity(gpus.to_string()));
    }

    if requests.is_empty() {
        return None;
    }
    Some(ResourceRequirements {
        requests: Some(requests),
        limits: (!limits.is_empty()).then_some(limits),
        ..Default::default()
    })
}

/// `HF_TOKEN` env var sourced from the request's secret, if one was given
pub fn hf_token_env(request: &DeploymentRequest) -> Option<EnvVar> {
    let secret = request.tuning.hf_token_secret.as_ref()?;
    Some(EnvVar {
        name: HF_TOKEN_ENV.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret.clone(),
                key: HF_TOKEN_KEY.to_string(),
                optional: None,
            }),
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Serialize a typed manifest into the JSON document handed to callers
pub fn to_document<T: Serialize>(kind: &str, manifest: &T) -> Result<Value> {
    serde_json::to_value(manifest).map_err(|e| Error::serialization_for_kind(kind, e.to_string()))
}


#[cfg(test)]
mod tests {
    use super::fixtures;
    use super::*;
    use crate::request::GgufRunMode;

    #[test]
    fn standard_labels_describe_the_request() {
        let request = fixtures::gguf("kaito", GgufRunMode::Direct, ComputeType::Cpu);
        let labels = standard_labels(&request);
        assert_eq!(labels[LABEL_NAME], "demo");
        assert_eq!(labels[LABEL_INSTANCE], "demo");
        assert_eq!(labels[LABEL_MANAGED_BY], "kubefoundry");
        assert_eq!(labels[LABEL_PROVIDER], "kaito");
        assert_eq!(labels[LABEL_MODEL_SOURCE], "huggingface-gguf");
        assert_eq!(labels[LABEL_COMPUTE_TYPE], "cpu");
        assert_eq!(labels[LABEL_RUN_MODE], "direct");
        assert_eq!(labels[LABEL_ENGINE], "llamacpp");

        let labels = standard_labels(&fixtures::vllm("kaito", "org/repo"));
        assert!(!labels.contains_key(LABEL_RUN_MODE));
    }

    #[test]
    fn selector_defaults_follow_compute_type() {
        let cpu = fixtures::premade("kaito", "llama3.2:3b");
        assert_eq!(
            node_selector(&cpu),
            BTreeMap::from([("kubernetes.io/os".to_string(), "linux".to_string())])
        );

        let gpu = fixtures::vllm("kaito", "org/repo");
        assert_eq!(
            node_selector(&gpu),
            BTreeMap::from([("nvidia.com/gpu.present".to_string(), "true".to_string())])
        );
    }

    #[test]
    fn explicit_selector_replaces_default() {
        let mut gpu = fixtures::vllm("kaito", "org/repo");
        gpu.placement.label_selector =
            Some(BTreeMap::from([("pool".to_string(), "h100".to_string())]));
        let selector = node_selector(&gpu);
        assert_eq!(selector.len(), 1);
        assert_eq!(selector["pool"], "h100");
    }

    #[test]
    fn gpu_is_request_and_limit() {
        let shape = ResourceShape {
            memory: Some("16Gi".to_string()),
            cpu: Some("4".to_string()),
            gpu: Some(2),
        };
        let resources = container_resources(&shape, 2).unwrap();
        let requests = resources.requests.unwrap();
        let limits = resources.limits.unwrap();
        assert_eq!(requests["memory"], Quantity("16Gi".to_string()));
        assert_eq!(requests["cpu"], Quantity("4".to_string()));
        assert_eq!(requests[GPU_RESOURCE], Quantity("2".to_string()));
        assert_eq!(limits.len(), 1);
        assert_eq!(limits[GPU_RESOURCE], Quantity("2".to_string()));

        let cpu_only = container_resources(
            &ResourceShape {
                memory: Some("4Gi".to_string()),
                ..Default::default()
            },
            0,
        )
        .unwrap();
        assert!(cpu_only.limits.is_none());

        assert!(container_resources(&ResourceShape::default(), 0).is_none());
    }

    #[test]
    fn token_env_only_with_secret() {
        let mut request = fixtures::vllm("kaito", "meta-llama/Llama-3.1-8B-Instruct");
        assert!(hf_token_env(&request).is_none());

        request.tuning.hf_token_secret = Some("hf-token".to_string());
        let env = hf_token_env(&request).unwrap();
        assert_eq!(env.name, "HF_TOKEN");
        let selector = env.value_from.unwrap().secret_key_ref.unwrap();
        assert_eq!(selector.name, "hf-token");
        assert_eq!(selector.key, "HF_TOKEN");
    }
}
