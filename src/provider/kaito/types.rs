//! KAITO custom resource serialization types
//!
//! `kaito.sh/v1beta1 Workspace` keeps `resource` and `inference` beside
//! `metadata`; `kaito.sh/v1alpha1 InferenceSet` nests them under
//! `spec.template` next to `spec.replicas`.

use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use serde::{Deserialize, Serialize};

use crate::provider::ManifestMetadata;

/// `kaito.sh/v1beta1` Workspace
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub api_version: String,
    pub kind: String,
    pub metadata: ManifestMetadata,
    pub resource: WorkspaceResource,
    pub inference: InferenceSpec,
}

/// Node provisioning and placement
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceResource {
    /// Node count; only the flat variant carries it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_type: Option<String>,
    pub label_selector: LabelSelector,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preferred_nodes: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InferenceSpec {
    pub template: PodTemplateSpec,
}

/// `kaito.sh/v1alpha1` InferenceSet
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InferenceSet {
    pub api_version: String,
    pub kind: String,
    pub metadata: ManifestMetadata,
    pub spec: InferenceSetSpec,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InferenceSetSpec {
    pub replicas: u32,
    pub template: InferenceSetTemplate,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InferenceSetTemplate {
    pub resource: WorkspaceResource,
    pub inference: InferenceSpec,
}
