//! Workspace / InferenceSet status reduction

use serde_json::Value;

use crate::catalog::ModelCatalog;
use crate::status::{
    object_phase, parse_conditions, resolve_model_id, CanonicalStatus, DeploymentMode,
    ModelIdContext, ModelIdStrategy, ObjectView, ReplicaStatus, GGUF_DIRECT, MODEL_ANNOTATION,
    MODEL_FLAG, PREMADE_IMAGE,
};

use super::{INFERENCE_SET_CRD, PROVIDER_ID};

/// Conditions that together mean the workspace is serving
pub const REQUIRED_CONDITIONS: &[&str] = &["ResourceReady", "InferenceReady"];

const STRATEGIES: &[ModelIdStrategy] = &[GGUF_DIRECT, MODEL_FLAG, PREMADE_IMAGE, MODEL_ANNOTATION];

struct Layout {
    desired: &'static str,
    containers: &'static str,
}

const FLAT: Layout = Layout {
    desired: "/resource/count",
    containers: "/inference/template/spec/containers",
};

const NESTED: Layout = Layout {
    desired: "/spec/replicas",
    containers: "/spec/template/inference/template/spec/containers",
};

/// Reduce a live KAITO object into the canonical status
pub fn parse_status(raw: &Value, catalog: &ModelCatalog) -> CanonicalStatus {
    let object = ObjectView::new(raw);
    let layout = if object.kind() == INFERENCE_SET_CRD.kind {
        &NESTED
    } else {
        &FLAT
    };

    let conditions = parse_conditions(raw, "/status/conditions");
    let phase = object_phase(
        &object,
        object.str_at("/status/phase"),
        &conditions,
        REQUIRED_CONDITIONS,
    );

    let desired = object.u32_at(layout.desired).unwrap_or(1);
    let observed = object
        .u32_at("/status/readyReplicas")
        .unwrap_or_else(|| object.len_at("/status/workerNodes"));

    let containers = object.containers_at(layout.containers);
    let ctx = ModelIdContext::new(object, &containers, Some(catalog));

    CanonicalStatus {
        name: object.name().to_string(),
        namespace: object.namespace().to_string(),
        provider: PROVIDER_ID.to_string(),
        model_id: resolve_model_id(&ctx, STRATEGIES),
        engine: object.engine(),
        mode: DeploymentMode::Aggregated,
        phase,
        replicas: ReplicaStatus::for_phase(phase, observed, desired),
        conditions,
        frontend_service_ref: object.name().to_string(),
        created_at: object.created_at(),
    }
}
