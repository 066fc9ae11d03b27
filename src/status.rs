//! Canonical deployment status
//!
//! Each runtime reports progress differently. Providers read their own raw
//! objects and feed the pieces through the shared reducers here, so every
//! runtime ends up with the same [`CanonicalStatus`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use kubefoundry_common::kube_utils::STATUS_TRUE;
use kubefoundry_common::{
    ANNOTATION_MODEL_ID, LABEL_ENGINE, LABEL_MODEL_SOURCE, LABEL_RUN_MODE,
};

use crate::catalog::ModelCatalog;

/// Lifecycle phase
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Accepted, nothing scheduled yet
    #[default]
    Pending,
    /// Resources are being provisioned
    Deploying,
    /// Serving
    Running,
    /// The runtime gave up
    Failed,
    /// Being deleted
    Terminating,
}

impl Phase {
    /// Display name
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Pending => "Pending",
            Phase::Deploying => "Deploying",
            Phase::Running => "Running",
            Phase::Failed => "Failed",
            Phase::Terminating => "Terminating",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a runtime's phase string onto [`Phase`]
///
/// Matching is case-insensitive; anything unrecognized is `Pending`.
pub fn reduce_phase(raw: Option<&str>) -> Phase {
    let Some(raw) = raw else {
        return Phase::Pending;
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "running" | "ready" => Phase::Running,
        "pending" | "waiting" | "creating" => Phase::Pending,
        "deploying" | "provisioning" => Phase::Deploying,
        "failed" | "error" => Phase::Failed,
        "terminating" | "deleting" => Phase::Terminating,
        _ => Phase::Pending,
    }
}

/// A Kubernetes-style status condition
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type (e.g. `Ready`)
    #[serde(rename = "type")]
    pub type_: String,
    /// `True`, `False` or `Unknown`
    pub status: String,
    /// Machine readable reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Human readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// RFC 3339 timestamp of the last status change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// Read the condition list at a JSON pointer, skipping malformed entries
pub fn parse_conditions(raw: &Value, pointer: &str) -> Vec<Condition> {
    raw.pointer(pointer)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|c| serde_json::from_value(c.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// True when a condition of the given type has status `True`
pub fn has_condition(conditions: &[Condition], condition_type: &str) -> bool {
    conditions
        .iter()
        .any(|c| c.type_ == condition_type && c.status == STATUS_TRUE)
}

/// Upgrade the phase to `Running` when every required condition is `True`
///
/// Never downgrades: `Failed` and `Terminating` are left alone, and an empty
/// requirement list means the provider has no override.
pub fn apply_condition_override(phase: Phase, conditions: &[Condition], required: &[&str]) -> Phase {
    if required.is_empty() || matches!(phase, Phase::Failed | Phase::Terminating) {
        return phase;
    }
    if required.iter().all(|t| has_condition(conditions, t)) {
        Phase::Running
    } else {
        phase
    }
}

/// Ready replica count: observed capped at desired, and zero unless running
pub fn ready_replicas(phase: Phase, observed: u32, desired: u32) -> u32 {
    if phase == Phase::Running {
        observed.min(desired)
    } else {
        0
    }
}

/// Replica counts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaStatus {
    /// Replicas asked for
    pub desired: u32,
    /// Replicas serving
    pub ready: u32,
    /// Replicas available to traffic (same as ready)
    pub available: u32,
}

impl ReplicaStatus {
    /// Counts for a phase and an observed replica count
    pub fn for_phase(phase: Phase, observed: u32, desired: u32) -> Self {
        let ready = ready_replicas(phase, observed, desired);
        Self {
            desired,
            ready,
            available: ready,
        }
    }
}

/// Serving topology as seen on the live object
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    /// Single worker pool
    #[default]
    Aggregated,
    /// Separate prefill and decode pools
    Disaggregated,
}

/// Provider-independent view of a deployment
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalStatus {
    /// Object name
    pub name: String,
    /// Object namespace
    pub namespace: String,
    /// Provider id
    pub provider: String,
    /// Logical model identity, when it could be recovered
    pub model_id: Option<String>,
    /// Serving engine, when known
    pub engine: Option<String>,
    /// Serving topology
    pub mode: DeploymentMode,
    /// Lifecycle phase
    pub phase: Phase,
    /// Replica counts
    pub replicas: ReplicaStatus,
    /// Raw conditions reported by the runtime
    pub conditions: Vec<Condition>,
    /// Service that fronts the deployment's API
    pub frontend_service_ref: String,
    /// Creation timestamp
    pub created_at: Option<String>,
}

/// Read-only accessors over a raw custom object
#[derive(Clone, Copy, Debug)]
pub struct ObjectView<'a> {
    raw: &'a Value,
}

impl<'a> ObjectView<'a> {
    /// Wrap a raw object
    pub fn new(raw: &'a Value) -> Self {
        Self { raw }
    }

    /// The wrapped object
    pub fn raw(&self) -> &'a Value {
        self.raw
    }

    /// String at a JSON pointer
    pub fn str_at(&self, pointer: &str) -> Option<&'a str> {
        self.raw.pointer(pointer).and_then(Value::as_str)
    }

    /// Non-negative integer at a JSON pointer
    pub fn u32_at(&self, pointer: &str) -> Option<u32> {
        self.raw
            .pointer(pointer)
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
    }

    /// Length of the array at a JSON pointer (0 when absent)
    pub fn len_at(&self, pointer: &str) -> u32 {
        self.raw
            .pointer(pointer)
            .and_then(Value::as_array)
            .map(|a| u32::try_from(a.len()).unwrap_or(u32::MAX))
            .unwrap_or(0)
    }

    /// `metadata.name`
    pub fn name(&self) -> &'a str {
        self.str_at("/metadata/name").unwrap_or_default()
    }

    /// `metadata.namespace`
    pub fn namespace(&self) -> &'a str {
        self.str_at("/metadata/namespace").unwrap_or_default()
    }

    /// `kind`
    pub fn kind(&self) -> &'a str {
        self.str_at("/kind").unwrap_or_default()
    }

    /// `metadata.creationTimestamp`
    pub fn created_at(&self) -> Option<String> {
        self.str_at("/metadata/creationTimestamp").map(str::to_string)
    }

    /// True once the API server has marked the object for deletion
    pub fn is_deleting(&self) -> bool {
        self.raw
            .pointer("/metadata/deletionTimestamp")
            .is_some_and(|v| !v.is_null())
    }

    /// A metadata label
    pub fn label(&self, key: &str) -> Option<&'a str> {
        self.raw
            .pointer("/metadata/labels")
            .and_then(|labels| labels.get(key))
            .and_then(Value::as_str)
    }

    /// A metadata annotation
    pub fn annotation(&self, key: &str) -> Option<&'a str> {
        self.raw
            .pointer("/metadata/annotations")
            .and_then(|annotations| annotations.get(key))
            .and_then(Value::as_str)
    }

    /// Engine label
    pub fn engine(&self) -> Option<String> {
        self.label(LABEL_ENGINE).map(str::to_string)
    }

    /// Container objects in the array at a JSON pointer
    pub fn containers_at(&self, pointer: &str) -> Vec<&'a Value> {
        self.raw
            .pointer(pointer)
            .and_then(Value::as_array)
            .map(|items| items.iter().collect())
            .unwrap_or_default()
    }
}

/// Phase for an object: raw phase, condition override, then deletion
pub fn object_phase(
    object: &ObjectView<'_>,
    raw_phase: Option<&str>,
    conditions: &[Condition],
    required: &[&str],
) -> Phase {
    if object.is_deleting() {
        return Phase::Terminating;
    }
    apply_condition_override(reduce_phase(raw_phase), conditions, required)
}

// =============================================================================
// Model identity
// =============================================================================

/// What the model-identity strategies can look at
pub struct ModelIdContext<'a> {
    /// The raw object
    pub object: ObjectView<'a>,
    /// Every container argument, in order
    pub args: Vec<&'a str>,
    /// Every container image
    pub images: Vec<&'a str>,
    /// The provider's premade catalog, if it has one
    pub catalog: Option<&'a ModelCatalog>,
}

impl<'a> ModelIdContext<'a> {
    /// Collect arguments and images from the given containers
    pub fn new(
        object: ObjectView<'a>,
        containers: &[&'a Value],
        catalog: Option<&'a ModelCatalog>,
    ) -> Self {
        let mut args = Vec::new();
        let mut images = Vec::new();
        for container in containers.iter().copied() {
            if let Some(image) = container.get("image").and_then(Value::as_str) {
                images.push(image);
            }
            if let Some(list) = container.get("args").and_then(Value::as_array) {
                args.extend(list.iter().filter_map(Value::as_str));
            }
        }
        Self {
            object,
            args,
            images,
            catalog,
        }
    }

    fn has_flag(&self, flag: &str) -> bool {
        let prefix = format!("{}=", flag);
        self.args.iter().any(|a| *a == flag || a.starts_with(&prefix))
    }
}

/// A guarded extractor: `extract` only runs when `applies` accepts the object
pub struct ModelIdStrategy {
    /// Name for logs
    pub name: &'static str,
    /// Precondition
    pub applies: fn(&ModelIdContext<'_>) -> bool,
    /// Extraction
    pub extract: fn(&ModelIdContext<'_>) -> Option<String>,
}

/// First strategy whose guard holds and whose extraction succeeds
pub fn resolve_model_id(ctx: &ModelIdContext<'_>, strategies: &[ModelIdStrategy]) -> Option<String> {
    strategies
        .iter()
        .filter(|s| (s.applies)(ctx))
        .find_map(|s| (s.extract)(ctx))
}

/// File name from a `scheme://org/repo/file` reference
pub fn gguf_filename_from_uri(arg: &str) -> Option<String> {
    let (_, path) = arg.split_once("://")?;
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() < 3 {
        return None;
    }
    segments.last().map(|s| s.to_string())
}

/// Value of `--flag value` or `--flag=value`
pub fn flag_value(args: &[&str], flag: &str) -> Option<String> {
    let prefix = format!("{}=", flag);
    args.iter().enumerate().find_map(|(i, arg)| {
        if *arg == flag {
            args.get(i + 1)
                .filter(|v| !v.is_empty() && !v.starts_with("--"))
                .map(|v| v.to_string())
        } else {
            arg.strip_prefix(&prefix)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        }
    })
}

fn gguf_direct_applies(ctx: &ModelIdContext<'_>) -> bool {
    match ctx.object.label(LABEL_RUN_MODE) {
        Some(mode) => mode == "direct",
        None => ctx.args.iter().any(|a| a.contains("://")),
    }
}

fn gguf_direct_extract(ctx: &ModelIdContext<'_>) -> Option<String> {
    ctx.args.iter().find_map(|a| gguf_filename_from_uri(a))
}

fn model_flag_applies(ctx: &ModelIdContext<'_>) -> bool {
    ctx.object.label(LABEL_MODEL_SOURCE) == Some("vllm-hf") || ctx.has_flag("--model")
}

fn model_flag_extract(ctx: &ModelIdContext<'_>) -> Option<String> {
    flag_value(&ctx.args, "--model")
}

fn model_path_flag_applies(ctx: &ModelIdContext<'_>) -> bool {
    ctx.has_flag("--model-path")
}

fn model_path_flag_extract(ctx: &ModelIdContext<'_>) -> Option<String> {
    flag_value(&ctx.args, "--model-path")
}

fn premade_image_applies(ctx: &ModelIdContext<'_>) -> bool {
    ctx.catalog.is_some() && !ctx.images.is_empty()
}

fn premade_image_extract(ctx: &ModelIdContext<'_>) -> Option<String> {
    let catalog = ctx.catalog?;
    ctx.images
        .iter()
        .find_map(|image| catalog.find_by_image(image))
        .map(|entry| entry.model_name.to_string())
}

fn annotation_applies(ctx: &ModelIdContext<'_>) -> bool {
    ctx.object.annotation(ANNOTATION_MODEL_ID).is_some()
}

fn annotation_extract(ctx: &ModelIdContext<'_>) -> Option<String> {
    ctx.object
        .annotation(ANNOTATION_MODEL_ID)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// GGUF file name from a `huggingface://org/repo/file` runner argument
pub const GGUF_DIRECT: ModelIdStrategy = ModelIdStrategy {
    name: "gguf-direct",
    applies: gguf_direct_applies,
    extract: gguf_direct_extract,
};

/// Repository from a `--model` argument
pub const MODEL_FLAG: ModelIdStrategy = ModelIdStrategy {
    name: "model-flag",
    applies: model_flag_applies,
    extract: model_flag_extract,
};

/// Repository from a `--model-path` argument
pub const MODEL_PATH_FLAG: ModelIdStrategy = ModelIdStrategy {
    name: "model-path-flag",
    applies: model_path_flag_applies,
    extract: model_path_flag_extract,
};

/// Served model name from a premade catalog image
pub const PREMADE_IMAGE: ModelIdStrategy = ModelIdStrategy {
    name: "premade-image",
    applies: premade_image_applies,
    extract: premade_image_extract,
};

/// The model-id annotation written at compile time
pub const MODEL_ANNOTATION: ModelIdStrategy = ModelIdStrategy {
    name: "annotation",
    applies: annotation_applies,
    extract: annotation_extract,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogEntry;
    use crate::request::ComputeType;
    use serde_json::json;

    const ENTRIES: &[CatalogEntry] = &[CatalogEntry {
        key: "llama3.2:3b",
        display_name: "Llama 3.2 3B Instruct",
        model_name: "llama-3.2-3b-instruct",
        image: "ghcr.io/kaito-project/aikit/llama3.2:3b",
        compute_type: ComputeType::Cpu,
        min_gpus: 0,
    }];
    const CATALOG: ModelCatalog = ModelCatalog::new(ENTRIES);

    const ALL: &[ModelIdStrategy] = &[GGUF_DIRECT, MODEL_FLAG, PREMADE_IMAGE, MODEL_ANNOTATION];

    fn condition(type_: &str, status: &str) -> Condition {
        Condition {
            type_: type_.to_string(),
            status: status.to_string(),
            reason: None,
            message: None,
            last_transition_time: None,
        }
    }

    fn model_id(raw: &Value) -> Option<String> {
        let object = ObjectView::new(raw);
        let containers = object.containers_at("/spec/containers");
        let ctx = ModelIdContext::new(object, &containers, Some(&CATALOG));
        resolve_model_id(&ctx, ALL)
    }

    // ==========================================================================
    // Phase reduction
    // ==========================================================================

    #[test]
    fn phase_table() {
        let cases = [
            (Some("Running"), Phase::Running),
            (Some("Ready"), Phase::Running),
            (Some("READY"), Phase::Running),
            (Some("Pending"), Phase::Pending),
            (Some("Waiting"), Phase::Pending),
            (Some("creating"), Phase::Pending),
            (Some("Provisioning"), Phase::Deploying),
            (Some("Deploying"), Phase::Deploying),
            (Some("Failed"), Phase::Failed),
            (Some("error"), Phase::Failed),
            (Some("Deleting"), Phase::Terminating),
            (Some("Terminating"), Phase::Terminating),
            (Some("Reticulating"), Phase::Pending),
            (None, Phase::Pending),
        ];
        for (raw, expected) in cases {
            assert_eq!(reduce_phase(raw), expected, "{raw:?}");
        }
    }

    #[test]
    fn override_upgrades_to_running_when_all_required_are_true() {
        let conditions = vec![
            condition("ResourceReady", "True"),
            condition("InferenceReady", "True"),
        ];
        let required = ["ResourceReady", "InferenceReady"];

        let phase = apply_condition_override(Phase::Pending, &conditions, &required);
        assert_eq!(phase, Phase::Running);
        assert_eq!(
            apply_condition_override(phase, &conditions, &required),
            Phase::Running
        );
    }

    #[test]
    fn override_needs_every_condition() {
        let conditions = vec![
            condition("ResourceReady", "True"),
            condition("InferenceReady", "False"),
        ];
        assert_eq!(
            apply_condition_override(
                Phase::Deploying,
                &conditions,
                &["ResourceReady", "InferenceReady"]
            ),
            Phase::Deploying
        );
    }

    #[test]
    fn override_never_downgrades() {
        let conditions = vec![condition("Ready", "True")];
        assert_eq!(
            apply_condition_override(Phase::Failed, &conditions, &["Ready"]),
            Phase::Failed
        );
        assert_eq!(
            apply_condition_override(Phase::Terminating, &conditions, &["Ready"]),
            Phase::Terminating
        );
        assert_eq!(
            apply_condition_override(Phase::Pending, &conditions, &[]),
            Phase::Pending
        );
    }

    #[test]
    fn replicas_are_zero_unless_running() {
        assert_eq!(ready_replicas(Phase::Pending, 2, 2), 0);
        assert_eq!(ready_replicas(Phase::Running, 2, 2), 2);
        assert_eq!(ready_replicas(Phase::Running, 5, 2), 2);
        assert_eq!(ready_replicas(Phase::Running, 1, 3), 1);

        let replicas = ReplicaStatus::for_phase(Phase::Running, 2, 2);
        assert_eq!(replicas.available, replicas.ready);
    }

    #[test]
    fn deletion_timestamp_forces_terminating() {
        let raw = json!({"metadata": {"deletionTimestamp": "2025-01-01T00:00:00Z"}});
        let object = ObjectView::new(&raw);
        let conditions = vec![condition("Ready", "True")];
        assert_eq!(
            object_phase(&object, Some("Running"), &conditions, &["Ready"]),
            Phase::Terminating
        );
    }

    #[test]
    fn malformed_conditions_are_skipped() {
        let raw = json!({"status": {"conditions": [
            {"type": "Ready", "status": "True", "lastTransitionTime": "2025-01-01T00:00:00Z"},
            {"type": "Broken"},
            "nonsense"
        ]}});
        let conditions = parse_conditions(&raw, "/status/conditions");
        assert_eq!(conditions.len(), 1);
        assert_eq!(
            conditions[0].last_transition_time.as_deref(),
            Some("2025-01-01T00:00:00Z")
        );
        assert!(parse_conditions(&raw, "/status/missing").is_empty());
    }

    // ==========================================================================
    // Model identity
    // ==========================================================================

    #[test]
    fn gguf_uri_parsing() {
        assert_eq!(
            gguf_filename_from_uri("huggingface://bartowski/Llama-3.2-1B-Instruct-GGUF/model.Q4_K_M.gguf"),
            Some("model.Q4_K_M.gguf".to_string())
        );
        assert_eq!(gguf_filename_from_uri("huggingface://org/repo"), None);
        assert_eq!(gguf_filename_from_uri("--address=:5000"), None);
    }

    #[test]
    fn flag_forms() {
        let args = ["--model", "Qwen/Qwen3-8B", "--port", "5000"];
        assert_eq!(flag_value(&args, "--model"), Some("Qwen/Qwen3-8B".to_string()));

        let args = ["--model=Qwen/Qwen3-8B"];
        assert_eq!(flag_value(&args, "--model"), Some("Qwen/Qwen3-8B".to_string()));

        let args = ["--model-path", "Qwen/Qwen3-8B"];
        assert_eq!(flag_value(&args, "--model"), None);
        assert_eq!(flag_value(&args, "--model-path"), Some("Qwen/Qwen3-8B".to_string()));

        let args = ["--model"];
        assert_eq!(flag_value(&args, "--model"), None);
    }

    #[test]
    fn gguf_direct_wins_first() {
        let raw = json!({
            "metadata": {
                "labels": {"kubefoundry.io/run-mode": "direct"},
                "annotations": {"kubefoundry.io/model-id": "from-annotation"}
            },
            "spec": {"containers": [{
                "image": "ghcr.io/kaito-project/aikit/runners/llama-cpp-cpu:latest",
                "args": ["run", "--address=:5000", "huggingface://org/repo/tiny.gguf"]
            }]}
        });
        assert_eq!(model_id(&raw), Some("tiny.gguf".to_string()));
    }

    #[test]
    fn model_flag_is_read() {
        let raw = json!({
            "spec": {"containers": [{
                "image": "vllm/vllm-openai:v0.10.1",
                "args": ["--model=Qwen/Qwen2.5-0.5B-Instruct", "--port", "5000"]
            }]}
        });
        assert_eq!(model_id(&raw), Some("Qwen/Qwen2.5-0.5B-Instruct".to_string()));
    }

    #[test]
    fn premade_image_reports_served_name() {
        let raw = json!({
            "spec": {"containers": [{
                "image": "ghcr.io/kaito-project/aikit/llama3.2:3b",
                "args": ["run", "--address=:5000"]
            }]}
        });
        assert_eq!(model_id(&raw), Some("llama-3.2-3b-instruct".to_string()));
    }

    #[test]
    fn failed_extraction_falls_through_to_annotation() {
        let raw = json!({
            "metadata": {
                "labels": {"kubefoundry.io/run-mode": "build"},
                "annotations": {"kubefoundry.io/model-id": "org/repo:model.gguf"}
            },
            "spec": {"containers": [{
                "image": "registry.example/custom:1",
                "args": ["run", "--address=:5000"]
            }]}
        });
        assert_eq!(model_id(&raw), Some("org/repo:model.gguf".to_string()));
    }

    #[test]
    fn nothing_to_go_on() {
        assert_eq!(model_id(&json!({})), None);
    }

    #[test]
    fn object_view_accessors() {
        let raw = json!({
            "kind": "Workspace",
            "metadata": {
                "name": "llama",
                "namespace": "models",
                "creationTimestamp": "2025-06-01T12:00:00Z",
                "labels": {"kubefoundry.io/engine": "llamacpp", "count": 3}
            },
            "status": {"workerNodes": ["a", "b"], "replicas": 2}
        });
        let object = ObjectView::new(&raw);
        assert_eq!(object.name(), "llama");
        assert_eq!(object.namespace(), "models");
        assert_eq!(object.kind(), "Workspace");
        assert_eq!(object.engine().as_deref(), Some("llamacpp"));
        assert_eq!(object.created_at().as_deref(), Some("2025-06-01T12:00:00Z"));
        assert_eq!(object.len_at("/status/workerNodes"), 2);
        assert_eq!(object.u32_at("/status/replicas"), Some(2));
        assert!(!object.is_deleting());
        assert_eq!(object.label("count"), None);
    }
}
