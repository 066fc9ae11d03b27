//! Structural and cross-field validation of deployment requests
//!
//! Validation never fails with `Err` for bad input: every problem becomes a
//! field-qualified [`FieldError`] so an operator sees all of them at once.

use serde::Serialize;
use serde_json::Value;

use kubefoundry_common::{Error, FieldError, Result};

use crate::catalog::ModelCatalog;
use crate::provider::ProviderFeatures;
use crate::request::{
    ComputeType, DeploymentInput, DeploymentRequest, EngineTuning, GgufRunMode, InferenceEngine,
    ModelSource, ModelSourceKind, PlacementHints, ResourceVariant, Topology, WorkerPool,
    WorkerPoolInput, DEFAULT_REPLICAS, MAX_GPUS_PER_WORKER, MAX_NAME_LENGTH, MAX_REPLICAS,
};

/// Result of validating one request
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    /// True when `errors` is empty
    pub valid: bool,
    /// Every problem found
    pub errors: Vec<FieldError>,
    /// The normalized request, present only when valid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized: Option<DeploymentRequest>,
}

impl ValidationOutcome {
    /// A valid outcome
    pub fn accepted(request: DeploymentRequest) -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            normalized: Some(request),
        }
    }

    /// An invalid outcome
    pub fn rejected(errors: Vec<FieldError>) -> Self {
        Self {
            valid: false,
            errors,
            normalized: None,
        }
    }

    /// Convert into the normalized request or a validation error
    pub fn into_result(self) -> Result<DeploymentRequest> {
        match self.normalized {
            Some(request) if self.valid => Ok(request),
            _ => Err(Error::validation(self.errors)),
        }
    }
}

/// Check a Kubernetes DNS label: lowercase alphanumerics and `-`, starting and
/// ending with an alphanumeric, at most 63 characters
pub fn validate_dns_label(s: &str) -> std::result::Result<(), String> {
    if s.is_empty() {
        return Err("must not be empty".to_string());
    }
    if s.len() > MAX_NAME_LENGTH {
        return Err(format!(
            "must be at most {} characters (got {})",
            MAX_NAME_LENGTH,
            s.len()
        ));
    }

    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit() => {}
        _ => {
            return Err(format!(
                "must start with a lowercase letter or digit: {}",
                s
            ))
        }
    }

    for c in chars {
        if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' {
            return Err(format!(
                "must be lowercase alphanumeric with hyphens: {}",
                s
            ));
        }
    }

    if s.ends_with('-') {
        return Err(format!("must not end with a hyphen: {}", s));
    }

    Ok(())
}

/// Decode the wire document, reporting a type mismatch as a single `request`
/// field error
pub fn parse_input(raw: &Value) -> std::result::Result<DeploymentInput, FieldError> {
    serde_json::from_value(raw.clone()).map_err(|e| {
        FieldError::new(
            "request",
            format!("not a valid deployment document: {}", e),
        )
    })
}

/// Validate a raw document for one provider
pub fn validate_request(
    raw: &Value,
    provider_id: &str,
    features: &ProviderFeatures,
    catalog: Option<&ModelCatalog>,
) -> ValidationOutcome {
    match parse_input(raw) {
        Ok(input) => validate_input(&input, provider_id, features, catalog),
        Err(e) => ValidationOutcome::rejected(vec![e]),
    }
}

#[derive(Default)]
struct Problems(Vec<FieldError>);

impl Problems {
    fn push(&mut self, field: &str, message: impl Into<String>) {
        self.0.push(FieldError::new(field, message));
    }
}

fn required<'a>(
    value: Option<&'a str>,
    field: &str,
    message: &str,
    problems: &mut Problems,
) -> Option<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Some(v),
        _ => {
            problems.push(field, message);
            None
        }
    }
}

fn parse_replicas(value: Option<&Value>, problems: &mut Problems) -> Option<u32> {
    let Some(value) = value else {
        return Some(DEFAULT_REPLICAS);
    };
    match value.as_u64() {
        Some(n) if (1..=u64::from(MAX_REPLICAS)).contains(&n) => Some(n as u32),
        _ => {
            problems.push(
                "replicas",
                format!("must be an integer between 1 and {}", MAX_REPLICAS),
            );
            None
        }
    }
}

fn parse_pool(pool: Option<&WorkerPoolInput>, name: &str, problems: &mut Problems) -> Option<WorkerPool> {
    let Some(pool) = pool else {
        problems.push(name, format!("{} pool is required in disaggregated mode", name));
        return None;
    };

    let replicas = match pool.replicas {
        Some(n) if (1..=MAX_REPLICAS).contains(&n) => Some(n),
        _ => {
            problems.push(
                &format!("{}.replicas", name),
                format!("must be an integer between 1 and {}", MAX_REPLICAS),
            );
            None
        }
    };
    let gpus = match pool.gpus {
        Some(n) if (1..=MAX_GPUS_PER_WORKER).contains(&n) => Some(n),
        _ => {
            problems.push(
                &format!("{}.gpus", name),
                format!("must be an integer between 1 and {}", MAX_GPUS_PER_WORKER),
            );
            None
        }
    };

    Some(WorkerPool {
        replicas: replicas?,
        gpus: gpus?,
    })
}

/// Model source plus the compute type the source implies, if any
struct ResolvedSource {
    model: ModelSource,
    implied_compute: Option<ComputeType>,
}

fn resolve_source(
    kind: ModelSourceKind,
    input: &DeploymentInput,
    explicit_compute: Option<ComputeType>,
    catalog: Option<&ModelCatalog>,
    problems: &mut Problems,
) -> Option<ResolvedSource> {
    match kind {
        ModelSourceKind::Premade => {
            let key = required(
                input.premade_model.as_deref(),
                "premadeModel",
                "premadeModel is required for premade models",
                problems,
            )?;
            let Some(catalog) = catalog else {
                problems.push("modelSource", "provider has no premade model catalog");
                return None;
            };
            let Some(entry) = catalog.get(key) else {
                problems.push("premadeModel", format!("Unknown premade model: {}", key));
                return None;
            };
            Some(ResolvedSource {
                model: ModelSource::Premade {
                    key: key.to_string(),
                },
                implied_compute: Some(entry.compute_type),
            })
        }
        ModelSourceKind::HuggingFaceGguf => {
            let repo_id = required(
                input.repo_id.as_deref(),
                "repoId",
                "repoId is required for huggingface-gguf models",
                problems,
            );
            let filename = required(
                input.gguf_file.as_deref(),
                "ggufFile",
                "ggufFile is required for huggingface-gguf models",
                problems,
            );
            let run_mode = match input.gguf_run_mode.as_deref() {
                None => Some(GgufRunMode::Direct),
                Some(s) => {
                    let parsed = GgufRunMode::parse(s);
                    if parsed.is_none() {
                        problems.push(
                            "ggufRunMode",
                            format!("unknown run mode '{}' (expected direct or build)", s),
                        );
                    }
                    parsed
                }
            };
            if run_mode == Some(GgufRunMode::Build) && input.image_ref.is_none() {
                problems.push("imageRef", "build mode needs a pre-built image reference");
            }
            Some(ResolvedSource {
                model: ModelSource::HuggingFaceGguf {
                    repo_id: repo_id?.to_string(),
                    filename: filename?.to_string(),
                    run_mode: run_mode?,
                },
                implied_compute: None,
            })
        }
        ModelSourceKind::VllmHf => {
            if explicit_compute == Some(ComputeType::Cpu) {
                problems.push("computeType", "vllm-hf models require GPU compute");
            }
            let repo_id = required(
                input.repo_id.as_deref(),
                "repoId",
                "repoId is required for vllm-hf models",
                problems,
            )?;
            Some(ResolvedSource {
                model: ModelSource::VllmHf {
                    repo_id: repo_id.to_string(),
                },
                implied_compute: Some(ComputeType::Gpu),
            })
        }
    }
}

/// Validate a decoded document for one provider
pub fn validate_input(
    input: &DeploymentInput,
    provider_id: &str,
    features: &ProviderFeatures,
    catalog: Option<&ModelCatalog>,
) -> ValidationOutcome {
    let mut problems = Problems::default();

    let name = required(input.name.as_deref(), "name", "name is required", &mut problems)
        .and_then(|name| match validate_dns_label(name) {
            Ok(()) => Some(name.to_string()),
            Err(msg) => {
                problems.push("name", msg);
                None
            }
        });

    let namespace = required(
        input.namespace.as_deref(),
        "namespace",
        "namespace is required",
        &mut problems,
    )
    .map(str::to_string);

    if let Some(requested) = input.provider.as_deref() {
        if requested != provider_id {
            problems.push(
                "provider",
                format!(
                    "request targets provider '{}' but was validated by '{}'",
                    requested, provider_id
                ),
            );
        }
    }

    let replicas = parse_replicas(input.replicas.as_ref(), &mut problems);

    let explicit_compute = match input.compute_type.as_deref() {
        None => None,
        Some(s) => {
            let parsed = ComputeType::parse(s);
            if parsed.is_none() {
                problems.push(
                    "computeType",
                    format!("unknown compute type '{}' (expected cpu or gpu)", s),
                );
            }
            parsed
        }
    };

    let kind = match input.model_source.as_deref() {
        None => {
            problems.push(
                "modelSource",
                "modelSource is required (premade, huggingface-gguf or vllm-hf)",
            );
            None
        }
        Some(s) => match ModelSourceKind::parse(s) {
            None => {
                problems.push("modelSource", format!("unknown model source '{}'", s));
                None
            }
            Some(kind) if !features.model_sources.contains(&kind) => {
                problems.push(
                    "modelSource",
                    format!("provider '{}' does not support {} models", provider_id, kind),
                );
                None
            }
            Some(kind) => Some(kind),
        },
    };

    let source = kind.and_then(|kind| {
        resolve_source(kind, input, explicit_compute, catalog, &mut problems)
    });

    let compute_type = match (&source, explicit_compute) {
        (Some(ResolvedSource { model: ModelSource::VllmHf { .. }, .. }), _) => ComputeType::Gpu,
        (_, Some(explicit)) => explicit,
        (Some(resolved), None) => resolved.implied_compute.unwrap_or_default(),
        (None, None) => ComputeType::default(),
    };

    let resources = input.resources.clone().unwrap_or_default();
    match resources.gpu {
        Some(0) => problems.push("resources.gpu", "must be at least 1"),
        Some(n) if n > MAX_GPUS_PER_WORKER => problems.push(
            "resources.gpu",
            format!("must be at most {} per worker", MAX_GPUS_PER_WORKER),
        ),
        Some(_) if compute_type == ComputeType::Cpu => {
            problems.push("resources.gpu", "GPU count requires computeType gpu")
        }
        _ => {}
    }

    let engine = match input.engine.as_deref() {
        Some(s) => match InferenceEngine::parse(s) {
            None => {
                problems.push("engine", format!("unknown engine '{}'", s));
                None
            }
            Some(engine) if !features.engines.contains(&engine) => {
                problems.push(
                    "engine",
                    format!("provider '{}' does not support the {} engine", provider_id, engine),
                );
                None
            }
            Some(engine) => match kind {
                Some(kind) if !engine.serves(kind) => {
                    problems.push(
                        "engine",
                        format!("the {} engine cannot serve {} models", engine, kind),
                    );
                    None
                }
                _ => Some(engine),
            },
        },
        None => kind.map(InferenceEngine::default_for),
    };

    let resource_variant = match input.resource_variant.as_deref() {
        None => Some(ResourceVariant::Flat),
        Some(s) => match ResourceVariant::parse(s) {
            None => {
                problems.push(
                    "resourceVariant",
                    format!("unknown resource variant '{}' (expected flat or nested)", s),
                );
                None
            }
            Some(variant) if !features.resource_variants.contains(&variant) => {
                problems.push(
                    "resourceVariant",
                    format!(
                        "provider '{}' does not support the {} resource variant",
                        provider_id,
                        variant.as_str()
                    ),
                );
                None
            }
            Some(variant) => Some(variant),
        },
    };

    let topology = match input.mode.as_deref() {
        None | Some("aggregated") => Some(Topology::Aggregated),
        Some("disaggregated") => {
            if !features.disaggregated {
                problems.push(
                    "mode",
                    format!(
                        "provider '{}' does not support disaggregated serving",
                        provider_id
                    ),
                );
            }
            if compute_type == ComputeType::Cpu {
                problems.push("mode", "disaggregated serving requires GPU compute");
            }
            let prefill = parse_pool(input.prefill.as_ref(), "prefill", &mut problems);
            let decode = parse_pool(input.decode.as_ref(), "decode", &mut problems);
            match (prefill, decode) {
                (Some(prefill), Some(decode)) => Some(Topology::Disaggregated { prefill, decode }),
                _ => None,
            }
        }
        Some(other) => {
            problems.push(
                "mode",
                format!(
                    "unknown mode '{}' (expected aggregated or disaggregated)",
                    other
                ),
            );
            None
        }
    };

    if input.max_model_len == Some(0) {
        problems.push("maxModelLen", "must be at least 1");
    }
    if let Some(secret) = input.hf_token_secret.as_deref() {
        if let Err(msg) = validate_dns_label(secret) {
            problems.push("hfTokenSecret", msg);
        }
    }
    if let Some(selector) = &input.label_selector {
        if selector.keys().any(|k| k.trim().is_empty()) {
            problems.push("labelSelector", "label keys must not be empty");
        }
    }
    if let Some(image) = input.image_ref.as_deref() {
        if image.trim().is_empty() {
            problems.push("imageRef", "must not be empty when set");
        }
    }

    if !problems.0.is_empty() {
        return ValidationOutcome::rejected(problems.0);
    }

    let (
        Some(name),
        Some(namespace),
        Some(replicas),
        Some(source),
        Some(engine),
        Some(resource_variant),
        Some(topology),
    ) = (name, namespace, replicas, source, engine, resource_variant, topology)
    else {
        return ValidationOutcome::rejected(vec![FieldError::new(
            "request",
            "request is incomplete",
        )]);
    };

    ValidationOutcome::accepted(DeploymentRequest {
        name,
        namespace,
        provider: provider_id.to_string(),
        model: source.model,
        compute_type,
        replicas,
        resources,
        placement: PlacementHints {
            label_selector: input.label_selector.clone(),
            preferred_nodes: input.preferred_nodes.clone().unwrap_or_default(),
            instance_type: input.instance_type.clone(),
        },
        image_ref: input.image_ref.clone(),
        engine,
        tuning: EngineTuning {
            max_model_len: input.max_model_len,
            hf_token_secret: input.hf_token_secret.clone(),
        },
        resource_variant,
        topology,
    })
}
