//! Advisory GPU fit check
//!
//! Three independent checks run on every call so the operator sees every
//! reason a request may not schedule. A failed check never blocks
//! compilation; callers decide what to do with the warnings.

use serde::{Deserialize, Serialize};

use crate::capacity::ClusterGpuSnapshot;
use crate::request::{DeploymentRequest, Topology};

/// Minimum GPUs per worker when the caller does not supply one
pub const DEFAULT_MODEL_MINIMUM: u32 = 1;

/// Why a request may not fit
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitWarningKind {
    /// Not enough free GPUs in the whole cluster
    TotalInsufficient,
    /// No single node has enough free GPUs for the largest worker
    ContiguousInsufficient,
    /// A worker gets fewer GPUs than the model needs
    ModelMinimum,
}

/// One failed check
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FitWarning {
    /// Which check failed
    pub kind: FitWarningKind,
    /// Human readable explanation
    pub message: String,
    /// GPUs the request needs for this check
    pub required: u32,
    /// GPUs the cluster (or worker) offers for this check
    pub available: u32,
}

/// Outcome of a fit check
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FitResult {
    /// True when no check failed
    pub fits: bool,
    /// Every failed check
    pub warnings: Vec<FitWarning>,
}

impl FitResult {
    fn from_warnings(warnings: Vec<FitWarning>) -> Self {
        Self {
            fits: warnings.is_empty(),
            warnings,
        }
    }

    /// Warnings of one kind
    pub fn has(&self, kind: FitWarningKind) -> bool {
        self.warnings.iter().any(|w| w.kind == kind)
    }
}

/// GPU footprint of a request
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GpuRequirement {
    /// GPUs across every worker
    pub total: u32,
    /// GPUs the largest worker needs on one node
    pub max_per_worker: u32,
    /// GPUs the smallest worker gets
    pub min_per_worker: u32,
}

impl GpuRequirement {
    /// Footprint of a validated request; zero for CPU compute
    pub fn for_request(request: &DeploymentRequest) -> Self {
        if !request.is_gpu() {
            return Self::default();
        }

        match request.topology {
            Topology::Aggregated => {
                let per_replica = request.gpus_per_replica();
                Self {
                    total: request.replicas.saturating_mul(per_replica),
                    max_per_worker: per_replica,
                    min_per_worker: per_replica,
                }
            }
            Topology::Disaggregated { prefill, decode } => Self {
                total: prefill
                    .replicas
                    .saturating_mul(prefill.gpus)
                    .saturating_add(decode.replicas.saturating_mul(decode.gpus)),
                max_per_worker: prefill.gpus.max(decode.gpus),
                min_per_worker: prefill.gpus.min(decode.gpus),
            },
        }
    }

    /// True when the request needs no GPUs
    pub fn is_zero(&self) -> bool {
        self.total == 0
    }
}

/// Check a request's GPU footprint against a capacity snapshot
pub fn check_fit(
    request: &DeploymentRequest,
    snapshot: &ClusterGpuSnapshot,
    model_minimum: Option<u32>,
) -> FitResult {
    let need = GpuRequirement::for_request(request);
    if need.is_zero() {
        return FitResult::from_warnings(Vec::new());
    }

    let minimum = model_minimum.unwrap_or(DEFAULT_MODEL_MINIMUM);
    let mut warnings = Vec::new();

    if need.total > snapshot.available_gpus {
        warnings.push(FitWarning {
            kind: FitWarningKind::TotalInsufficient,
            message: format!(
                "deployment needs {} GPUs but only {} are available in the cluster",
                need.total, snapshot.available_gpus
            ),
            required: need.total,
            available: snapshot.available_gpus,
        });
    }

    if need.max_per_worker > snapshot.max_contiguous_available {
        warnings.push(FitWarning {
            kind: FitWarningKind::ContiguousInsufficient,
            message: format!(
                "each worker needs {} GPUs on one node but the most free on any node is {}",
                need.max_per_worker, snapshot.max_contiguous_available
            ),
            required: need.max_per_worker,
            available: snapshot.max_contiguous_available,
        });
    }

    if need.min_per_worker < minimum {
        warnings.push(FitWarning {
            kind: FitWarningKind::ModelMinimum,
            message: format!(
                "model needs at least {} GPUs per worker but a worker gets {}",
                minimum, need.min_per_worker
            ),
            required: minimum,
            available: need.min_per_worker,
        });
    }

    FitResult::from_warnings(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capacity::NodeGpuCapacity;
    use crate::request::{
        ComputeType, EngineTuning, InferenceEngine, ModelSource, PlacementHints, ResourceShape,
        ResourceVariant, WorkerPool,
    };

    fn gpu_request(replicas: u32, gpus: u32) -> DeploymentRequest {
        DeploymentRequest {
            name: "qwen".to_string(),
            namespace: "default".to_string(),
            provider: "dynamo".to_string(),
            model: ModelSource::VllmHf {
                repo_id: "Qwen/Qwen3-8B".to_string(),
            },
            compute_type: ComputeType::Gpu,
            replicas,
            resources: ResourceShape {
                gpu: Some(gpus),
                ..Default::default()
            },
            placement: PlacementHints::default(),
            image_ref: None,
            engine: InferenceEngine::Vllm,
            tuning: EngineTuning::default(),
            resource_variant: ResourceVariant::Flat,
            topology: Topology::Aggregated,
        }
    }

    fn snapshot(available: u32, max_contiguous: u32) -> ClusterGpuSnapshot {
        ClusterGpuSnapshot {
            total_gpus: available,
            allocated_gpus: 0,
            available_gpus: available,
            max_contiguous_available: max_contiguous,
            per_node: vec![NodeGpuCapacity {
                node_name: "gpu-a".to_string(),
                total_gpus: max_contiguous,
                allocated_gpus: 0,
                available_gpus: max_contiguous,
            }],
        }
    }

    #[test]
    fn fits_when_everything_is_free() {
        let result = check_fit(&gpu_request(2, 2), &snapshot(8, 4), None);
        assert!(result.fits);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn total_shortfall_is_reported() {
        let result = check_fit(&gpu_request(4, 2), &snapshot(4, 4), None);
        assert!(!result.fits);
        assert_eq!(result.warnings.len(), 1);
        let warning = &result.warnings[0];
        assert_eq!(warning.kind, FitWarningKind::TotalInsufficient);
        assert_eq!(warning.required, 8);
        assert_eq!(warning.available, 4);
    }

    #[test]
    fn checks_do_not_short_circuit() {
        let result = check_fit(&gpu_request(4, 2), &snapshot(4, 1), None);
        assert!(!result.fits);
        assert!(result.has(FitWarningKind::TotalInsufficient));
        assert!(result.has(FitWarningKind::ContiguousInsufficient));

        let contiguous = result
            .warnings
            .iter()
            .find(|w| w.kind == FitWarningKind::ContiguousInsufficient)
            .unwrap();
        assert_eq!(contiguous.required, 2);
        assert_eq!(contiguous.available, 1);
    }

    #[test]
    fn exact_contiguous_capacity_fits() {
        let result = check_fit(&gpu_request(1, 2), &snapshot(2, 2), None);
        assert!(result.fits, "{:?}", result.warnings);
    }

    #[test]
    fn contiguous_equal_to_worker_size_is_not_a_warning() {
        let result = check_fit(&gpu_request(1, 2), &snapshot(8, 2), None);
        assert!(!result.has(FitWarningKind::ContiguousInsufficient));

        let result = check_fit(&gpu_request(1, 3), &snapshot(8, 2), None);
        assert!(result.has(FitWarningKind::ContiguousInsufficient));
    }

    #[test]
    fn oversized_footprint_saturates() {
        let need = GpuRequirement::for_request(&gpu_request(10, 429_496_730));
        assert_eq!(need.total, u32::MAX);

        let mut request = gpu_request(1, 1);
        request.topology = Topology::Disaggregated {
            prefill: WorkerPool { replicas: 10, gpus: u32::MAX },
            decode: WorkerPool { replicas: 10, gpus: u32::MAX },
        };
        let result = check_fit(&request, &snapshot(8, 8), None);
        let total = result
            .warnings
            .iter()
            .find(|w| w.kind == FitWarningKind::TotalInsufficient)
            .unwrap();
        assert_eq!(total.required, u32::MAX);
    }

    #[test]
    fn model_minimum_uses_smaller_pool() {
        let mut request = gpu_request(1, 1);
        request.topology = Topology::Disaggregated {
            prefill: WorkerPool { replicas: 1, gpus: 4 },
            decode: WorkerPool { replicas: 2, gpus: 2 },
        };

        let need = GpuRequirement::for_request(&request);
        assert_eq!(need.total, 8);
        assert_eq!(need.max_per_worker, 4);
        assert_eq!(need.min_per_worker, 2);

        let result = check_fit(&request, &snapshot(16, 8), Some(4));
        assert_eq!(result.warnings.len(), 1);
        let warning = &result.warnings[0];
        assert_eq!(warning.kind, FitWarningKind::ModelMinimum);
        assert_eq!(warning.required, 4);
        assert_eq!(warning.available, 2);

        assert!(check_fit(&request, &snapshot(16, 8), None).fits);
    }

    #[test]
    fn cpu_requests_always_fit() {
        let mut request = gpu_request(3, 1);
        request.compute_type = ComputeType::Cpu;
        request.resources.gpu = None;

        let result = check_fit(&request, &ClusterGpuSnapshot::empty(), Some(2));
        assert!(result.fits);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn empty_cluster_reports_all_capacity_checks() {
        let result = check_fit(&gpu_request(1, 1), &ClusterGpuSnapshot::empty(), None);
        assert!(result.has(FitWarningKind::TotalInsufficient));
        assert!(result.has(FitWarningKind::ContiguousInsufficient));
        assert!(!result.has(FitWarningKind::ModelMinimum));
    }

    #[test]
    fn warning_kinds_serialize_snake_case() {
        let value = serde_json::to_value(FitWarningKind::ContiguousInsufficient).unwrap();
        assert_eq!(value, "contiguous_insufficient");
    }
}
