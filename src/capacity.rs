//! Cluster GPU capacity accounting
//!
//! A snapshot is a point-in-time view of how many GPUs each node exposes and
//! how many are already requested by running or pending pods. It is advisory:
//! nothing is reserved, and two callers may both see the same free GPUs.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use kubefoundry_common::kube_utils::pod_phase;
use kubefoundry_common::GPU_RESOURCE;

use crate::cluster::ClusterQuery;

/// GPU accounting for one node
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeGpuCapacity {
    /// Node name
    pub node_name: String,
    /// Allocatable GPUs
    pub total_gpus: u32,
    /// GPUs requested by running or pending pods
    pub allocated_gpus: u32,
    /// `total - allocated`, clamped at zero
    pub available_gpus: u32,
}

/// Cluster-wide GPU accounting
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterGpuSnapshot {
    /// Sum of allocatable GPUs
    pub total_gpus: u32,
    /// Sum of allocated GPUs
    pub allocated_gpus: u32,
    /// Sum of per-node available GPUs
    pub available_gpus: u32,
    /// Most GPUs free on a single node
    pub max_contiguous_available: u32,
    /// Per-node breakdown, GPU nodes only, sorted by name
    pub per_node: Vec<NodeGpuCapacity>,
}

impl ClusterGpuSnapshot {
    /// A snapshot with no GPUs, used when the cluster cannot be read
    pub fn empty() -> Self {
        Self::default()
    }

    /// Reduce per-node figures into cluster totals
    pub fn from_nodes(per_node: Vec<NodeGpuCapacity>) -> Self {
        let total_gpus = per_node
            .iter()
            .fold(0u32, |acc, n| acc.saturating_add(n.total_gpus));
        let allocated_gpus = per_node
            .iter()
            .fold(0u32, |acc, n| acc.saturating_add(n.allocated_gpus));
        let available_gpus = per_node
            .iter()
            .fold(0u32, |acc, n| acc.saturating_add(n.available_gpus));
        let max_contiguous_available = per_node
            .iter()
            .map(|n| n.available_gpus)
            .max()
            .unwrap_or(0);

        Self {
            total_gpus,
            allocated_gpus,
            available_gpus,
            max_contiguous_available,
            per_node,
        }
    }
}

/// Whole GPUs in a quantity; anything unparsable counts as zero
pub fn gpu_count(quantity: &Quantity) -> u32 {
    let raw = quantity.0.trim();
    if let Ok(n) = raw.parse::<u32>() {
        return n;
    }
    raw.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite() && *f > 0.0)
        .map(|f| f.floor() as u32)
        .unwrap_or(0)
}

fn node_gpus(node: &Node) -> u32 {
    node.status
        .as_ref()
        .and_then(|s| s.allocatable.as_ref())
        .and_then(|a| a.get(GPU_RESOURCE))
        .map(gpu_count)
        .unwrap_or(0)
}

fn pod_gpus(pod: &Pod) -> u32 {
    let Some(spec) = pod.spec.as_ref() else {
        return 0;
    };
    spec.containers
        .iter()
        .map(|c| {
            let resources = c.resources.as_ref();
            let request = resources
                .and_then(|r| r.requests.as_ref())
                .and_then(|r| r.get(GPU_RESOURCE));
            let limit = resources
                .and_then(|r| r.limits.as_ref())
                .and_then(|r| r.get(GPU_RESOURCE));
            request.or(limit).map(gpu_count).unwrap_or(0)
        })
        .fold(0u32, u32::saturating_add)
}

fn holds_gpus(pod: &Pod) -> bool {
    matches!(pod_phase(pod), Some("Running") | Some("Pending"))
}

/// Pure reduction over node and pod lists
pub fn compute_snapshot(nodes: &[Node], pods: &[Pod]) -> ClusterGpuSnapshot {
    let mut totals: BTreeMap<&str, (u32, u32)> = BTreeMap::new();

    for node in nodes {
        let Some(name) = node.metadata.name.as_deref() else {
            continue;
        };
        let gpus = node_gpus(node);
        if gpus > 0 {
            totals.insert(name, (gpus, 0));
        }
    }

    for pod in pods.iter().filter(|p| holds_gpus(p)) {
        let Some(node_name) = pod.spec.as_ref().and_then(|s| s.node_name.as_deref()) else {
            continue;
        };
        if let Some((_, allocated)) = totals.get_mut(node_name) {
            *allocated = allocated.saturating_add(pod_gpus(pod));
        }
    }

    let per_node = totals
        .into_iter()
        .map(|(name, (total, allocated))| NodeGpuCapacity {
            node_name: name.to_string(),
            total_gpus: total,
            allocated_gpus: allocated,
            available_gpus: total.saturating_sub(allocated),
        })
        .collect();

    ClusterGpuSnapshot::from_nodes(per_node)
}

/// Read nodes and pods and build a snapshot
///
/// A failed list call yields an all-zero snapshot rather than an error, so a
/// fit check against an unreachable cluster reports "does not fit".
pub async fn build_snapshot(cluster: &dyn ClusterQuery) -> ClusterGpuSnapshot {
    let nodes = match cluster.list_nodes().await {
        Ok(nodes) => nodes,
        Err(e) => {
            warn!(error = %e, "Failed to list nodes, reporting zero GPU capacity");
            return ClusterGpuSnapshot::empty();
        }
    };
    let pods = match cluster.list_pods().await {
        Ok(pods) => pods,
        Err(e) => {
            warn!(error = %e, "Failed to list pods, reporting zero GPU capacity");
            return ClusterGpuSnapshot::empty();
        }
    };

    let snapshot = compute_snapshot(&nodes, &pods);
    debug!(
        total = snapshot.total_gpus,
        allocated = snapshot.allocated_gpus,
        available = snapshot.available_gpus,
        max_contiguous = snapshot.max_contiguous_available,
        gpu_nodes = snapshot.per_node.len(),
        "Built GPU capacity snapshot"
    );
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MockClusterQuery;
    use k8s_openapi::api::core::v1::{
        Container, NodeStatus, PodSpec, PodStatus, ResourceRequirements,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use kubefoundry_common::Error;

    fn gpu_node(name: &str, gpus: &str) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            status: Some(NodeStatus {
                allocatable: Some(BTreeMap::from([
                    ("cpu".to_string(), Quantity("32".to_string())),
                    (GPU_RESOURCE.to_string(), Quantity(gpus.to_string())),
                ])),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn cpu_node(name: &str) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            status: Some(NodeStatus {
                allocatable: Some(BTreeMap::from([(
                    "cpu".to_string(),
                    Quantity("8".to_string()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn container(requests: Option<&str>, limits: Option<&str>) -> Container {
        let to_map = |v: Option<&str>| {
            v.map(|n| BTreeMap::from([(GPU_RESOURCE.to_string(), Quantity(n.to_string()))]))
        };
        Container {
            name: "main".to_string(),
            resources: Some(ResourceRequirements {
                requests: to_map(requests),
                limits: to_map(limits),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn pod_on(node: &str, phase: &str, containers: Vec<Container>) -> Pod {
        Pod {
            spec: Some(PodSpec {
                node_name: Some(node.to_string()),
                containers,
                ..Default::default()
            }),
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn two_nodes_half_allocated() {
        let nodes = vec![gpu_node("gpu-a", "4"), gpu_node("gpu-b", "8"), cpu_node("cpu-a")];
        let pods = vec![
            pod_on("gpu-a", "Running", vec![container(Some("2"), None)]),
            pod_on("gpu-b", "Running", vec![container(Some("1"), None)]),
            pod_on("gpu-b", "Pending", vec![container(Some("3"), Some("3"))]),
        ];

        let snapshot = compute_snapshot(&nodes, &pods);
        assert_eq!(snapshot.total_gpus, 12);
        assert_eq!(snapshot.allocated_gpus, 6);
        assert_eq!(snapshot.available_gpus, 6);
        assert_eq!(snapshot.max_contiguous_available, 4);
        assert_eq!(snapshot.per_node.len(), 2);
        assert_eq!(
            snapshot.per_node[0],
            NodeGpuCapacity {
                node_name: "gpu-a".to_string(),
                total_gpus: 4,
                allocated_gpus: 2,
                available_gpus: 2,
            }
        );
    }

    #[test]
    fn finished_pods_and_foreign_nodes_are_ignored() {
        let nodes = vec![gpu_node("gpu-a", "4")];
        let pods = vec![
            pod_on("gpu-a", "Succeeded", vec![container(Some("4"), None)]),
            pod_on("gpu-a", "Failed", vec![container(Some("4"), None)]),
            pod_on("cpu-a", "Running", vec![container(Some("4"), None)]),
        ];

        let snapshot = compute_snapshot(&nodes, &pods);
        assert_eq!(snapshot.allocated_gpus, 0);
        assert_eq!(snapshot.available_gpus, 4);
    }

    #[test]
    fn limit_is_used_when_request_is_absent() {
        let nodes = vec![gpu_node("gpu-a", "4")];
        let pods = vec![pod_on(
            "gpu-a",
            "Running",
            vec![container(None, Some("2")), container(Some("1"), Some("3"))],
        )];

        let snapshot = compute_snapshot(&nodes, &pods);
        assert_eq!(snapshot.allocated_gpus, 3);
    }

    #[test]
    fn overcommitted_node_clamps_available_at_zero() {
        let nodes = vec![gpu_node("gpu-a", "2")];
        let pods = vec![pod_on("gpu-a", "Running", vec![container(Some("3"), None)])];

        let snapshot = compute_snapshot(&nodes, &pods);
        assert_eq!(snapshot.per_node[0].available_gpus, 0);
        assert_eq!(snapshot.available_gpus, 0);
        assert_eq!(snapshot.max_contiguous_available, 0);
    }

    #[test]
    fn huge_quantities_saturate_cluster_totals() {
        let nodes = vec![gpu_node("gpu-a", "5000000000"), gpu_node("gpu-b", "5000000000")];
        let pods = vec![pod_on(
            "gpu-b",
            "Running",
            vec![
                container(Some("5000000000"), None),
                container(Some("5000000000"), None),
            ],
        )];

        let snapshot = compute_snapshot(&nodes, &pods);
        assert_eq!(snapshot.total_gpus, u32::MAX);
        assert_eq!(snapshot.allocated_gpus, u32::MAX);
        assert_eq!(snapshot.available_gpus, u32::MAX);
        assert_eq!(snapshot.max_contiguous_available, u32::MAX);
        assert_eq!(snapshot.per_node[1].available_gpus, 0);
    }

    #[test]
    fn no_gpu_nodes_is_an_empty_snapshot() {
        let snapshot = compute_snapshot(&[cpu_node("cpu-a")], &[]);
        assert_eq!(snapshot, ClusterGpuSnapshot::empty());
    }

    #[test]
    fn gpu_quantities() {
        assert_eq!(gpu_count(&Quantity("8".to_string())), 8);
        assert_eq!(gpu_count(&Quantity("1.0".to_string())), 1);
        assert_eq!(gpu_count(&Quantity("bogus".to_string())), 0);
        assert_eq!(gpu_count(&Quantity("-2".to_string())), 0);
    }

    #[tokio::test]
    async fn snapshot_from_cluster() {
        let mut cluster = MockClusterQuery::new();
        cluster
            .expect_list_nodes()
            .returning(|| Ok(vec![gpu_node("gpu-a", "8")]));
        cluster.expect_list_pods().returning(|| {
            Ok(vec![pod_on(
                "gpu-a",
                "Running",
                vec![container(Some("2"), None)],
            )])
        });

        let snapshot = build_snapshot(&cluster).await;
        assert_eq!(snapshot.available_gpus, 6);
        assert_eq!(snapshot.max_contiguous_available, 6);
    }

    #[tokio::test]
    async fn unreachable_cluster_reports_zero_capacity() {
        let mut cluster = MockClusterQuery::new();
        cluster
            .expect_list_nodes()
            .returning(|| Ok(vec![gpu_node("gpu-a", "8")]));
        cluster
            .expect_list_pods()
            .returning(|| Err(Error::cluster_unavailable("list_pods", "connection refused")));

        assert_eq!(build_snapshot(&cluster).await, ClusterGpuSnapshot::empty());

        let mut cluster = MockClusterQuery::new();
        cluster
            .expect_list_nodes()
            .returning(|| Err(Error::permission("list_nodes", "forbidden")));
        cluster.expect_list_pods().never();

        assert_eq!(build_snapshot(&cluster).await, ClusterGpuSnapshot::empty());
    }
}
