//! Runtime operator installation: liveness checks and Helm metadata
//!
//! Helm is never executed here. Providers describe their repositories and
//! charts; [`render_install_steps`] turns that into the command lines an
//! operator (or an outer tool) runs.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};

use kubefoundry_common::kube_utils::is_pod_running;
use kubefoundry_common::{Error, Result};

use crate::cluster::{ClusterQuery, CrdConfig};

/// Where a provider's operator runs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorRef {
    /// Namespace of the operator deployment
    pub namespace: &'static str,
    /// Label selector matching operator pods
    pub label_selector: &'static str,
}

/// Result of an installation check
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationStatus {
    /// CRD present and operator running
    pub installed: bool,
    /// CRD present
    pub crd_found: bool,
    /// At least one operator pod is `Running`
    pub operator_running: bool,
    /// Explanation for humans
    pub message: String,
}

/// A Helm chart repository
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HelmRepo {
    /// Local repository alias
    pub name: String,
    /// Repository URL
    pub url: String,
}

/// A Helm release to install
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HelmChart {
    /// Release name
    pub name: String,
    /// Chart reference (`repo/chart` or a URL)
    pub chart: String,
    /// Chart version
    pub version: String,
    /// Release namespace
    pub namespace: String,
    /// Pass `--create-namespace`
    pub create_namespace: bool,
    /// `--set` values
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<String, String>,
}

/// One step of an install procedure
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallStep {
    /// Short title
    pub title: String,
    /// Shell command
    pub command: String,
    /// What the step does
    pub description: String,
}

/// What to remove when uninstalling a runtime
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UninstallResources {
    /// Namespaces to delete
    pub namespaces: Vec<String>,
    /// CRDs to delete (`<plural>.<group>`)
    pub crds: Vec<String>,
    /// Helm releases to uninstall, as `namespace/release`
    pub helm_releases: Vec<String>,
}

/// Render `helm repo add`, `helm repo update` and `helm upgrade --install`
/// steps for the given repositories and charts
pub fn render_install_steps(repos: &[HelmRepo], charts: &[HelmChart]) -> Vec<InstallStep> {
    let mut steps: Vec<InstallStep> = repos
        .iter()
        .map(|repo| InstallStep {
            title: format!("Add {} Helm repository", repo.name),
            command: format!("helm repo add {} {}", repo.name, repo.url),
            description: format!("Registers the chart repository at {}", repo.url),
        })
        .collect();

    if !repos.is_empty() {
        steps.push(InstallStep {
            title: "Update Helm repositories".to_string(),
            command: "helm repo update".to_string(),
            description: "Fetches the latest chart indexes".to_string(),
        });
    }

    steps.extend(charts.iter().map(|chart| {
        let mut command = format!(
            "helm upgrade --install {} {} --version {} --namespace {}",
            chart.name, chart.chart, chart.version, chart.namespace
        );
        if chart.create_namespace {
            command.push_str(" --create-namespace");
        }
        for (key, value) in &chart.values {
            command.push_str(&format!(" --set {}={}", key, value));
        }
        command.push_str(" --wait");

        InstallStep {
            title: format!("Install {}", chart.name),
            command,
            description: format!(
                "Installs chart {} {} into namespace {}",
                chart.chart, chart.version, chart.namespace
            ),
        }
    }));

    steps
}

/// Check that a runtime's CRD exists and its operator is running
///
/// A missing CRD is a normal "not installed" answer. Missing permissions are
/// returned as `Err` so they are never mistaken for "not installed". Other
/// failures (after retries) report not installed with the reason.
pub async fn check_installation(
    cluster: &dyn ClusterQuery,
    provider_name: &str,
    crd: &CrdConfig,
    operator: &OperatorRef,
) -> Result<InstallationStatus> {
    let crd_name = crd.crd_name();

    let crd_found = match cluster.crd_exists(&crd_name).await {
        Ok(found) => found,
        Err(e @ Error::Permission { .. }) => return Err(e),
        Err(e) => {
            warn!(crd = %crd_name, error = %e, "Failed to look up CRD");
            return Ok(InstallationStatus {
                installed: false,
                crd_found: false,
                operator_running: false,
                message: format!("Could not check for CRD {}: {}", crd_name, e),
            });
        }
    };

    if !crd_found {
        return Ok(InstallationStatus {
            installed: false,
            crd_found: false,
            operator_running: false,
            message: format!(
                "CRD {} not found; install the {} operator",
                crd_name, provider_name
            ),
        });
    }

    let operator_running = match cluster
        .list_pods_in(operator.namespace, operator.label_selector)
        .await
    {
        Ok(pods) => pods.iter().any(is_pod_running),
        Err(e @ Error::Permission { .. }) => return Err(e),
        Err(e) if e.is_not_found() => false,
        Err(e) => {
            warn!(namespace = operator.namespace, error = %e, "Failed to list operator pods");
            return Ok(InstallationStatus {
                installed: false,
                crd_found: true,
                operator_running: false,
                message: format!(
                    "CRD {} found but operator pods could not be listed: {}",
                    crd_name, e
                ),
            });
        }
    };

    debug!(crd = %crd_name, operator_running, "Checked installation");

    let message = if operator_running {
        format!("{} is installed and running", provider_name)
    } else {
        format!(
            "CRD {} found but no running operator pods in namespace {} (selector {})",
            crd_name, operator.namespace, operator.label_selector
        )
    };

    Ok(InstallationStatus {
        installed: operator_running,
        crd_found: true,
        operator_running,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MockClusterQuery;
    use k8s_openapi::api::core::v1::{Pod, PodStatus};

    const CRD: CrdConfig = CrdConfig {
        api_group: "kaito.sh",
        api_version: "v1beta1",
        plural: "workspaces",
        kind: "Workspace",
    };

    const OPERATOR: OperatorRef = OperatorRef {
        namespace: "kaito-workspace",
        label_selector: "app.kubernetes.io/name=workspace",
    };

    fn pod(phase: &str) -> Pod {
        Pod {
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn installed_when_crd_and_running_operator() {
        let mut cluster = MockClusterQuery::new();
        cluster
            .expect_crd_exists()
            .withf(|name| name == "workspaces.kaito.sh")
            .returning(|_| Ok(true));
        cluster
            .expect_list_pods_in()
            .withf(|ns, selector| {
                ns == "kaito-workspace" && selector == "app.kubernetes.io/name=workspace"
            })
            .returning(|_, _| Ok(vec![pod("Pending"), pod("Running")]));

        let status = check_installation(&cluster, "KAITO", &CRD, &OPERATOR)
            .await
            .unwrap();
        assert!(status.installed);
        assert!(status.crd_found);
        assert!(status.operator_running);
    }

    #[tokio::test]
    async fn missing_crd_is_not_installed() {
        let mut cluster = MockClusterQuery::new();
        cluster.expect_crd_exists().returning(|_| Ok(false));
        cluster.expect_list_pods_in().never();

        let status = check_installation(&cluster, "KAITO", &CRD, &OPERATOR)
            .await
            .unwrap();
        assert!(!status.installed);
        assert!(!status.crd_found);
        assert!(status.message.contains("workspaces.kaito.sh"));
    }

    #[tokio::test]
    async fn crd_without_running_operator() {
        let mut cluster = MockClusterQuery::new();
        cluster.expect_crd_exists().returning(|_| Ok(true));
        cluster
            .expect_list_pods_in()
            .returning(|_, _| Ok(vec![pod("CrashLoopBackOff")]));

        let status = check_installation(&cluster, "KAITO", &CRD, &OPERATOR)
            .await
            .unwrap();
        assert!(!status.installed);
        assert!(status.crd_found);
        assert!(!status.operator_running);
    }

    #[tokio::test]
    async fn forbidden_is_an_error_not_an_answer() {
        let mut cluster = MockClusterQuery::new();
        cluster
            .expect_crd_exists()
            .returning(|_| Err(Error::permission("crd_exists", "forbidden: RBAC")));

        let err = check_installation(&cluster, "KAITO", &CRD, &OPERATOR)
            .await
            .unwrap_err();
        match err {
            Error::Permission { message, .. } => assert_eq!(message, "forbidden: RBAC"),
            other => panic!("expected Permission, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn transient_failure_reports_not_installed() {
        let mut cluster = MockClusterQuery::new();
        cluster
            .expect_crd_exists()
            .returning(|_| Err(Error::cluster_unavailable("crd_exists", "timed out")));

        let status = check_installation(&cluster, "KAITO", &CRD, &OPERATOR)
            .await
            .unwrap();
        assert!(!status.installed);
        assert!(status.message.contains("timed out"));
    }

    #[test]
    fn install_steps_render_helm_commands() {
        let repos = vec![HelmRepo {
            name: "kaito".to_string(),
            url: "https://kaito-project.github.io/kaito/charts/kaito".to_string(),
        }];
        let charts = vec![HelmChart {
            name: "kaito-workspace".to_string(),
            chart: "kaito/workspace".to_string(),
            version: "0.6.0".to_string(),
            namespace: "kaito-workspace".to_string(),
            create_namespace: true,
            values: BTreeMap::from([(
                "featureGates.enableInferenceSetController".to_string(),
                "true".to_string(),
            )]),
        }];

        let steps = render_install_steps(&repos, &charts);
        assert_eq!(steps.len(), 3);
        assert_eq!(
            steps[0].command,
            "helm repo add kaito https://kaito-project.github.io/kaito/charts/kaito"
        );
        assert_eq!(steps[1].command, "helm repo update");
        assert_eq!(
            steps[2].command,
            "helm upgrade --install kaito-workspace kaito/workspace --version 0.6.0 \
             --namespace kaito-workspace --create-namespace \
             --set featureGates.enableInferenceSetController=true --wait"
        );
    }

    #[test]
    fn charts_without_repos_skip_repo_update() {
        let charts = vec![HelmChart {
            name: "dynamo-crds".to_string(),
            chart: "https://helm.ngc.nvidia.com/nvidia/ai-dynamo/charts/dynamo-crds-0.5.0.tgz"
                .to_string(),
            version: "0.5.0".to_string(),
            namespace: "default".to_string(),
            create_namespace: false,
            values: BTreeMap::new(),
        }];
        let steps = render_install_steps(&[], &charts);
        assert_eq!(steps.len(), 1);
        assert!(!steps[0].command.contains("--create-namespace"));
    }
}
