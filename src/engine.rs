//! Engine facade: validate, check fit, compile, reduce
//!
//! The engine owns a [`ProviderRegistry`] and nothing else. Every operation is
//! a single-request computation; the only cluster access goes through the
//! [`ClusterQuery`] a caller passes in.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use kubefoundry_common::{FieldError, Result};

use crate::admission::{check_fit, FitResult};
use crate::capacity::{self, ClusterGpuSnapshot};
use crate::cluster::{ClusterQuery, CrdConfig};
use crate::provider::{Provider, ProviderRegistry, RegistryOptions};
use crate::request::{DeploymentRequest, ModelSource};
use crate::status::CanonicalStatus;
use crate::validation::ValidationOutcome;

/// Everything needed to apply one deployment
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentPlan {
    /// The validated request
    pub request: DeploymentRequest,
    /// Advisory fit result, when a cluster was consulted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fit: Option<FitResult>,
    /// Custom resource the manifest is applied as
    pub crd: CrdConfig,
    /// The compiled manifest
    pub manifest: Value,
}

/// Provider translation and admission engine
#[derive(Clone, Debug)]
pub struct Engine {
    registry: ProviderRegistry,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(ProviderRegistry::builtin(&RegistryOptions::default()))
    }
}

impl Engine {
    /// Engine over a registry
    pub fn new(registry: ProviderRegistry) -> Self {
        Self { registry }
    }

    /// The provider registry
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Look up a provider by id
    pub fn get_provider(&self, id: &str) -> Result<&dyn Provider> {
        self.registry.get(id)
    }

    /// Validate a raw request document
    ///
    /// The provider is taken from the document's `provider` field. A missing
    /// or unknown provider is reported as a field error, never raised.
    pub fn validate(&self, raw: &Value) -> ValidationOutcome {
        if !raw.is_object() {
            return ValidationOutcome::rejected(vec![FieldError::new(
                "request",
                "deployment document must be an object",
            )]);
        }

        let id = match raw.get("provider") {
            None | Some(Value::Null) => {
                return ValidationOutcome::rejected(vec![FieldError::new(
                    "provider",
                    format!(
                        "provider is required (one of: {})",
                        self.registry.ids().join(", ")
                    ),
                )]);
            }
            Some(Value::String(id)) => id.as_str(),
            Some(_) => {
                return ValidationOutcome::rejected(vec![FieldError::new(
                    "provider",
                    "provider must be a string",
                )]);
            }
        };

        match self.registry.get(id) {
            Ok(provider) => {
                let outcome = provider.validate_config(raw);
                debug!(provider = %id, valid = outcome.valid, errors = outcome.errors.len(), "Validated request");
                outcome
            }
            Err(_) => ValidationOutcome::rejected(vec![FieldError::new(
                "provider",
                format!(
                    "unknown provider '{}' (one of: {})",
                    id,
                    self.registry.ids().join(", ")
                ),
            )]),
        }
    }

    /// Advisory fit check
    pub fn check_fit(
        &self,
        request: &DeploymentRequest,
        snapshot: &ClusterGpuSnapshot,
        model_minimum: Option<u32>,
    ) -> FitResult {
        check_fit(request, snapshot, model_minimum)
    }

    /// Minimum GPUs per worker implied by a premade catalog entry
    pub fn catalog_minimum(&self, request: &DeploymentRequest) -> Option<u32> {
        let ModelSource::Premade { key } = &request.model else {
            return None;
        };
        self.registry
            .get(&request.provider)
            .ok()?
            .catalog()?
            .min_gpus(key)
    }

    /// Point-in-time GPU capacity; all zeros when the cluster cannot be read
    pub async fn build_snapshot(&self, cluster: &dyn ClusterQuery) -> ClusterGpuSnapshot {
        capacity::build_snapshot(cluster).await
    }

    /// Compile a validated request for a provider
    pub fn compile(&self, provider_id: &str, request: &DeploymentRequest) -> Result<Value> {
        let provider = self.registry.get(provider_id)?;
        let manifest = provider.generate_manifest(request)?;
        debug!(provider = %provider_id, name = %request.name, "Compiled manifest");
        Ok(manifest)
    }

    /// Reduce a live custom object for a provider
    pub fn reduce_status(&self, provider_id: &str, raw: &Value) -> Result<CanonicalStatus> {
        Ok(self.registry.get(provider_id)?.parse_status(raw))
    }

    /// Validate, optionally check fit against a cluster, and compile
    ///
    /// Validation failures come back as `Error::Validation`. The fit check
    /// never blocks; callers decide what to do with its warnings.
    pub async fn plan(
        &self,
        raw: &Value,
        cluster: Option<&dyn ClusterQuery>,
        model_minimum: Option<u32>,
    ) -> Result<DeploymentPlan> {
        let request = self.validate(raw).into_result()?;
        let provider = self.registry.get(&request.provider)?;

        let fit = match cluster {
            Some(cluster) => {
                let snapshot = self.build_snapshot(cluster).await;
                let minimum = model_minimum.or_else(|| self.catalog_minimum(&request));
                let fit = self.check_fit(&request, &snapshot, minimum);
                for warning in &fit.warnings {
                    warn!(
                        provider = provider.id(),
                        name = %request.name,
                        required = warning.required,
                        available = warning.available,
                        "{}",
                        warning.message
                    );
                }
                Some(fit)
            }
            None => None,
        };

        let manifest = provider.generate_manifest(&request)?;
        let crd = provider.crd_config(Some(request.resource_variant));
        info!(
            provider = provider.id(),
            name = %request.name,
            namespace = %request.namespace,
            kind = crd.kind,
            "Planned deployment"
        );

        Ok(DeploymentPlan {
            request,
            fit,
            crd,
            manifest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::FitWarningKind;
    use crate::cluster::MockClusterQuery;
    use k8s_openapi::api::core::v1::{Node, NodeStatus};
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use kubefoundry_common::Error;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn engine() -> Engine {
        Engine::default()
    }

    fn vllm_doc() -> Value {
        json!({
            "name": "qwen",
            "namespace": "inference",
            "provider": "dynamo",
            "modelSource": "vllm-hf",
            "repoId": "Qwen/Qwen3-8B",
            "replicas": 4,
            "resources": {"gpu": 2}
        })
    }

    fn gpu_node(name: &str, gpus: u32) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            status: Some(NodeStatus {
                allocatable: Some(BTreeMap::from([(
                    "nvidia.com/gpu".to_string(),
                    Quantity(gpus.to_string()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    // =========================================================================
    // Validation dispatch
    // =========================================================================

    #[test]
    fn missing_provider_is_a_field_error() {
        let outcome = engine().validate(&json!({"name": "x", "namespace": "default"}));
        assert!(!outcome.valid);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].field, "provider");
    }

    #[test]
    fn unknown_provider_is_reported_not_raised() {
        let outcome = engine().validate(&json!({"provider": "ollama"}));
        assert!(!outcome.valid);
        assert_eq!(outcome.errors[0].field, "provider");
        assert!(outcome.errors[0].message.contains("ollama"));
    }

    #[test]
    fn non_object_document_is_rejected() {
        let outcome = engine().validate(&json!(["not", "a", "request"]));
        assert_eq!(outcome.errors[0].field, "request");
    }

    #[test]
    fn valid_document_is_normalized() {
        let outcome = engine().validate(&vllm_doc());
        assert!(outcome.valid, "{:?}", outcome.errors);
        let request = outcome.normalized.unwrap();
        assert_eq!(request.provider, "dynamo");
        assert!(request.is_gpu());
    }

    // =========================================================================
    // Dispatch by id
    // =========================================================================

    #[test]
    fn compile_and_reduce_dispatch_by_id() {
        let engine = engine();
        let request = engine.validate(&vllm_doc()).into_result().unwrap();
        let manifest = engine.compile("dynamo", &request).unwrap();
        assert_eq!(manifest["kind"], "DynamoGraphDeployment");

        let status = engine.reduce_status("dynamo", &manifest).unwrap();
        assert_eq!(status.name, "qwen");
        assert_eq!(status.model_id.as_deref(), Some("Qwen/Qwen3-8B"));

        assert!(matches!(
            engine.compile("ollama", &request),
            Err(Error::UnknownProvider { .. })
        ));
        assert!(matches!(
            engine.reduce_status("ollama", &manifest),
            Err(Error::UnknownProvider { .. })
        ));
    }

    #[test]
    fn catalog_minimum_comes_from_premade_entry() {
        let engine = engine();
        let request = engine
            .validate(&json!({
                "name": "mixtral",
                "namespace": "default",
                "provider": "kaito",
                "modelSource": "premade",
                "premadeModel": "mixtral:8x7b",
                "computeType": "gpu"
            }))
            .into_result()
            .unwrap();
        assert_eq!(engine.catalog_minimum(&request), Some(2));
    }

    // =========================================================================
    // Planning
    // =========================================================================

    #[tokio::test]
    async fn plan_checks_fit_but_never_blocks() {
        let mut cluster = MockClusterQuery::new();
        cluster
            .expect_list_nodes()
            .returning(|| Ok(vec![gpu_node("gpu-a", 2), gpu_node("gpu-b", 2)]));
        cluster.expect_list_pods().returning(|| Ok(vec![]));

        let plan = engine()
            .plan(&vllm_doc(), Some(&cluster), None)
            .await
            .unwrap();
        let fit = plan.fit.unwrap();
        assert!(!fit.fits);
        assert!(fit.has(FitWarningKind::TotalInsufficient));
        assert_eq!(plan.crd.kind, "DynamoGraphDeployment");
        assert_eq!(plan.manifest["metadata"]["name"], "qwen");
    }

    #[tokio::test]
    async fn plan_without_cluster_skips_fit() {
        let plan = engine().plan(&vllm_doc(), None, None).await.unwrap();
        assert!(plan.fit.is_none());
    }

    #[tokio::test]
    async fn plan_surfaces_validation_errors() {
        let mut doc = vllm_doc();
        doc["name"] = json!("Not_Valid");
        let err = engine().plan(&doc, None, None).await.unwrap_err();
        assert_eq!(err.field_errors()[0].field, "name");
    }
}
