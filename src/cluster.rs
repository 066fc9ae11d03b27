//! Read/apply access to the cluster
//!
//! The engine only talks to Kubernetes through [`ClusterQuery`], so the
//! capacity accountant and installation checks can be tested against mocks
//! while production code uses [`KubeClusterQuery`].

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::discovery::ApiResource;
use kube::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use kubefoundry_common::kube_utils::build_api_resource;
use kubefoundry_common::retry::{retry_transient, RetryConfig};
use kubefoundry_common::{Error, Result};

/// Coordinates of a provider's custom resource
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrdConfig {
    /// API group (e.g. `kaito.sh`)
    pub api_group: &'static str,
    /// Version within the group (e.g. `v1beta1`)
    pub api_version: &'static str,
    /// Lowercase plural resource name
    pub plural: &'static str,
    /// Kind
    pub kind: &'static str,
}

impl CrdConfig {
    /// `group/version`, as written in a manifest's `apiVersion`
    pub fn full_api_version(&self) -> String {
        format!("{}/{}", self.api_group, self.api_version)
    }

    /// Name of the CustomResourceDefinition object (`<plural>.<group>`)
    pub fn crd_name(&self) -> String {
        format!("{}.{}", self.plural, self.api_group)
    }

    /// kube-rs resource descriptor for dynamic API access
    pub fn api_resource(&self) -> ApiResource {
        build_api_resource(self.api_group, self.api_version, self.kind, self.plural)
    }
}

/// Cluster operations the engine needs
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterQuery: Send + Sync {
    /// All nodes
    async fn list_nodes(&self) -> Result<Vec<Node>>;

    /// All pods in all namespaces
    async fn list_pods(&self) -> Result<Vec<Pod>>;

    /// Pods in one namespace matching a label selector
    async fn list_pods_in(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>>;

    /// Whether a CRD with the given name is installed
    async fn crd_exists(&self, name: &str) -> Result<bool>;

    /// Fetch one custom object; `None` when it does not exist
    async fn get_custom_object(
        &self,
        crd: &CrdConfig,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Value>>;

    /// List custom objects in a namespace
    async fn list_custom_objects(&self, crd: &CrdConfig, namespace: &str) -> Result<Vec<Value>>;

    /// Create a custom object from a manifest, returning what the server stored
    async fn create_custom_object(
        &self,
        crd: &CrdConfig,
        namespace: &str,
        manifest: &Value,
    ) -> Result<Value>;

    /// Delete a custom object; deleting an absent object succeeds
    async fn delete_custom_object(&self, crd: &CrdConfig, namespace: &str, name: &str)
        -> Result<()>;
}

/// [`ClusterQuery`] backed by a kube-rs client
///
/// Every call is retried on transient failures; 403 and 404 come back on the
/// first attempt.
#[derive(Clone)]
pub struct KubeClusterQuery {
    client: Client,
    retry: RetryConfig,
}

impl KubeClusterQuery {
    /// Wrap a client with the default retry policy
    pub fn new(client: Client) -> Self {
        Self {
            client,
            retry: RetryConfig::default(),
        }
    }

    /// Override the retry policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn custom_api(&self, crd: &CrdConfig, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &crd.api_resource())
    }
}

fn to_value(obj: &DynamicObject) -> Result<Value> {
    serde_json::to_value(obj).map_err(|e| Error::serialization_for_kind("DynamicObject", e.to_string()))
}

#[async_trait]
impl ClusterQuery for KubeClusterQuery {
    async fn list_nodes(&self) -> Result<Vec<Node>> {
        let api: Api<Node> = Api::all(self.client.clone());
        let list = retry_transient(&self.retry, "list_nodes", || {
            let api = api.clone();
            async move {
                api.list(&ListParams::default())
                    .await
                    .map_err(|e| Error::from_kube("list_nodes", e))
            }
        })
        .await?;
        debug!(count = list.items.len(), "Listed nodes");
        Ok(list.items)
    }

    async fn list_pods(&self) -> Result<Vec<Pod>> {
        let api: Api<Pod> = Api::all(self.client.clone());
        let list = retry_transient(&self.retry, "list_pods", || {
            let api = api.clone();
            async move {
                api.list(&ListParams::default())
                    .await
                    .map_err(|e| Error::from_kube("list_pods", e))
            }
        })
        .await?;
        debug!(count = list.items.len(), "Listed pods");
        Ok(list.items)
    }

    async fn list_pods_in(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(label_selector);
        let list = retry_transient(&self.retry, "list_pods_in", || {
            let api = api.clone();
            let params = params.clone();
            async move {
                api.list(&params)
                    .await
                    .map_err(|e| Error::from_kube("list_pods_in", e))
            }
        })
        .await?;
        Ok(list.items)
    }

    async fn crd_exists(&self, name: &str) -> Result<bool> {
        let api: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        let found = retry_transient(&self.retry, "crd_exists", || {
            let api = api.clone();
            async move {
                api.get(name)
                    .await
                    .map_err(|e| Error::from_kube("crd_exists", e))
            }
        })
        .await;

        match found {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn get_custom_object(
        &self,
        crd: &CrdConfig,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Value>> {
        let api = self.custom_api(crd, namespace);
        let found = retry_transient(&self.retry, "get_custom_object", || {
            let api = api.clone();
            async move {
                api.get(name)
                    .await
                    .map_err(|e| Error::from_kube("get_custom_object", e))
            }
        })
        .await;

        match found {
            Ok(obj) => to_value(&obj).map(Some),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list_custom_objects(&self, crd: &CrdConfig, namespace: &str) -> Result<Vec<Value>> {
        let api = self.custom_api(crd, namespace);
        let list = retry_transient(&self.retry, "list_custom_objects", || {
            let api = api.clone();
            async move {
                api.list(&ListParams::default())
                    .await
                    .map_err(|e| Error::from_kube("list_custom_objects", e))
            }
        })
        .await?;
        list.items.iter().map(to_value).collect()
    }

    async fn create_custom_object(
        &self,
        crd: &CrdConfig,
        namespace: &str,
        manifest: &Value,
    ) -> Result<Value> {
        let obj: DynamicObject = serde_json::from_value(manifest.clone())
            .map_err(|e| Error::serialization_for_kind(crd.kind, e.to_string()))?;
        let api = self.custom_api(crd, namespace);
        let created = retry_transient(&self.retry, "create_custom_object", || {
            let api = api.clone();
            let obj = obj.clone();
            async move {
                api.create(&PostParams::default(), &obj)
                    .await
                    .map_err(|e| Error::from_kube("create_custom_object", e))
            }
        })
        .await?;
        info!(
            kind = crd.kind,
            namespace = %namespace,
            name = created.metadata.name.as_deref().unwrap_or_default(),
            "Created custom object"
        );
        to_value(&created)
    }

    async fn delete_custom_object(
        &self,
        crd: &CrdConfig,
        namespace: &str,
        name: &str,
    ) -> Result<()> {
        let api = self.custom_api(crd, namespace);
        let deleted = retry_transient(&self.retry, "delete_custom_object", || {
            let api = api.clone();
            async move {
                api.delete(name, &DeleteParams::default())
                    .await
                    .map_err(|e| Error::from_kube("delete_custom_object", e))
            }
        })
        .await;

        match deleted {
            Ok(_) => {
                info!(kind = crd.kind, namespace = %namespace, name = %name, "Deleted custom object");
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}
