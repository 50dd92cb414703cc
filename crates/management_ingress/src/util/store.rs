//! Object store seam between the reconciler and the Kubernetes API.

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::{
    api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams},
    client::Client,
    Resource, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use tracing::debug;

use crate::api::v1alpha1::{ManagementIngress, ManagementIngressStatus, API_VERSION, KIND};
use crate::util::errors::StdError;

pub const FIELD_MANAGER: &str = "management-ingress-operator";

/// Namespaced Kubernetes objects the store can move in and out of the cluster.
pub trait Object:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> Object for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    New,
    AlreadyExists,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get<K: Object>(&self, namespace: &str, name: &str) -> Result<Option<K>, StdError>;

    /// Lists objects matching a label selector such as `app=management-ingress`.
    async fn list<K: Object>(&self, namespace: &str, labels: &str) -> Result<Vec<K>, StdError>;

    /// Creates the object; an existing object with the same name is not an error.
    async fn create<K: Object>(&self, obj: &K) -> Result<CreateOutcome, StdError>;

    /// Replaces the object. The object must carry the resourceVersion it was read at.
    async fn update<K: Object>(&self, obj: &K) -> Result<K, StdError>;

    /// Deletes the object; a missing object is not an error.
    async fn delete<K: Object>(&self, namespace: &str, name: &str) -> Result<(), StdError>;

    async fn update_status(
        &self,
        ingress: &ManagementIngress,
        status: &ManagementIngressStatus,
    ) -> Result<(), StdError>;
}

pub(crate) fn object_key<K: Object>(obj: &K) -> Result<(String, String), StdError> {
    let namespace = obj.namespace().ok_or_else(|| {
        StdError::MetadataMissing(format!("{} '{}' has no namespace", K::kind(&()), obj.name_any()))
    })?;
    let name = obj
        .meta()
        .name
        .clone()
        .ok_or_else(|| StdError::MetadataMissing(format!("{} has no name", K::kind(&()))))?;
    Ok((namespace, name))
}

/// `ObjectStore` backed by the API server.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K: Object>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get<K: Object>(&self, namespace: &str, name: &str) -> Result<Option<K>, StdError> {
        Ok(self.api::<K>(namespace).get_opt(name).await?)
    }

    async fn list<K: Object>(&self, namespace: &str, labels: &str) -> Result<Vec<K>, StdError> {
        let list = self
            .api::<K>(namespace)
            .list(&ListParams::default().labels(labels))
            .await?;
        Ok(list.items)
    }

    async fn create<K: Object>(&self, obj: &K) -> Result<CreateOutcome, StdError> {
        let (namespace, _) = object_key(obj)?;
        match self.api::<K>(&namespace).create(&PostParams::default(), obj).await {
            Ok(_) => Ok(CreateOutcome::New),
            Err(kube::Error::Api(err)) if err.code == 409 => {
                debug!(reason = %err.reason, "{} '{}' already exists", K::kind(&()), obj.name_any());
                Ok(CreateOutcome::AlreadyExists)
            }
            Err(e) => Err(StdError::KubeError(e)),
        }
    }

    async fn update<K: Object>(&self, obj: &K) -> Result<K, StdError> {
        let (namespace, name) = object_key(obj)?;
        Ok(self
            .api::<K>(&namespace)
            .replace(&name, &PostParams::default(), obj)
            .await?)
    }

    async fn delete<K: Object>(&self, namespace: &str, name: &str) -> Result<(), StdError> {
        match self.api::<K>(namespace).delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(err)) if err.code == 404 => Ok(()),
            Err(e) => Err(StdError::KubeError(e)),
        }
    }

    async fn update_status(
        &self,
        ingress: &ManagementIngress,
        status: &ManagementIngressStatus,
    ) -> Result<(), StdError> {
        let (namespace, name) = object_key(ingress)?;
        let patch = Patch::Apply(json!({
            "apiVersion": API_VERSION,
            "kind": KIND,
            "status": status,
        }));
        let ps = PatchParams::apply(FIELD_MANAGER).force();
        self.api::<ManagementIngress>(&namespace)
            .patch_status(&name, &ps, &patch)
            .await?;
        Ok(())
    }
}
