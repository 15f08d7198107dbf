//! Resource store seam.
//!
//! Reconcilers read and patch Cluster API resources only through
//! [`ClusterStore`], so they can be exercised against an in-memory store.

use crate::error::StoreError;
use crds::labels::CLUSTER_NAME;
use crds::{
    Cluster, HAProxyLoadBalancer, KubeadmControlPlane, Machine, MachineDeployment, ObjectKey,
    VSphereCluster, VSphereMachine, VSphereMachineTemplate,
};
use kube::api::{ListParams, Patch, PatchParams};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt::Debug;

/// Reads and merge patches of the resources the reconcilers work on.
///
/// Missing objects are `Ok(None)`. Patches carry `metadata.resourceVersion`
/// and fail with [`StoreError::Conflict`] when the object changed since it
/// was read.
#[async_trait::async_trait]
pub trait ClusterStore: Send + Sync {
    async fn get_vsphere_machine(&self, key: &ObjectKey)
    -> Result<Option<VSphereMachine>, StoreError>;
    async fn get_load_balancer(
        &self,
        key: &ObjectKey,
    ) -> Result<Option<HAProxyLoadBalancer>, StoreError>;
    async fn get_vsphere_cluster(&self, key: &ObjectKey)
    -> Result<Option<VSphereCluster>, StoreError>;
    async fn get_machine(&self, key: &ObjectKey) -> Result<Option<Machine>, StoreError>;
    async fn get_cluster(&self, key: &ObjectKey) -> Result<Option<Cluster>, StoreError>;
    async fn get_machine_template(
        &self,
        key: &ObjectKey,
    ) -> Result<Option<VSphereMachineTemplate>, StoreError>;
    async fn get_machine_deployment(
        &self,
        key: &ObjectKey,
    ) -> Result<Option<MachineDeployment>, StoreError>;

    /// Control planes in `namespace` labelled with the cluster name
    async fn list_control_planes(
        &self,
        namespace: &str,
        cluster_name: &str,
    ) -> Result<Vec<KubeadmControlPlane>, StoreError>;

    async fn patch_vsphere_machine(&self, key: &ObjectKey, patch: &Value) -> Result<(), StoreError>;
    async fn patch_load_balancer(&self, key: &ObjectKey, patch: &Value) -> Result<(), StoreError>;
    async fn patch_vsphere_cluster(&self, key: &ObjectKey, patch: &Value) -> Result<(), StoreError>;
}

/// [`ClusterStore`] over the Kubernetes API
#[derive(Clone)]
pub struct KubeClusterStore {
    client: Client,
}

impl KubeClusterStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn get<K>(&self, key: &ObjectKey) -> Result<Option<K>, StoreError>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        Ok(self.api::<K>(&key.namespace).get_opt(&key.name).await?)
    }

    async fn merge_patch<K>(&self, key: &ObjectKey, patch: &Value) -> Result<(), StoreError>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        match self
            .api::<K>(&key.namespace)
            .patch(&key.name, &PatchParams::default(), &Patch::Merge(patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 409 => Err(StoreError::Conflict(format!(
                "{} {key} was modified concurrently",
                K::kind(&())
            ))),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait::async_trait]
impl ClusterStore for KubeClusterStore {
    async fn get_vsphere_machine(
        &self,
        key: &ObjectKey,
    ) -> Result<Option<VSphereMachine>, StoreError> {
        self.get(key).await
    }

    async fn get_load_balancer(
        &self,
        key: &ObjectKey,
    ) -> Result<Option<HAProxyLoadBalancer>, StoreError> {
        self.get(key).await
    }

    async fn get_vsphere_cluster(
        &self,
        key: &ObjectKey,
    ) -> Result<Option<VSphereCluster>, StoreError> {
        self.get(key).await
    }

    async fn get_machine(&self, key: &ObjectKey) -> Result<Option<Machine>, StoreError> {
        self.get(key).await
    }

    async fn get_cluster(&self, key: &ObjectKey) -> Result<Option<Cluster>, StoreError> {
        self.get(key).await
    }

    async fn get_machine_template(
        &self,
        key: &ObjectKey,
    ) -> Result<Option<VSphereMachineTemplate>, StoreError> {
        self.get(key).await
    }

    async fn get_machine_deployment(
        &self,
        key: &ObjectKey,
    ) -> Result<Option<MachineDeployment>, StoreError> {
        self.get(key).await
    }

    async fn list_control_planes(
        &self,
        namespace: &str,
        cluster_name: &str,
    ) -> Result<Vec<KubeadmControlPlane>, StoreError> {
        let params = ListParams::default().labels(&format!("{CLUSTER_NAME}={cluster_name}"));
        Ok(self.api::<KubeadmControlPlane>(namespace).list(&params).await?.items)
    }

    async fn patch_vsphere_machine(&self, key: &ObjectKey, patch: &Value) -> Result<(), StoreError> {
        self.merge_patch::<VSphereMachine>(key, patch).await
    }

    async fn patch_load_balancer(&self, key: &ObjectKey, patch: &Value) -> Result<(), StoreError> {
        self.merge_patch::<HAProxyLoadBalancer>(key, patch).await
    }

    async fn patch_vsphere_cluster(&self, key: &ObjectKey, patch: &Value) -> Result<(), StoreError> {
        self.merge_patch::<VSphereCluster>(key, patch).await
    }
}
