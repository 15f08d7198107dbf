//! Store seam of the metal3 backend

use crate::error::IpamError;
use crds::metal3::{IPAddress, IPClaim, IPPool};
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::{Api, Client};
use std::collections::BTreeMap;

/// Reads and writes of the metal3 kinds.
///
/// Lookups of missing objects return `Ok(None)`; creating an existing claim
/// fails with [`IpamError::AlreadyExists`] and deleting a missing one with
/// [`IpamError::NotFound`].
#[async_trait::async_trait]
pub trait Metal3Store: Send + Sync {
    async fn get_pool(&self, namespace: &str, name: &str) -> Result<Option<IPPool>, IpamError>;

    /// Pools in `namespace` carrying every label of `selector`, in list order
    async fn list_pools(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<IPPool>, IpamError>;

    async fn get_claim(&self, namespace: &str, name: &str) -> Result<Option<IPClaim>, IpamError>;
    async fn create_claim(&self, claim: &IPClaim) -> Result<(), IpamError>;
    async fn delete_claim(&self, namespace: &str, name: &str) -> Result<(), IpamError>;

    async fn get_address(&self, namespace: &str, name: &str)
    -> Result<Option<IPAddress>, IpamError>;
    async fn list_addresses(&self, namespace: &str) -> Result<Vec<IPAddress>, IpamError>;
}

/// Equality-based label selector string, e.g. `a=1,b=2`
pub fn label_selector(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// [`Metal3Store`] over the Kubernetes API
#[derive(Clone)]
pub struct KubeMetal3Store {
    client: Client,
}

impl KubeMetal3Store {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Metal3Store for KubeMetal3Store {
    async fn get_pool(&self, namespace: &str, name: &str) -> Result<Option<IPPool>, IpamError> {
        let api: Api<IPPool> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn list_pools(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<IPPool>, IpamError> {
        let api: Api<IPPool> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(&label_selector(selector));
        Ok(api.list(&params).await?.items)
    }

    async fn get_claim(&self, namespace: &str, name: &str) -> Result<Option<IPClaim>, IpamError> {
        let api: Api<IPClaim> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_claim(&self, claim: &IPClaim) -> Result<(), IpamError> {
        let namespace = claim.metadata.namespace.as_deref().unwrap_or("default");
        let name = claim.metadata.name.clone().unwrap_or_default();
        let api: Api<IPClaim> = Api::namespaced(self.client.clone(), namespace);
        match api.create(&PostParams::default(), claim).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 409 => Err(IpamError::AlreadyExists(format!(
                "IPClaim {namespace}/{name}"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_claim(&self, namespace: &str, name: &str) -> Result<(), IpamError> {
        let api: Api<IPClaim> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => {
                Err(IpamError::NotFound(format!("IPClaim {namespace}/{name}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_address(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<IPAddress>, IpamError> {
        let api: Api<IPAddress> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn list_addresses(&self, namespace: &str) -> Result<Vec<IPAddress>, IpamError> {
        let api: Api<IPAddress> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.list(&ListParams::default()).await?.items)
    }
}
