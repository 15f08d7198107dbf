//! Metal3Ipam: IPAddressManager over metal3 claims

use super::convert::{address_from_metal3, pool_from_metal3};
use super::store::Metal3Store;
use crate::error::IpamError;
use crate::ipam_trait::IPAddressManager;
use crate::models::{IPAddress, IPPool};
use crds::labels::{
    CLAIM_OWNER_UID, CLUSTER_NAME, IP_POOL_GROUP, IP_POOL_NAME, IP_POOL_NAMESPACE, NETWORK_NAME,
};
use crds::metal3::{IPClaim, IPClaimSpec, IPPool as Metal3Pool};
use crds::references::annotation;
use crds::{ObjectIdentity, ObjectKey};
use k8s_openapi::api::core::v1::ObjectReference;
use kube::Resource;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// metal3 backend, generic over its store so tests can run in memory
pub struct Metal3Ipam<S> {
    store: S,
}

impl<S: Metal3Store> Metal3Ipam<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    fn criterion<'a>(criteria: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
        criteria.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    fn pool_reference(pool: &IPPool) -> ObjectReference {
        ObjectReference {
            api_version: Some(Metal3Pool::api_version(&()).into_owned()),
            kind: Some(Metal3Pool::kind(&()).into_owned()),
            namespace: Some(pool.namespace.clone()),
            name: Some(pool.name.clone()),
            ..Default::default()
        }
    }

    /// The claim is created in the pool namespace. An owner in another
    /// namespace cannot own it, so the owner reference is only set when
    /// both live together. The owner UID annotation is always set.
    fn build_claim(name: &str, pool: &IPPool, owner: &ObjectIdentity) -> IPClaim {
        let mut claim = IPClaim::new(
            name,
            IPClaimSpec {
                pool: Self::pool_reference(pool),
            },
        );
        claim.metadata.namespace = Some(pool.namespace.clone());
        claim.metadata.annotations = Some(BTreeMap::from([(
            CLAIM_OWNER_UID.to_string(),
            owner.uid.clone(),
        )]));
        if owner.namespace == pool.namespace {
            claim.metadata.owner_references = Some(vec![owner.owner_reference()]);
        }
        if let Some(cluster) = &pool.cluster_name {
            claim.metadata.labels = Some(BTreeMap::from([(CLUSTER_NAME.to_string(), cluster.clone())]));
        }
        claim
    }

    /// A claim belongs to `owner` unless its owner UID annotation or its
    /// owner references name a different resource. Claims carrying neither
    /// are accepted.
    fn check_owner(claim: &IPClaim, owner: &ObjectIdentity) -> Result<(), IpamError> {
        let annotated = annotation(&claim.metadata, CLAIM_OWNER_UID);
        let referenced = claim.metadata.owner_references.as_deref().unwrap_or_default();
        let foreign = match annotated {
            Some(uid) => uid != owner.uid,
            None => !referenced.is_empty() && referenced.iter().all(|r| r.uid != owner.uid),
        };
        if foreign {
            return Err(IpamError::ClaimConflict(format!(
                "IPClaim {}/{} is not held by {} {}/{}",
                claim.metadata.namespace.as_deref().unwrap_or_default(),
                claim.metadata.name.as_deref().unwrap_or_default(),
                owner.kind,
                owner.namespace,
                owner.name
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl<S: Metal3Store> IPAddressManager for Metal3Ipam<S> {
    async fn get_available_ip_pool(
        &self,
        criteria: &BTreeMap<String, String>,
        cluster: &ObjectKey,
    ) -> Result<Option<IPPool>, IpamError> {
        let namespace = Self::criterion(criteria, IP_POOL_NAMESPACE).unwrap_or(cluster.namespace.as_str());

        if let Some(name) = Self::criterion(criteria, IP_POOL_NAME) {
            debug!(namespace = %namespace, pool = %name, "Looking up IPPool by name");
            let pool = self.store.get_pool(namespace, name).await?;
            return Ok(pool.as_ref().map(pool_from_metal3));
        }

        let mut selector = BTreeMap::new();
        match Self::criterion(criteria, IP_POOL_GROUP) {
            Some(group) => selector.insert(IP_POOL_GROUP.to_string(), group.to_string()),
            None => selector.insert(CLUSTER_NAME.to_string(), cluster.name.clone()),
        };
        if let Some(network) = Self::criterion(criteria, NETWORK_NAME) {
            selector.insert(NETWORK_NAME.to_string(), network.to_string());
        }

        let pools = self.store.list_pools(namespace, &selector).await?;
        debug!(
            namespace = %namespace,
            selector = ?selector,
            matches = pools.len(),
            "Listed IPPools"
        );
        Ok(pools.first().map(pool_from_metal3))
    }

    async fn get_ip(
        &self,
        name: &str,
        pool: &IPPool,
        owner: &ObjectIdentity,
    ) -> Result<Option<IPAddress>, IpamError> {
        let Some(claim) = self.store.get_claim(&pool.namespace, name).await? else {
            debug!(claim = %name, "No IPClaim yet");
            return Ok(None);
        };
        Self::check_owner(&claim, owner)?;

        let linked = claim
            .status
            .as_ref()
            .and_then(|s| s.address.as_ref())
            .and_then(|r| r.name.as_deref().map(|n| (r.namespace.as_deref(), n)));

        let address = match linked {
            Some((namespace, address_name)) => {
                let namespace = namespace.filter(|n| !n.is_empty()).unwrap_or(pool.namespace.as_str());
                self.store.get_address(namespace, address_name).await?
            }
            None => self
                .store
                .list_addresses(&pool.namespace)
                .await?
                .into_iter()
                .find(|a| {
                    a.spec.claim.name.as_deref() == Some(name)
                        && a.spec.pool.name.as_deref() == Some(pool.name.as_str())
                }),
        };

        match address {
            Some(address) => {
                let address = address_from_metal3(&address, &pool.search_domains)?;
                debug!(claim = %name, address = %address.address, "IPClaim fulfilled");
                Ok(Some(address))
            }
            None => {
                if let Some(message) = claim.status.as_ref().and_then(|s| s.error_message.as_deref()) {
                    info!(claim = %name, error = %message, "IPClaim reports an allocation error");
                }
                Ok(None)
            }
        }
    }

    async fn allocate_ip(
        &self,
        name: &str,
        pool: &IPPool,
        owner: &ObjectIdentity,
    ) -> Result<(), IpamError> {
        if let Some(existing) = self.store.get_claim(&pool.namespace, name).await? {
            Self::check_owner(&existing, owner)?;
            debug!(claim = %name, "IPClaim already exists, skipping creation");
            return Ok(());
        }

        let claim = Self::build_claim(name, pool, owner);
        match self.store.create_claim(&claim).await {
            Ok(()) => {
                info!(
                    claim = %name,
                    namespace = %pool.namespace,
                    pool = %pool.name,
                    owner = %owner.name,
                    "Created IPClaim"
                );
                Ok(())
            }
            Err(IpamError::AlreadyExists(_)) => {
                debug!(claim = %name, "IPClaim created concurrently");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn deallocate_ip(
        &self,
        name: &str,
        pool: &IPPool,
        owner: &ObjectIdentity,
    ) -> Result<(), IpamError> {
        let Some(existing) = self.store.get_claim(&pool.namespace, name).await? else {
            debug!(claim = %name, "IPClaim already gone");
            return Ok(());
        };
        Self::check_owner(&existing, owner)?;

        match self.store.delete_claim(&pool.namespace, name).await {
            Ok(()) => {
                info!(claim = %name, owner = %owner.name, "Deleted IPClaim");
                Ok(())
            }
            Err(IpamError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
