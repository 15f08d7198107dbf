//! In-memory metal3 store for unit testing
//!
//! Stores pools, claims and addresses in memory and doubles as the external
//! IP address manager: tests call [`MemoryMetal3Store::fulfill_claim`] to
//! answer a claim the way metal3 would.

use crate::error::IpamError;
use crate::metal3::Metal3Store;
use crds::metal3::{IPAddress, IPAddressSpec, IPClaim, IPClaimStatus, IPPool};
use k8s_openapi::api::core::v1::ObjectReference;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Mock metal3 store for testing
///
/// Clones share state, so a clone handed to the code under test stays
/// observable from the test.
#[derive(Clone, Default)]
pub struct MemoryMetal3Store {
    // Pools keep insertion order, which is the list order
    pub(crate) pools: Arc<Mutex<Vec<IPPool>>>,
    pub(crate) claims: Arc<Mutex<BTreeMap<(String, String), IPClaim>>>,
    pub(crate) addresses: Arc<Mutex<BTreeMap<(String, String), IPAddress>>>,
    pub(crate) claim_creations: Arc<Mutex<usize>>,
    pub(crate) claim_deletions: Arc<Mutex<usize>>,
    // Next create_claim reports a concurrent creation
    pub(crate) race_next_create: Arc<Mutex<bool>>,
    pub(crate) fail_reads: Arc<Mutex<Option<String>>>,
}

fn key(namespace: &str, name: &str) -> (String, String) {
    (namespace.to_string(), name.to_string())
}

/// Build an IPPool from labels and a JSON spec
pub fn pool_fixture(
    namespace: &str,
    name: &str,
    labels: &[(&str, &str)],
    spec: serde_json::Value,
) -> IPPool {
    let mut pool: IPPool = serde_json::from_value(serde_json::json!({
        "apiVersion": "ipam.metal3.io/v1alpha1",
        "kind": "IPPool",
        "metadata": {"name": name, "namespace": namespace},
        "spec": spec,
    }))
    .expect("IPPool fixture must match the IPPool schema");
    pool.metadata.labels = Some(
        labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    );
    pool
}

impl MemoryMetal3Store {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pool; it is listed after the pools added before it
    pub fn add_pool(&self, pool: IPPool) {
        self.pools.lock().unwrap().push(pool);
    }

    /// Answer a claim: create the IPAddress and link it from the claim status.
    ///
    /// Panics if the claim does not exist, since tests only fulfill claims
    /// they expect to have been created.
    pub fn fulfill_claim(
        &self,
        namespace: &str,
        claim_name: &str,
        address: &str,
        prefix: i32,
        gateway: Option<&str>,
        dns_servers: &[&str],
    ) {
        let mut claims = self.claims.lock().unwrap();
        let claim = claims
            .get_mut(&key(namespace, claim_name))
            .unwrap_or_else(|| panic!("IPClaim {namespace}/{claim_name} was never created"));

        let pool_name = claim.spec.pool.name.clone().unwrap_or_default();
        let address_name = format!("{}-{}", pool_name, address.replace(['.', ':'], "-"));
        let mut ip = IPAddress::new(
            &address_name,
            IPAddressSpec {
                claim: ObjectReference {
                    name: Some(claim_name.to_string()),
                    namespace: Some(namespace.to_string()),
                    ..Default::default()
                },
                pool: claim.spec.pool.clone(),
                address: address.to_string(),
                prefix: Some(prefix),
                gateway: gateway.map(str::to_string),
                dns_servers: dns_servers.iter().map(|s| s.to_string()).collect(),
            },
        );
        ip.metadata.namespace = Some(namespace.to_string());

        claim.status = Some(IPClaimStatus {
            address: Some(ObjectReference {
                name: Some(address_name.clone()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            }),
            error_message: None,
        });
        self.addresses
            .lock()
            .unwrap()
            .insert(key(namespace, &address_name), ip);
    }

    /// Add an address whose claim status was never linked, as older metal3
    /// releases leave them
    pub fn add_unlinked_address(&self, address: IPAddress) {
        let namespace = address.metadata.namespace.clone().unwrap_or_default();
        let name = address.metadata.name.clone().unwrap_or_default();
        self.addresses.lock().unwrap().insert(key(&namespace, &name), address);
    }

    /// Insert a claim directly, bypassing creation counting
    pub fn insert_claim(&self, claim: IPClaim) {
        let namespace = claim.metadata.namespace.clone().unwrap_or_default();
        let name = claim.metadata.name.clone().unwrap_or_default();
        self.claims.lock().unwrap().insert(key(&namespace, &name), claim);
    }

    pub fn claim(&self, namespace: &str, name: &str) -> Option<IPClaim> {
        self.claims.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    pub fn claims(&self) -> Vec<IPClaim> {
        self.claims.lock().unwrap().values().cloned().collect()
    }

    /// Number of successful create_claim calls
    pub fn claim_creations(&self) -> usize {
        *self.claim_creations.lock().unwrap()
    }

    /// Number of successful delete_claim calls
    pub fn claim_deletions(&self) -> usize {
        *self.claim_deletions.lock().unwrap()
    }

    /// Make the next create_claim fail with AlreadyExists without storing anything
    pub fn race_next_claim_creation(&self) {
        *self.race_next_create.lock().unwrap() = true;
    }

    /// Make every read fail with a store error
    pub fn fail_reads(&self, message: impl Into<String>) {
        *self.fail_reads.lock().unwrap() = Some(message.into());
    }

    fn check_reads(&self) -> Result<(), IpamError> {
        match self.fail_reads.lock().unwrap().as_ref() {
            Some(message) => Err(IpamError::Store(message.clone())),
            None => Ok(()),
        }
    }
}

fn has_labels(pool: &IPPool, selector: &BTreeMap<String, String>) -> bool {
    let labels = pool.metadata.labels.clone().unwrap_or_default();
    selector.iter().all(|(k, v)| labels.get(k) == Some(v))
}

#[async_trait::async_trait]
impl Metal3Store for MemoryMetal3Store {
    async fn get_pool(&self, namespace: &str, name: &str) -> Result<Option<IPPool>, IpamError> {
        self.check_reads()?;
        Ok(self
            .pools
            .lock()
            .unwrap()
            .iter()
            .find(|p| {
                p.metadata.namespace.as_deref() == Some(namespace)
                    && p.metadata.name.as_deref() == Some(name)
            })
            .cloned())
    }

    async fn list_pools(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<IPPool>, IpamError> {
        self.check_reads()?;
        Ok(self
            .pools
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.metadata.namespace.as_deref() == Some(namespace) && has_labels(p, selector))
            .cloned()
            .collect())
    }

    async fn get_claim(&self, namespace: &str, name: &str) -> Result<Option<IPClaim>, IpamError> {
        self.check_reads()?;
        Ok(self.claim(namespace, name))
    }

    async fn create_claim(&self, claim: &IPClaim) -> Result<(), IpamError> {
        let namespace = claim.metadata.namespace.clone().unwrap_or_default();
        let name = claim.metadata.name.clone().unwrap_or_default();

        let mut race = self.race_next_create.lock().unwrap();
        if *race {
            *race = false;
            return Err(IpamError::AlreadyExists(format!("IPClaim {namespace}/{name}")));
        }

        let mut claims = self.claims.lock().unwrap();
        if claims.contains_key(&key(&namespace, &name)) {
            return Err(IpamError::AlreadyExists(format!("IPClaim {namespace}/{name}")));
        }
        claims.insert(key(&namespace, &name), claim.clone());
        *self.claim_creations.lock().unwrap() += 1;
        Ok(())
    }

    async fn delete_claim(&self, namespace: &str, name: &str) -> Result<(), IpamError> {
        match self.claims.lock().unwrap().remove(&key(namespace, name)) {
            Some(_) => {
                *self.claim_deletions.lock().unwrap() += 1;
                Ok(())
            }
            None => Err(IpamError::NotFound(format!("IPClaim {namespace}/{name}"))),
        }
    }

    async fn get_address(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<IPAddress>, IpamError> {
        self.check_reads()?;
        Ok(self.addresses.lock().unwrap().get(&key(namespace, name)).cloned())
    }

    async fn list_addresses(&self, namespace: &str) -> Result<Vec<IPAddress>, IpamError> {
        self.check_reads()?;
        Ok(self
            .addresses
            .lock()
            .unwrap()
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, a)| a.clone())
            .collect())
    }
}
