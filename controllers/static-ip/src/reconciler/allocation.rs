//! Claim-then-poll allocation.
//!
//! One step of the protocol per call: find a pool, look for the address,
//! and request one if there is none yet. Nothing here waits for the IPAM
//! backend; pending states are reported so the caller can requeue.

use crds::{ObjectIdentity, ObjectKey};
use ipam::{IPAddress, IPAddressManager, IPPool, IpamError};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Where an address request stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Allocation {
    /// No pool matches the selection criteria yet
    PoolPending,
    /// A claim exists (or was just created) but has no address yet
    ClaimPending,
    /// The claim has an address
    Fulfilled { address: IPAddress, pool: IPPool },
}

/// Claim name for device `index` of `owner`, in a pool living in
/// `pool_namespace`.
///
/// Multi-device kinds always suffix the index. Single-device kinds use the
/// owner name alone for their first device. Owners outside the pool
/// namespace are prefixed with their own namespace, since claims from every
/// namespace sharing the pool land side by side.
pub fn claim_name(
    owner: &ObjectIdentity,
    pool_namespace: &str,
    index: usize,
    single_device: bool,
) -> String {
    let base = if owner.namespace == pool_namespace {
        owner.name.clone()
    } else {
        format!("{}-{}", owner.namespace, owner.name)
    };
    if single_device && index == 0 {
        base
    } else {
        format!("{base}-{index}")
    }
}

/// Advances the allocation for device `index` of `owner` by a single step
pub async fn request_address(
    ipam: &dyn IPAddressManager,
    criteria: &BTreeMap<String, String>,
    cluster: &ObjectKey,
    owner: &ObjectIdentity,
    index: usize,
    single_device: bool,
) -> Result<Allocation, IpamError> {
    let Some(pool) = ipam.get_available_ip_pool(criteria, cluster).await? else {
        info!(
            owner = %owner.name,
            device = index,
            cluster = %cluster,
            criteria = ?criteria,
            "No IPPool available yet"
        );
        return Ok(Allocation::PoolPending);
    };

    let claim = claim_name(owner, &pool.namespace, index, single_device);
    if let Some(address) = ipam.get_ip(&claim, &pool, owner).await? {
        debug!(claim = %claim, address = %address.address, pool = %pool.name, "Address assigned");
        return Ok(Allocation::Fulfilled { address, pool });
    }

    ipam.allocate_ip(&claim, &pool, owner).await?;
    info!(claim = %claim, pool = %pool.name, "Waiting for IPClaim to be fulfilled");
    Ok(Allocation::ClaimPending)
}
