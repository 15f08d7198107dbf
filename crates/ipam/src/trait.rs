//! IPAddressManager trait
//!
//! The capability set every IPAM backend provides. Reconcilers hold an
//! `Arc<dyn IPAddressManager>` and never see backend types.

use crate::error::IpamError;
use crate::models::{IPAddress, IPPool};
use crds::{ObjectIdentity, ObjectKey};
use std::collections::BTreeMap;

/// Trait for IPAM backend operations
///
/// No method waits for an address to be assigned. Allocation only records
/// the request; callers poll with [`IPAddressManager::get_ip`] on a later
/// reconcile. All async methods must be `Send` to work with Tokio's
/// work-stealing runtime.
#[async_trait::async_trait]
pub trait IPAddressManager: Send + Sync {
    /// Pool matching the selection labels for a cluster.
    ///
    /// `Ok(None)` means no pool matches yet; callers treat it as pending.
    async fn get_available_ip_pool(
        &self,
        criteria: &BTreeMap<String, String>,
        cluster: &ObjectKey,
    ) -> Result<Option<IPPool>, IpamError>;

    /// Address assigned to `owner` under the claim `name`.
    ///
    /// `Ok(None)` both when no claim exists and when the claim is not yet
    /// fulfilled. A claim made for another resource is
    /// [`IpamError::ClaimConflict`].
    async fn get_ip(
        &self,
        name: &str,
        pool: &IPPool,
        owner: &ObjectIdentity,
    ) -> Result<Option<IPAddress>, IpamError>;

    /// Requests an address for `owner` under the claim `name`.
    ///
    /// Idempotent: an existing claim of that name made for `owner` is
    /// success; one made for another resource is [`IpamError::ClaimConflict`].
    async fn allocate_ip(
        &self,
        name: &str,
        pool: &IPPool,
        owner: &ObjectIdentity,
    ) -> Result<(), IpamError>;

    /// Releases the claim `name`. A missing claim is success; a claim made
    /// for another resource is left alone and reported as
    /// [`IpamError::ClaimConflict`].
    async fn deallocate_ip(
        &self,
        name: &str,
        pool: &IPPool,
        owner: &ObjectIdentity,
    ) -> Result<(), IpamError>;
}
