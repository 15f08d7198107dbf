//! VSphereCluster reconciliation
//!
//! Assigns the control plane endpoint host when no load balancer fronts the
//! control plane, and releases the claim when the cluster goes away.

use super::allocation::{Allocation, claim_name, request_address};
use super::pool_selection::selection_criteria;
use super::{ReconcileResult, Reconciler};
use crate::error::ControllerError;
use crate::patch::Snapshot;
use crds::capi::CAPI_GROUP;
use crds::references::find_owner;
use crds::{ObjectIdentity, ObjectKey, VSphereCluster};
use ipam::IPAddressManager;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

impl Reconciler {
    /// Reconcile the control plane endpoint of one VSphereCluster
    pub async fn reconcile_vsphere_cluster(
        &self,
        key: &ObjectKey,
    ) -> Result<ReconcileResult, ControllerError> {
        let resource = format!("VSphereCluster {key}");

        let Some(vsphere_cluster) = self
            .store
            .get_vsphere_cluster(key)
            .await
            .map_err(ControllerError::read(resource.clone()))?
        else {
            debug!(cluster = %key, "VSphereCluster not found, nothing to do");
            return Ok(ReconcileResult::done());
        };

        let deleting = vsphere_cluster.metadata.deletion_timestamp.is_some();
        let delegated = vsphere_cluster.spec.load_balancer_ref.is_some();
        let assigned = !vsphere_cluster.spec.control_plane_endpoint.host.is_empty();

        if delegated {
            debug!(cluster = %key, "Control plane endpoint is served by a load balancer");
            return Ok(ReconcileResult::done());
        }
        if assigned && !deleting {
            debug!(cluster = %key, "Control plane endpoint already set");
            return Ok(ReconcileResult::done());
        }
        if deleting && !assigned {
            return Ok(ReconcileResult::done());
        }

        let Some(owner) = find_owner(&vsphere_cluster.metadata, CAPI_GROUP, "Cluster") else {
            info!(cluster = %key, "Waiting for owning Cluster to be set");
            return Ok(ReconcileResult::done());
        };
        let cluster_key = ObjectKey::new(key.namespace.clone(), owner.name.clone());
        if self
            .store
            .get_cluster(&cluster_key)
            .await
            .map_err(ControllerError::read(format!("Cluster {cluster_key}")))?
            .is_none()
        {
            info!(cluster = %key, owner = %cluster_key, "Owning Cluster not found");
            return Ok(ReconcileResult::done());
        }

        let Some(ipam) = self.ipam(&resource) else {
            return Ok(ReconcileResult::done());
        };

        let criteria = selection_criteria(vsphere_cluster.metadata.labels.as_ref(), None);
        let identity = ObjectIdentity::from_resource(&vsphere_cluster);

        if deleting {
            release_endpoint(ipam.as_ref(), &criteria, &cluster_key, &identity).await;
            return Ok(ReconcileResult::done());
        }

        let allocation = request_address(ipam.as_ref(), &criteria, &cluster_key, &identity, 0, true)
            .await
            .map_err(ControllerError::ipam(resource.clone()))?;

        let address = match allocation {
            Allocation::PoolPending | Allocation::ClaimPending => {
                return Ok(ReconcileResult::requeue(self.pending_requeue));
            }
            Allocation::Fulfilled { address, .. } => address,
        };
        address.validate().map_err(|source| ControllerError::InvalidAddress {
            resource: resource.clone(),
            source,
        })?;

        self.set_endpoint_host(key, &resource, &vsphere_cluster, &address.address)
            .await?;
        Ok(ReconcileResult::done())
    }

    async fn set_endpoint_host(
        &self,
        key: &ObjectKey,
        resource: &str,
        vsphere_cluster: &VSphereCluster,
        host: &str,
    ) -> Result<(), ControllerError> {
        let snapshot =
            Snapshot::capture(vsphere_cluster).map_err(ControllerError::patch(resource))?;
        let mut working = vsphere_cluster.clone();
        working.spec.control_plane_endpoint.host = host.to_string();

        if let Some(patch) = snapshot
            .merge_patch(&working)
            .map_err(ControllerError::patch(resource))?
        {
            self.store
                .patch_vsphere_cluster(key, &patch)
                .await
                .map_err(ControllerError::patch(resource))?;
            info!(cluster = %key, host = %host, "Set control plane endpoint host");
        }
        Ok(())
    }
}

/// Best-effort release of the endpoint claim; failures are only logged
async fn release_endpoint(
    ipam: &dyn IPAddressManager,
    criteria: &BTreeMap<String, String>,
    cluster: &ObjectKey,
    owner: &ObjectIdentity,
) {
    let pool = match ipam.get_available_ip_pool(criteria, cluster).await {
        Ok(Some(pool)) => pool,
        Ok(None) => {
            debug!(cluster = %cluster, "No IPPool to release the endpoint claim from");
            return;
        }
        Err(e) => {
            warn!(cluster = %cluster, error = %e, "Failed to look up IPPool for release");
            return;
        }
    };

    let claim = claim_name(owner, &pool.namespace, 0, true);

    match ipam.deallocate_ip(&claim, &pool, owner).await {
        Ok(()) => info!(claim = %claim, pool = %pool.name, "Released control plane endpoint address"),
        Err(e) => warn!(claim = %claim, error = %e, "Failed to release control plane endpoint address"),
    }
}
