//! HAProxyLoadBalancer reconciliation

use super::devices::{DeviceContext, DevicesOutcome, NetworkDevices};
use super::pool_selection::selection_criteria;
use super::{ReconcileResult, Reconciler};
use crate::error::ControllerError;
use crate::patch::Snapshot;
use crds::labels::CLUSTER_NAME;
use crds::references::label;
use crds::{ObjectIdentity, ObjectKey};
use tracing::{debug, info};

impl Reconciler {
    /// Reconcile the static address of one HAProxyLoadBalancer VM
    pub async fn reconcile_load_balancer(
        &self,
        key: &ObjectKey,
    ) -> Result<ReconcileResult, ControllerError> {
        let resource = format!("HAProxyLoadBalancer {key}");

        let Some(lb) = self
            .store
            .get_load_balancer(key)
            .await
            .map_err(ControllerError::read(resource.clone()))?
        else {
            debug!(load_balancer = %key, "HAProxyLoadBalancer not found, nothing to do");
            return Ok(ReconcileResult::done());
        };

        if lb.metadata.deletion_timestamp.is_some() || !lb.needs_static_addresses() {
            debug!(load_balancer = %key, "No devices need a static address");
            return Ok(ReconcileResult::done());
        }

        let Some(cluster_name) = label(&lb.metadata, CLUSTER_NAME) else {
            info!(load_balancer = %key, "HAProxyLoadBalancer has no cluster label");
            return Ok(ReconcileResult::done());
        };
        let cluster_key = ObjectKey::new(key.namespace.clone(), cluster_name);
        if self
            .store
            .get_cluster(&cluster_key)
            .await
            .map_err(ControllerError::read(format!("Cluster {cluster_key}")))?
            .is_none()
        {
            info!(load_balancer = %key, cluster = %cluster_key, "Cluster not found");
            return Ok(ReconcileResult::done());
        }

        let Some(ipam) = self.ipam(&resource) else {
            return Ok(ReconcileResult::done());
        };

        let ctx = DeviceContext {
            ipam: ipam.as_ref(),
            cluster: cluster_key,
            owner: ObjectIdentity::from_resource(&lb),
            criteria: selection_criteria(lb.metadata.labels.as_ref(), None),
            template_device: None,
        };

        let snapshot = Snapshot::capture(&lb).map_err(ControllerError::patch(resource.clone()))?;
        let mut working = lb.clone();
        match self.assign_static_addresses(&mut working, &ctx).await? {
            DevicesOutcome::Pending => Ok(ReconcileResult::requeue(self.pending_requeue)),
            DevicesOutcome::Complete => {
                let patch = snapshot
                    .merge_patch(&working)
                    .map_err(ControllerError::patch(resource.clone()))?;
                if let Some(patch) = patch {
                    self.store
                        .patch_load_balancer(key, &patch)
                        .await
                        .map_err(ControllerError::patch(resource.clone()))?;
                    info!(load_balancer = %key, "Patched HAProxyLoadBalancer network devices");
                }
                Ok(ReconcileResult::done())
            }
        }
    }
}
