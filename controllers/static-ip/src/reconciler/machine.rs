//! VSphereMachine reconciliation
//!
//! Gives every static network device of a VSphereMachine an address from the
//! IPAM backend before CAPV clones the VM.

use super::devices::{DeviceContext, DevicesOutcome, NetworkDevices};
use super::pool_selection::{is_control_plane, selection_criteria};
use super::{ReconcileResult, Reconciler};
use crate::error::ControllerError;
use crate::patch::Snapshot;
use crds::capi::CAPI_GROUP;
use crds::labels::CLUSTER_NAME;
use crds::references::{find_owner, label};
use crds::{ObjectIdentity, ObjectKey};
use tracing::{debug, info};

impl Reconciler {
    /// Reconcile the static addresses of one VSphereMachine
    pub async fn reconcile_vsphere_machine(
        &self,
        key: &ObjectKey,
    ) -> Result<ReconcileResult, ControllerError> {
        let resource = format!("VSphereMachine {key}");

        let Some(vm) = self
            .store
            .get_vsphere_machine(key)
            .await
            .map_err(ControllerError::read(resource.clone()))?
        else {
            debug!(machine = %key, "VSphereMachine not found, nothing to do");
            return Ok(ReconcileResult::done());
        };

        if vm.metadata.deletion_timestamp.is_some() {
            debug!(machine = %key, "VSphereMachine is being deleted");
            return Ok(ReconcileResult::done());
        }

        if !vm.needs_static_addresses() {
            debug!(machine = %key, "No devices need a static address");
            return Ok(ReconcileResult::done());
        }

        let Some(owner) = find_owner(&vm.metadata, CAPI_GROUP, "Machine") else {
            info!(machine = %key, "Waiting for owning Machine to be set");
            return Ok(ReconcileResult::done());
        };
        let machine_key = ObjectKey::new(key.namespace.clone(), owner.name.clone());
        let Some(machine) = self
            .store
            .get_machine(&machine_key)
            .await
            .map_err(ControllerError::read(format!("Machine {machine_key}")))?
        else {
            info!(machine = %key, owner = %machine_key, "Owning Machine not found");
            return Ok(ReconcileResult::done());
        };

        let cluster_name = label(&machine.metadata, CLUSTER_NAME)
            .map(str::to_string)
            .or_else(|| Some(machine.spec.cluster_name.clone()).filter(|n| !n.is_empty()));
        let Some(cluster_name) = cluster_name else {
            info!(machine = %key, "Machine is not part of a cluster");
            return Ok(ReconcileResult::done());
        };
        let cluster_key = ObjectKey::new(key.namespace.clone(), cluster_name);
        let Some(cluster) = self
            .store
            .get_cluster(&cluster_key)
            .await
            .map_err(ControllerError::read(format!("Cluster {cluster_key}")))?
        else {
            info!(machine = %key, cluster = %cluster_key, "Cluster not found");
            return Ok(ReconcileResult::done());
        };

        let Some(ipam) = self.ipam(&resource) else {
            return Ok(ReconcileResult::done());
        };

        let (template, template_labels) = if is_control_plane(&vm, &machine) {
            let template = self.control_plane_template(&cluster).await?;
            let labels = template.metadata.labels.clone();
            (Some(template), labels)
        } else {
            (self.worker_template(&vm, &machine).await, None)
        };

        let ctx = DeviceContext {
            ipam: ipam.as_ref(),
            cluster: cluster_key,
            owner: ObjectIdentity::from_resource(&vm),
            criteria: selection_criteria(vm.metadata.labels.as_ref(), template_labels.as_ref()),
            template_device: template.and_then(|t| t.devices().first().cloned()),
        };

        let snapshot = Snapshot::capture(&vm).map_err(ControllerError::patch(resource.clone()))?;
        let mut working = vm.clone();
        match self.assign_static_addresses(&mut working, &ctx).await? {
            DevicesOutcome::Pending => Ok(ReconcileResult::requeue(self.pending_requeue)),
            DevicesOutcome::Complete => {
                let patch = snapshot
                    .merge_patch(&working)
                    .map_err(ControllerError::patch(resource.clone()))?;
                if let Some(patch) = patch {
                    self.store
                        .patch_vsphere_machine(key, &patch)
                        .await
                        .map_err(ControllerError::patch(resource.clone()))?;
                    info!(machine = %key, "Patched VSphereMachine network devices");
                }
                Ok(ReconcileResult::done())
            }
        }
    }
}
