//! Pool selection labels and template inheritance.
//!
//! Operators bind pools on machine templates, not on the machines cloned
//! from them. Control plane machines therefore inherit selection labels from
//! the template of their KubeadmControlPlane; worker templates are only used
//! to inherit nameservers and search domains.

use super::Reconciler;
use crate::error::ControllerError;
use crds::labels::{CONTROL_PLANE, DEPLOYMENT_NAME, IP_POOL_NAME, TEMPLATE_CLONED_FROM_NAME};
use crds::references::{annotation, label};
use crds::{Cluster, Machine, ObjectKey, VSphereMachine, VSphereMachineTemplate};
use k8s_openapi::api::core::v1::ObjectReference;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Control plane machines carry the control plane label on either object
pub fn is_control_plane(vm: &VSphereMachine, machine: &Machine) -> bool {
    let has_label = |labels: &Option<BTreeMap<String, String>>| {
        labels.as_ref().is_some_and(|l| l.contains_key(CONTROL_PLANE))
    };
    has_label(&vm.metadata.labels) || has_label(&machine.metadata.labels)
}

/// Pool selection labels: the resource's labels, overlaid by the template's,
/// overlaid again by the resource's own pool name override
pub fn selection_criteria(
    resource_labels: Option<&BTreeMap<String, String>>,
    template_labels: Option<&BTreeMap<String, String>>,
) -> BTreeMap<String, String> {
    let mut criteria = resource_labels.cloned().unwrap_or_default();
    if let Some(template_labels) = template_labels {
        criteria.extend(template_labels.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    if let Some(pool) = resource_labels.and_then(|l| l.get(IP_POOL_NAME)) {
        criteria.insert(IP_POOL_NAME.to_string(), pool.clone());
    }
    criteria
}

fn reference_key(reference: &ObjectReference, default_namespace: &str) -> Option<ObjectKey> {
    let name = reference.name.as_deref().filter(|n| !n.is_empty())?;
    let namespace = reference
        .namespace
        .as_deref()
        .filter(|n| !n.is_empty())
        .unwrap_or(default_namespace);
    Some(ObjectKey::new(namespace, name))
}

impl Reconciler {
    /// Infrastructure template of the cluster's control plane.
    ///
    /// Every hop is required: the first KubeadmControlPlane labelled with the
    /// cluster name, its infrastructure reference, and the template itself.
    pub(crate) async fn control_plane_template(
        &self,
        cluster: &Cluster,
    ) -> Result<VSphereMachineTemplate, ControllerError> {
        let cluster_key = ObjectKey::from_meta(&cluster.metadata);
        let resource = format!("Cluster {cluster_key}");
        let lookup_error = |reason: String| ControllerError::TemplateLookup {
            resource: resource.clone(),
            reason,
        };

        let control_planes = self
            .store
            .list_control_planes(&cluster_key.namespace, &cluster_key.name)
            .await
            .map_err(ControllerError::read(resource.clone()))?;
        let control_plane = control_planes
            .first()
            .ok_or_else(|| lookup_error("no KubeadmControlPlane found".to_string()))?;

        let template_key = control_plane
            .spec
            .machine_template
            .infrastructure_ref
            .as_ref()
            .and_then(|r| reference_key(r, &cluster_key.namespace))
            .ok_or_else(|| {
                lookup_error(format!(
                    "KubeadmControlPlane {} has no infrastructure template",
                    control_plane.metadata.name.as_deref().unwrap_or_default()
                ))
            })?;

        let template = self
            .store
            .get_machine_template(&template_key)
            .await
            .map_err(ControllerError::read(format!("VSphereMachineTemplate {template_key}")))?
            .ok_or_else(|| lookup_error(format!("VSphereMachineTemplate {template_key} not found")))?;

        debug!(cluster = %cluster_key, template = %template_key, "Resolved control plane template");
        Ok(template)
    }

    /// Template a worker machine was cloned from, if it can be found.
    ///
    /// Tries the cloned-from annotation, then the MachineDeployment of the
    /// owning Machine. Lookup failures are logged and yield `None`.
    pub(crate) async fn worker_template(
        &self,
        vm: &VSphereMachine,
        machine: &Machine,
    ) -> Option<VSphereMachineTemplate> {
        let vm_key = ObjectKey::from_meta(&vm.metadata);

        let template_key = match annotation(&vm.metadata, TEMPLATE_CLONED_FROM_NAME) {
            Some(name) => ObjectKey::new(vm_key.namespace.clone(), name),
            None => self.deployment_template_key(&vm_key, machine).await?,
        };

        match self.store.get_machine_template(&template_key).await {
            Ok(template) => {
                if template.is_none() {
                    debug!(machine = %vm_key, template = %template_key, "Worker template not found");
                }
                template
            }
            Err(e) => {
                warn!(machine = %vm_key, template = %template_key, error = %e, "Failed to read worker template");
                None
            }
        }
    }

    async fn deployment_template_key(&self, vm_key: &ObjectKey, machine: &Machine) -> Option<ObjectKey> {
        let deployment = label(&machine.metadata, DEPLOYMENT_NAME)?;
        let deployment_key = ObjectKey::new(vm_key.namespace.clone(), deployment);
        match self.store.get_machine_deployment(&deployment_key).await {
            Ok(Some(deployment)) => deployment
                .spec
                .template
                .spec
                .infrastructure_ref
                .as_ref()
                .and_then(|r| reference_key(r, &vm_key.namespace)),
            Ok(None) => {
                debug!(machine = %vm_key, deployment = %deployment_key, "MachineDeployment not found");
                None
            }
            Err(e) => {
                warn!(machine = %vm_key, deployment = %deployment_key, error = %e, "Failed to read MachineDeployment");
                None
            }
        }
    }
}
