//! vSphere infrastructure provider kinds
//!
//! VSphereMachine, HAProxyLoadBalancer and VSphereCluster are the kinds the
//! controller patches. Network devices keep every field this crate does not
//! model so a patch replacing the device list round-trips them unchanged.

use crate::capi::ApiEndpoint;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// API group of the vSphere infrastructure provider.
pub const INFRASTRUCTURE_GROUP: &str = "infrastructure.cluster.x-k8s.io";

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1alpha4",
    kind = "VSphereMachine",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct VSphereMachineSpec {
    /// Provider ID set once the VM exists
    #[serde(rename = "providerID", default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,

    #[serde(flatten)]
    pub clone: VirtualMachineCloneSpec,
}

/// Clone settings shared by machines, templates and load balancer VMs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineCloneSpec {
    /// Name of the VM template to clone
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub template: String,

    /// Network configuration of the VM
    #[serde(default)]
    pub network: NetworkSpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    /// Network devices, in guest order
    #[serde(default)]
    pub devices: Vec<NetworkDeviceSpec>,
}

/// One guest network interface
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDeviceSpec {
    /// vSphere network (port group) the device attaches to
    #[serde(default)]
    pub network_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,

    #[serde(default)]
    pub dhcp4: bool,

    #[serde(default)]
    pub dhcp6: bool,

    /// IPv4 gateway
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub gateway4: String,

    /// IPv6 gateway
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub gateway6: String,

    /// Static addresses in CIDR notation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ip_addrs: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_addr: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nameservers: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub search_domains: Vec<String>,

    /// Fields not modelled here (routes, mtu, dhcp overrides...)
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl NetworkDeviceSpec {
    /// DHCP devices never get a static address
    pub fn uses_dhcp(&self) -> bool {
        self.dhcp4 || self.dhcp6
    }

    /// A device with addresses is already allocated
    pub fn has_addresses(&self) -> bool {
        !self.ip_addrs.is_empty()
    }
}

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1alpha4",
    kind = "VSphereMachineTemplate",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct VSphereMachineTemplateSpec {
    #[serde(default)]
    pub template: VSphereMachineTemplateResource,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VSphereMachineTemplateResource {
    #[serde(default)]
    pub spec: VSphereMachineSpec,
}

impl VSphereMachineTemplate {
    /// Devices machines cloned from this template start with
    pub fn devices(&self) -> &[NetworkDeviceSpec] {
        &self.spec.template.spec.clone.network.devices
    }
}

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1alpha4",
    kind = "VSphereCluster",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct VSphereClusterSpec {
    /// vCenter server address
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub server: String,

    /// Control plane endpoint; the host is assigned by this controller
    /// when no load balancer fronts the control plane
    #[serde(default)]
    pub control_plane_endpoint: ApiEndpoint,

    /// Load balancer fronting the control plane
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer_ref: Option<ObjectReference>,
}

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1alpha4",
    kind = "HAProxyLoadBalancer",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct HAProxyLoadBalancerSpec {
    /// VM running HAProxy in front of the control plane
    #[serde(default)]
    pub virtual_machine_configuration: VirtualMachineCloneSpec,
}
