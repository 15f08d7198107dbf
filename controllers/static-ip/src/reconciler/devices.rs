//! Static addresses for network device lists.
//!
//! VSphereMachine and HAProxyLoadBalancer both carry a device list; this is
//! the one algorithm that fills it in.

use super::Reconciler;
use super::allocation::{Allocation, request_address};
use crate::error::ControllerError;
use crds::labels::NETWORK_NAME;
use crds::{HAProxyLoadBalancer, NetworkDeviceSpec, ObjectIdentity, ObjectKey, VSphereMachine};
use ipam::{IPAddress, IPAddressManager, IPPool};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Resources that own a list of network devices
pub trait NetworkDevices {
    /// Device 0 is claimed under the owner name alone
    const SINGLE_DEVICE: bool;

    fn devices(&self) -> &[NetworkDeviceSpec];
    fn devices_mut(&mut self) -> &mut Vec<NetworkDeviceSpec>;

    /// Any device still waiting for a static address
    fn needs_static_addresses(&self) -> bool {
        self.devices().iter().any(needs_static_address)
    }
}

impl NetworkDevices for VSphereMachine {
    const SINGLE_DEVICE: bool = false;

    fn devices(&self) -> &[NetworkDeviceSpec] {
        &self.spec.clone.network.devices
    }

    fn devices_mut(&mut self) -> &mut Vec<NetworkDeviceSpec> {
        &mut self.spec.clone.network.devices
    }
}

impl NetworkDevices for HAProxyLoadBalancer {
    const SINGLE_DEVICE: bool = true;

    fn devices(&self) -> &[NetworkDeviceSpec] {
        &self.spec.virtual_machine_configuration.network.devices
    }

    fn devices_mut(&mut self) -> &mut Vec<NetworkDeviceSpec> {
        &mut self.spec.virtual_machine_configuration.network.devices
    }
}

/// DHCP devices and devices that already have addresses are left alone
pub fn needs_static_address(device: &NetworkDeviceSpec) -> bool {
    !device.uses_dhcp() && !device.has_addresses()
}

/// Inputs shared by every device of one resource
pub struct DeviceContext<'a> {
    pub ipam: &'a dyn IPAddressManager,
    pub cluster: ObjectKey,
    pub owner: ObjectIdentity,
    /// Pool selection labels before the per-device network name
    pub criteria: BTreeMap<String, String>,
    /// First device of the template the resource was cloned from
    pub template_device: Option<NetworkDeviceSpec>,
}

/// Result of a pass over the device list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevicesOutcome {
    /// Every device is settled; the working copy may hold changes to patch
    Complete,
    /// A pool or claim is pending; the working copy must not be patched
    Pending,
}

impl Reconciler {
    /// Fills in static addresses on `resource` in device order.
    ///
    /// Stops at the first device whose pool or claim is pending. An address
    /// that fails validation is an error.
    pub(crate) async fn assign_static_addresses<R: NetworkDevices>(
        &self,
        resource: &mut R,
        ctx: &DeviceContext<'_>,
    ) -> Result<DevicesOutcome, ControllerError> {
        let resource_name = ctx.owner.key().to_string();

        for index in 0..resource.devices().len() {
            let device = &resource.devices()[index];
            if !needs_static_address(device) {
                debug!(resource = %resource_name, device = index, "Device uses DHCP or is already allocated");
                continue;
            }

            let mut criteria = ctx.criteria.clone();
            if !device.network_name.is_empty() {
                criteria.insert(NETWORK_NAME.to_string(), device.network_name.clone());
            }

            let allocation = request_address(
                ctx.ipam,
                &criteria,
                &ctx.cluster,
                &ctx.owner,
                index,
                R::SINGLE_DEVICE,
            )
            .await
            .map_err(ControllerError::ipam(resource_name.clone()))?;

            match allocation {
                Allocation::PoolPending | Allocation::ClaimPending => {
                    return Ok(DevicesOutcome::Pending);
                }
                Allocation::Fulfilled { address, pool } => {
                    address.validate().map_err(|source| ControllerError::InvalidAddress {
                        resource: resource_name.clone(),
                        source,
                    })?;
                    let device = &mut resource.devices_mut()[index];
                    apply_address(device, &address, &pool, ctx.template_device.as_ref());
                    info!(
                        resource = %resource_name,
                        device = index,
                        address = %address.cidr(),
                        gateway = %address.gateway(),
                        "Assigned static address"
                    );
                }
            }
        }

        Ok(DevicesOutcome::Complete)
    }
}

/// Writes a fulfilled address into a device.
///
/// Nameservers come from the address, then the pool, then the template;
/// search domains from the address, then the pool, then the template. With
/// no source the device keeps what it has.
pub fn apply_address(
    device: &mut NetworkDeviceSpec,
    address: &IPAddress,
    pool: &IPPool,
    template: Option<&NetworkDeviceSpec>,
) {
    device.ip_addrs = vec![address.cidr()];
    device.gateway4 = address.gateway().to_string();

    if let Some(nameservers) = first_non_empty(&[
        address.dns_servers.as_slice(),
        pool.dns_servers.as_slice(),
        template.map(|t| t.nameservers.as_slice()).unwrap_or_default(),
    ]) {
        device.nameservers = nameservers.to_vec();
    }

    if let Some(domains) = first_non_empty(&[
        address.search_domains.as_slice(),
        pool.search_domains.as_slice(),
        template.map(|t| t.search_domains.as_slice()).unwrap_or_default(),
    ]) {
        device.search_domains = domains.to_vec();
    }
}

fn first_non_empty<'a>(sources: &[&'a [String]]) -> Option<&'a [String]> {
    sources.iter().copied().find(|s| !s.is_empty())
}
