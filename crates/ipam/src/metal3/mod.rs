//! metal3 IPAM backend
//!
//! Allocation creates an `IPClaim` next to the selected `IPPool`; the metal3
//! IP address manager answers with an `IPAddress` and links it from the
//! claim status.

mod convert;
mod manager;
mod store;

pub use convert::{address_from_metal3, pool_from_metal3};
pub use manager::Metal3Ipam;
pub use store::{KubeMetal3Store, Metal3Store, label_selector};

use crate::factory::{IpamFactory, IpamType};
use crate::ipam_trait::IPAddressManager;
use std::sync::Arc;

/// Registers the kube-backed metal3 backend under [`IpamType::Metal3io`]
pub fn register(factory: &mut IpamFactory, client: kube::Client) {
    factory.register(IpamType::Metal3io, move || {
        Arc::new(Metal3Ipam::new(KubeMetal3Store::new(client.clone()))) as Arc<dyn IPAddressManager>
    });
}
