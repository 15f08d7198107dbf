//! IPAM value types
//!
//! Backend-neutral views of pools and addresses. Backends translate their
//! native resources into these.

use crate::error::IpamError;
use std::collections::BTreeMap;

/// Largest prefix length (IPv6)
pub const MAX_PREFIX: u8 = 128;

/// A pool addresses are claimed from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IPPool {
    /// Pool resource name
    pub name: String,
    /// Namespace holding the pool and its claims
    pub namespace: String,

    /// Cluster the pool is dedicated to
    pub cluster_name: Option<String>,

    /// Address ranges, in allocation order
    pub pools: Vec<Pool>,

    /// Claim name to reserved address
    pub pre_allocations: BTreeMap<String, String>,

    /// Default mask length for ranges that leave it unset
    pub prefix: Option<u8>,
    /// Default gateway for ranges that leave it unset
    pub gateway: Option<String>,
    /// Default nameservers for ranges that leave them unset
    pub dns_servers: Vec<String>,
    /// DNS search domains handed to every address of the pool
    pub search_domains: Vec<String>,
    /// Prefix of the names the backend gives its addresses
    pub name_prefix: String,
}

/// One range of a pool
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pool {
    /// First address of the range
    pub start: Option<String>,
    /// Last address of the range
    pub end: Option<String>,
    /// CIDR the range is drawn from when start and end are unset
    pub subnet: Option<String>,
    /// Mask length, overriding the pool default
    pub prefix: Option<u8>,
    /// Gateway, overriding the pool default
    pub gateway: Option<String>,
    /// Nameservers, overriding the pool default
    pub dns_servers: Vec<String>,
}

/// An address assigned to a fulfilled claim
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IPAddress {
    /// Address resource name
    pub name: String,

    /// Name of the claim this address fulfills
    pub claim: String,

    /// Name of the pool the address came from
    pub pool: String,

    /// Mask length
    pub prefix: u8,
    /// Default route for the device
    pub gateway: Option<String>,
    /// Bare address, without the prefix
    pub address: String,
    /// Nameservers, empty when the backend gives none
    pub dns_servers: Vec<String>,
    /// DNS search domains, empty when the backend gives none
    pub search_domains: Vec<String>,
}

impl IPAddress {
    /// Checks the address can be written to a device: an address and a
    /// gateway are required and the prefix must be a real mask length.
    pub fn validate(&self) -> Result<(), IpamError> {
        if self.address.trim().is_empty() {
            return Err(IpamError::InvalidAddress(format!(
                "IPAddress {} has no address",
                self.name
            )));
        }
        if self.gateway.as_deref().is_none_or(|g| g.trim().is_empty()) {
            return Err(IpamError::InvalidAddress(format!(
                "IPAddress {} has no gateway",
                self.name
            )));
        }
        if self.prefix == 0 || self.prefix > MAX_PREFIX {
            return Err(IpamError::InvalidAddress(format!(
                "IPAddress {} has invalid prefix {}",
                self.name, self.prefix
            )));
        }
        Ok(())
    }

    /// Address in CIDR notation, e.g. `10.10.100.20/18`
    pub fn cidr(&self) -> String {
        format!("{}/{}", self.address, self.prefix)
    }

    /// Gateway, empty when unset
    pub fn gateway(&self) -> &str {
        self.gateway.as_deref().unwrap_or_default()
    }
}
