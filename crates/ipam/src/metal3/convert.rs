//! metal3 resources to IPAM value types

use crate::error::IpamError;
use crate::models::{IPAddress, IPPool, MAX_PREFIX, Pool};
use crds::labels::{DNS_SEARCH_DOMAINS, split_search_domains};
use crds::metal3;
use crds::references::annotation;

fn prefix(value: Option<i32>) -> Option<u8> {
    value.and_then(|p| u8::try_from(p).ok()).filter(|p| *p <= MAX_PREFIX)
}

/// Converts an IPPool. Search domains come from the pool annotation.
pub fn pool_from_metal3(pool: &metal3::IPPool) -> IPPool {
    let spec = &pool.spec;
    IPPool {
        name: pool.metadata.name.clone().unwrap_or_default(),
        namespace: pool.metadata.namespace.clone().unwrap_or_default(),
        cluster_name: spec.cluster_name.clone().filter(|c| !c.is_empty()),
        pools: spec
            .pools
            .iter()
            .map(|p| Pool {
                start: p.start.clone(),
                end: p.end.clone(),
                subnet: p.subnet.clone(),
                prefix: prefix(p.prefix),
                gateway: p.gateway.clone(),
                dns_servers: p.dns_servers.clone(),
            })
            .collect(),
        pre_allocations: spec.pre_allocations.clone(),
        prefix: prefix(spec.prefix),
        gateway: spec.gateway.clone(),
        dns_servers: spec.dns_servers.clone(),
        search_domains: annotation(&pool.metadata, DNS_SEARCH_DOMAINS)
            .map(split_search_domains)
            .unwrap_or_default(),
        name_prefix: spec.name_prefix.clone(),
    }
}

/// Converts an IPAddress, attaching the search domains of its pool.
///
/// Prefixes outside 0..=128 are rejected; a missing prefix becomes 0 and
/// fails [`IPAddress::validate`].
pub fn address_from_metal3(
    address: &metal3::IPAddress,
    search_domains: &[String],
) -> Result<IPAddress, IpamError> {
    let name = address.metadata.name.clone().unwrap_or_default();
    let prefix = match address.spec.prefix {
        None => 0,
        Some(p) => u8::try_from(p)
            .ok()
            .filter(|p| *p <= MAX_PREFIX)
            .ok_or_else(|| IpamError::InvalidAddress(format!("IPAddress {name} has prefix {p}")))?,
    };
    Ok(IPAddress {
        claim: address.spec.claim.name.clone().unwrap_or_default(),
        pool: address.spec.pool.name.clone().unwrap_or_default(),
        prefix,
        gateway: address.spec.gateway.clone().filter(|g| !g.is_empty()),
        address: address.spec.address.clone(),
        dns_servers: address.spec.dns_servers.clone(),
        search_domains: search_domains.to_vec(),
        name,
    })
}
