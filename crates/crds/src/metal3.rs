//! metal3 IP address manager kinds
//!
//! The metal3 IPAM controller fulfills IPClaims by creating IPAddresses out
//! of IPPool ranges. This controller creates claims and reads the rest.

use k8s_openapi::api::core::v1::ObjectReference;
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// API group of the metal3 IPAM kinds.
pub const METAL3_GROUP: &str = "ipam.metal3.io";

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize)]
#[kube(
    group = "ipam.metal3.io",
    version = "v1alpha1",
    kind = "IPPool",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct IPPoolSpec {
    /// Cluster this pool is dedicated to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,

    /// Address ranges
    #[serde(default)]
    pub pools: Vec<Pool>,

    /// Static reservations, claim name to address
    #[serde(default)]
    pub pre_allocations: BTreeMap<String, String>,

    /// Default prefix length for ranges without one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<i32>,

    /// Default gateway for ranges without one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,

    #[serde(default)]
    pub dns_servers: Vec<String>,

    /// Prefix of generated IPAddress names
    #[serde(default)]
    pub name_prefix: String,
}

/// One address range of a pool
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,

    /// Subnet in CIDR notation, an alternative to start/end
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,

    #[serde(default)]
    pub dns_servers: Vec<String>,
}

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize)]
#[kube(
    group = "ipam.metal3.io",
    version = "v1alpha1",
    kind = "IPClaim",
    namespaced,
    status = "IPClaimStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct IPClaimSpec {
    /// Pool to allocate from
    pub pool: ObjectReference,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IPClaimStatus {
    /// IPAddress fulfilling this claim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<ObjectReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize)]
#[kube(
    group = "ipam.metal3.io",
    version = "v1alpha1",
    kind = "IPAddress",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct IPAddressSpec {
    /// Claim this address fulfills
    pub claim: ObjectReference,

    /// Pool the address was taken from
    pub pool: ObjectReference,

    pub address: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,

    #[serde(default)]
    pub dns_servers: Vec<String>,
}
