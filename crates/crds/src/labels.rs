//! Label and annotation keys
//!
//! These strings are shared with Cluster API, CAPV and operators writing
//! IPPools; they must match exactly.

/// Cluster a resource belongs to.
pub const CLUSTER_NAME: &str = "cluster.x-k8s.io/cluster-name";

/// Network a pool serves; matched against a device's `networkName`.
pub const NETWORK_NAME: &str = "cluster.x-k8s.io/network-name";

/// Binds a resource to a single IPPool by name.
pub const IP_POOL_NAME: &str = "cluster.x-k8s.io/ip-pool-name";

/// Binds a resource to any IPPool carrying the same group label.
pub const IP_POOL_GROUP: &str = "cluster.x-k8s.io/ip-pool-group";

/// Looks the IPPool up in this namespace instead of the cluster's.
pub const IP_POOL_NAMESPACE: &str = "cluster.x-k8s.io/ip-pool-namespace";

/// IPPool annotation holding comma separated DNS search domains.
pub const DNS_SEARCH_DOMAINS: &str = "cluster.x-k8s.io/dns-search-domains";

/// Annotation set on a VSphereMachine naming the template it was cloned from.
pub const TEMPLATE_CLONED_FROM_NAME: &str = "cluster.x-k8s.io/cloned-from-name";

/// IPClaim annotation holding the UID of the resource the claim was made for.
pub const CLAIM_OWNER_UID: &str = "cluster.x-k8s.io/ip-claim-owner-uid";

/// Present on control plane machines.
pub const CONTROL_PLANE: &str = "cluster.x-k8s.io/control-plane";

/// MachineDeployment a worker Machine was created by.
pub const DEPLOYMENT_NAME: &str = "cluster.x-k8s.io/deployment-name";

/// Splits the search domain annotation value, dropping blanks.
pub fn split_search_domains(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
