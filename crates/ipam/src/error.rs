//! IPAM errors

use thiserror::Error;

/// Errors returned by IPAM backends
#[derive(Debug, Error)]
pub enum IpamError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Object already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Claim of that name was made for a different resource
    #[error("Claim owned by another resource: {0}")]
    ClaimConflict(String),

    /// Fulfilled address is unusable (missing address, gateway or prefix)
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// IPAM type name not known to this build
    #[error("Unsupported IPAM type: {0}")]
    Unsupported(String),

    /// Backend store failure not carried by a Kubernetes error, for store
    /// seams that are not backed by the API server
    #[error("Store error: {0}")]
    Store(String),
}
