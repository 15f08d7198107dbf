//! Controller-specific error types.
//!
//! Store and IPAM helpers return their own errors; reconcile functions wrap
//! them with the resource they were working on.

use ipam::IpamError;
use kube::Error as KubeError;
use thiserror::Error;

/// Errors from the resource store seam
#[derive(Debug, Error)]
pub enum StoreError {
    /// Optimistic concurrency check failed (HTTP 409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors that can occur in the Static IP Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Reading a resource failed
    #[error("Failed to read {resource}: {source}")]
    Read {
        resource: String,
        #[source]
        source: StoreError,
    },

    /// Writing the merge patch failed
    #[error("Failed to patch {resource}: {source}")]
    Patch {
        resource: String,
        #[source]
        source: StoreError,
    },

    /// IPAM backend call failed
    #[error("IPAM error for {resource}: {source}")]
    Ipam {
        resource: String,
        #[source]
        source: IpamError,
    },

    /// Fulfilled address cannot be applied
    #[error("Invalid address for {resource}: {source}")]
    InvalidAddress {
        resource: String,
        #[source]
        source: IpamError,
    },

    /// Control plane template could not be resolved
    #[error("Template lookup failed for {resource}: {reason}")]
    TemplateLookup { resource: String, reason: String },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl ControllerError {
    pub(crate) fn read(resource: impl Into<String>) -> impl FnOnce(StoreError) -> Self {
        let resource = resource.into();
        move |source| ControllerError::Read { resource, source }
    }

    pub(crate) fn patch(resource: impl Into<String>) -> impl FnOnce(StoreError) -> Self {
        let resource = resource.into();
        move |source| ControllerError::Patch { resource, source }
    }

    pub(crate) fn ipam(resource: impl Into<String>) -> impl FnOnce(IpamError) -> Self {
        let resource = resource.into();
        move |source| ControllerError::Ipam { resource, source }
    }
}
