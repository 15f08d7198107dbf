//! Static IP CRD Views
//!
//! Rust types for the Kubernetes resources the static IP controller reads
//! and patches. None of these CRDs are owned by this project: Cluster API,
//! the vSphere infrastructure provider and the metal3 IP address manager
//! register them. Schema generation is disabled for all of them.

pub mod capi;
pub mod labels;
pub mod metal3;
pub mod references;
pub mod vsphere;

pub use capi::*;
pub use references::*;
pub use vsphere::*;
