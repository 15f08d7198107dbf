//! IP Address Management
//!
//! The capability boundary between the static IP reconcilers and whatever
//! actually hands out addresses. Reconcilers only ever talk to
//! [`IPAddressManager`]; backends are registered in an [`IpamFactory`] at
//! startup and looked up by [`IpamType`].
//!
//! # Example
//!
//! ```no_run
//! use ipam::{IpamFactory, IpamType};
//! use crds::ObjectKey;
//! use std::collections::BTreeMap;
//!
//! # async fn example(client: kube::Client, owner: crds::ObjectIdentity) -> Result<(), ipam::IpamError> {
//! let mut factory = IpamFactory::new();
//! ipam::metal3::register(&mut factory, client);
//!
//! let manager = factory.get(IpamType::Metal3io).expect("registered above");
//! let cluster = ObjectKey::new("default", "workload");
//! if let Some(pool) = manager.get_available_ip_pool(&BTreeMap::new(), &cluster).await? {
//!     let address = manager.get_ip("workload-md-0-abcde-0", &pool, &owner).await?;
//!     println!("{:?}", address.map(|a| a.cidr()));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Backends
//!
//! - **metal3io**: claims addresses by creating `IPClaim` resources that the
//!   metal3 IP address manager fulfills asynchronously

pub mod error;
pub mod factory;
pub mod metal3;
pub mod models;
#[path = "trait.rs"]
pub mod ipam_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use error::IpamError;
pub use factory::{IpamFactory, IpamType};
pub use ipam_trait::IPAddressManager;
pub use models::*;
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MemoryMetal3Store, pool_fixture};
