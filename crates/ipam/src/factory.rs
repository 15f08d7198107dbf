//! IPAM backend registry
//!
//! Built once at controller startup and handed to the reconcilers.

use crate::error::IpamError;
use crate::ipam_trait::IPAddressManager;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Known IPAM backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpamType {
    /// metal3 IP address manager (`ipam.metal3.io`)
    Metal3io,
}

impl IpamType {
    /// Name used in configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            IpamType::Metal3io => "metal3io",
        }
    }
}

impl fmt::Display for IpamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IpamType {
    type Err = IpamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "metal3io" => Ok(IpamType::Metal3io),
            other => Err(IpamError::Unsupported(other.to_string())),
        }
    }
}

/// Builds a backend instance
pub type IpamConstructor = Arc<dyn Fn() -> Arc<dyn IPAddressManager> + Send + Sync>;

/// Mapping from backend type to constructor
#[derive(Clone, Default)]
pub struct IpamFactory {
    constructors: HashMap<IpamType, IpamConstructor>,
}

impl IpamFactory {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the constructor for a backend type
    pub fn register<F>(&mut self, ipam_type: IpamType, constructor: F)
    where
        F: Fn() -> Arc<dyn IPAddressManager> + Send + Sync + 'static,
    {
        self.constructors.insert(ipam_type, Arc::new(constructor));
    }

    /// Instance of a registered backend, `None` when nothing is registered for the type
    pub fn get(&self, ipam_type: IpamType) -> Option<Arc<dyn IPAddressManager>> {
        self.constructors.get(&ipam_type).map(|build| build())
    }

    /// Whether `ipam_type` has a constructor
    pub fn is_registered(&self, ipam_type: IpamType) -> bool {
        self.constructors.contains_key(&ipam_type)
    }
}

impl fmt::Debug for IpamFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IpamFactory")
            .field("types", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}
