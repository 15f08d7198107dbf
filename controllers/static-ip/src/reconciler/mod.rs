//! Reconciliation logic for the static IP controller.
//!
//! - `machine`: VSphereMachine network devices
//! - `load_balancer`: HAProxyLoadBalancer VM devices
//! - `cluster`: VSphereCluster control plane endpoint
//!
//! Machines and load balancers share the device algorithm in `devices`;
//! all three share the claim-then-poll step in `allocation`.

pub mod allocation;
pub mod cluster;
pub mod devices;
pub mod load_balancer;
pub mod machine;
pub mod pool_selection;

#[cfg(test)]
mod pool_selection_test;

use crate::backoff::FibonacciBackoff;
use crate::store::ClusterStore;
use ipam::{IPAddressManager, IpamFactory, IpamType};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

/// Outcome of a successful reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileResult {
    /// Re-run after this delay; `None` leaves it to the periodic resync
    pub requeue_after: Option<Duration>,
}

impl ReconcileResult {
    /// Nothing left to do
    pub fn done() -> Self {
        Self { requeue_after: None }
    }

    /// Poll again after `after`
    pub fn requeue(after: Duration) -> Self {
        Self {
            requeue_after: Some(after),
        }
    }
}

/// Backoff state for a resource
#[derive(Debug, Clone)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

impl BackoffState {
    fn new() -> Self {
        Self {
            backoff: FibonacciBackoff::new(1, 10), // 1 minute min, 10 minutes max
            error_count: 0,
        }
    }

    fn increment_error(&mut self) {
        self.error_count += 1;
    }
}

/// Reconciles static IP assignment for vSphere resources.
pub struct Reconciler {
    pub(crate) store: Arc<dyn ClusterStore>,
    ipam_factory: IpamFactory,
    ipam_type: IpamType,
    /// Delay before polling a pending pool or claim again
    pub(crate) pending_requeue: Duration,
    /// Error count tracking per resource (kind/namespace/name -> BackoffState)
    backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ClusterStore>,
        ipam_factory: IpamFactory,
        ipam_type: IpamType,
        pending_requeue: Duration,
    ) -> Self {
        Self {
            store,
            ipam_factory,
            ipam_type,
            pending_requeue,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Configured IPAM backend; logs and returns `None` when it is not registered
    pub(crate) fn ipam(&self, resource: &str) -> Option<Arc<dyn IPAddressManager>> {
        let manager = self.ipam_factory.get(self.ipam_type);
        if manager.is_none() {
            warn!(
                resource = %resource,
                ipam_type = %self.ipam_type,
                "IPAM type has no registered implementation, skipping"
            );
        }
        manager
    }

    /// Get the Fibonacci backoff duration for a resource based on its error count
    ///
    /// Returns (backoff_seconds, error_count)
    pub fn get_backoff_for_resource(&self, resource_key: &str) -> (u64, u32) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states
                    .entry(resource_key.to_string())
                    .or_insert_with(BackoffState::new);
                let backoff_seconds = state.backoff.next_backoff_seconds();
                (backoff_seconds, state.error_count)
            }
            Err(e) => {
                warn!("Failed to lock backoff_states: {}, using default backoff", e);
                (60, 0)
            }
        }
    }

    /// Increment error count for a resource
    pub fn increment_error(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states
                .entry(resource_key.to_string())
                .or_insert_with(BackoffState::new)
                .increment_error();
        }
    }

    /// Forget the error state of a resource (on successful reconciliation)
    pub fn reset_error(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(resource_key);
        }
    }
}
