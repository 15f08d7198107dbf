//! Main controller implementation.
//!
//! Wires the Kubernetes client, the IPAM registry and the reconciler
//! together and runs one watcher per kind:
//! - VSphereMachine
//! - HAProxyLoadBalancer
//! - VSphereCluster

use crate::config::Config;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::store::KubeClusterStore;
use crate::watcher::{WatchSettings, Watcher};
use ipam::IpamFactory;
use kube::{Api, Client, Resource};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Main controller for static IP assignment.
pub struct Controller {
    vsphere_machine_watcher: JoinHandle<Result<(), ControllerError>>,
    load_balancer_watcher: JoinHandle<Result<(), ControllerError>>,
    vsphere_cluster_watcher: JoinHandle<Result<(), ControllerError>>,
}

fn watch_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

impl Controller {
    /// Creates a new controller instance and starts its watchers.
    pub async fn new(config: Config) -> Result<Self, ControllerError> {
        info!("Initializing Static IP Controller");

        let client = Client::try_default().await?;

        let mut ipam_factory = IpamFactory::new();
        ipam::metal3::register(&mut ipam_factory, client.clone());
        if !ipam_factory.is_registered(config.ipam_type) {
            return Err(ControllerError::InvalidConfig(format!(
                "IPAM type {} is not available",
                config.ipam_type
            )));
        }

        let reconciler = Arc::new(Reconciler::new(
            Arc::new(KubeClusterStore::new(client.clone())),
            ipam_factory,
            config.ipam_type,
            config.pending_requeue,
        ));

        let namespace = config.watch_namespace.as_deref();
        let watcher_instance = Arc::new(Watcher::new(
            reconciler,
            WatchSettings {
                sync_period: config.sync_period,
                debounce: config.debounce,
                concurrency: config.max_concurrent_reconciles,
            },
            watch_api(&client, namespace),
            watch_api(&client, namespace),
            watch_api(&client, namespace),
        ));

        let vsphere_machine_watcher = {
            let watcher = watcher_instance.clone();
            tokio::spawn(async move { watcher.watch_vsphere_machines().await })
        };

        let load_balancer_watcher = {
            let watcher = watcher_instance.clone();
            tokio::spawn(async move { watcher.watch_load_balancers().await })
        };

        let vsphere_cluster_watcher = {
            let watcher = watcher_instance;
            tokio::spawn(async move { watcher.watch_vsphere_clusters().await })
        };

        Ok(Self {
            vsphere_machine_watcher,
            load_balancer_watcher,
            vsphere_cluster_watcher,
        })
    }

    /// Runs the controller until a watcher exits.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Static IP Controller running");

        tokio::select! {
            result = &mut self.vsphere_machine_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("VSphereMachine watcher panicked: {}", e)))?
                    .map_err(|e| ControllerError::Watch(format!("VSphereMachine watcher error: {}", e)))?;
            }
            result = &mut self.load_balancer_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("HAProxyLoadBalancer watcher panicked: {}", e)))?
                    .map_err(|e| ControllerError::Watch(format!("HAProxyLoadBalancer watcher error: {}", e)))?;
            }
            result = &mut self.vsphere_cluster_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("VSphereCluster watcher panicked: {}", e)))?
                    .map_err(|e| ControllerError::Watch(format!("VSphereCluster watcher error: {}", e)))?;
            }
        }

        info!("Static IP Controller stopped");
        Ok(())
    }
}
