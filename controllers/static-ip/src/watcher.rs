//! Kubernetes resource watchers.
//!
//! Each watched kind runs its own `kube_runtime::Controller`, which
//! serialises reconciles per object, retries failed ones through the error
//! policy and keeps the watch alive across reconnects.

use crate::error::ControllerError;
use crate::reconciler::{ReconcileResult, Reconciler};
use crds::{HAProxyLoadBalancer, ObjectKey, VSphereCluster, VSphereMachine};
use futures::StreamExt;
use kube::{Api, Resource, ResourceExt};
use kube_runtime::{
    Controller, watcher,
    controller::{Action, Config as ControllerConfig},
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Boxed reconcile future of one watched kind
type ReconcileFuture = Pin<Box<dyn Future<Output = Result<ReconcileResult, ControllerError>> + Send>>;

/// Dispatch settings shared by every watched kind
#[derive(Debug, Clone, Copy)]
pub struct WatchSettings {
    pub sync_period: Duration,
    pub debounce: Duration,
    pub concurrency: u16,
}

fn backoff_key<K: Resource<DynamicType = ()>>(obj: &K) -> String {
    format!(
        "{}/{}/{}",
        K::kind(&()),
        obj.namespace().unwrap_or_default(),
        obj.name_any()
    )
}

/// Generic watcher helper around `kube_runtime::Controller`.
///
/// The reconcile function receives the object key and refetches the object
/// itself. A requested delay becomes the requeue; otherwise the object is
/// resynced after the sync period. Errors requeue with a per-object
/// Fibonacci backoff that resets on the next success.
async fn watch_resource<K, F>(
    api: Api<K>,
    reconciler: Arc<Reconciler>,
    reconcile_fn: F,
    settings: WatchSettings,
) -> Result<(), ControllerError>
where
    K: Resource<DynamicType = ()>
        + Clone
        + Send
        + Sync
        + 'static
        + std::fmt::Debug
        + serde::de::DeserializeOwned,
    F: Fn(Arc<Reconciler>, ObjectKey) -> ReconcileFuture + Send + Sync + Clone + 'static,
{
    let resource_name = K::kind(&()).into_owned();
    info!("Starting {} watcher", resource_name);

    let error_policy = |obj: Arc<K>, error: &ControllerError, ctx: Arc<Reconciler>| {
        let key = backoff_key(obj.as_ref());
        ctx.increment_error(&key);
        let (backoff_seconds, error_count) = ctx.get_backoff_for_resource(&key);
        error!(
            resource = %key,
            error_count,
            backoff_seconds,
            "Reconciliation error: {}",
            error
        );
        Action::requeue(Duration::from_secs(backoff_seconds))
    };

    let sync_period = settings.sync_period;
    let reconcile = move |obj: Arc<K>, ctx: Arc<Reconciler>| {
        let reconcile_fn = reconcile_fn.clone();
        async move {
            let key = ObjectKey::new(obj.namespace().unwrap_or_default(), obj.name_any());
            let backoff = backoff_key(obj.as_ref());
            debug!(resource = %backoff, "Reconciling");

            let result = reconcile_fn(ctx.clone(), key).await?;
            ctx.reset_error(&backoff);
            Ok::<_, ControllerError>(Action::requeue(result.requeue_after.unwrap_or(sync_period)))
        }
    };

    let controller_config = ControllerConfig::default()
        .debounce(settings.debounce)
        .concurrency(settings.concurrency);

    let kind = resource_name.clone();
    Controller::new(api, watcher::Config::default())
        .with_config(controller_config)
        .shutdown_on_signal()
        .run(reconcile, error_policy, reconciler)
        .for_each(|res| {
            let kind = kind.clone();
            async move {
                match res {
                    Ok((obj, _)) => debug!("Reconciled {} {}", kind, obj.name),
                    Err(e) => error!("Controller error for {}: {}", kind, e),
                }
            }
        })
        .await;

    info!("{} watcher stopped", resource_name);
    Ok(())
}

/// Watches the resources that receive static addresses.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    settings: WatchSettings,
    vsphere_machine_api: Api<VSphereMachine>,
    load_balancer_api: Api<HAProxyLoadBalancer>,
    vsphere_cluster_api: Api<VSphereCluster>,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(
        reconciler: Arc<Reconciler>,
        settings: WatchSettings,
        vsphere_machine_api: Api<VSphereMachine>,
        load_balancer_api: Api<HAProxyLoadBalancer>,
        vsphere_cluster_api: Api<VSphereCluster>,
    ) -> Self {
        Self {
            reconciler,
            settings,
            vsphere_machine_api,
            load_balancer_api,
            vsphere_cluster_api,
        }
    }

    /// Starts watching VSphereMachine resources.
    pub async fn watch_vsphere_machines(&self) -> Result<(), ControllerError> {
        watch_resource(
            self.vsphere_machine_api.clone(),
            self.reconciler.clone(),
            |reconciler, key| -> ReconcileFuture {
                Box::pin(async move { reconciler.reconcile_vsphere_machine(&key).await })
            },
            self.settings,
        )
        .await
    }

    /// Starts watching HAProxyLoadBalancer resources.
    pub async fn watch_load_balancers(&self) -> Result<(), ControllerError> {
        watch_resource(
            self.load_balancer_api.clone(),
            self.reconciler.clone(),
            |reconciler, key| -> ReconcileFuture {
                Box::pin(async move { reconciler.reconcile_load_balancer(&key).await })
            },
            self.settings,
        )
        .await
    }

    /// Starts watching VSphereCluster resources.
    pub async fn watch_vsphere_clusters(&self) -> Result<(), ControllerError> {
        watch_resource(
            self.vsphere_cluster_api.clone(),
            self.reconciler.clone(),
            |reconciler, key| -> ReconcileFuture {
                Box::pin(async move { reconciler.reconcile_vsphere_cluster(&key).await })
            },
            self.settings,
        )
        .await
    }
}
