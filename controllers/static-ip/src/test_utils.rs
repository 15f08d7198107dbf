//! Test utilities for unit testing reconcilers
//!
//! An in-memory [`ClusterStore`] that applies merge patches like the API
//! server does, plus YAML fixtures for a small vSphere cluster.

use crate::error::StoreError;
use crate::reconciler::Reconciler;
use crate::store::ClusterStore;
use crds::labels::{CLUSTER_NAME, NETWORK_NAME};
use crds::{
    Cluster, HAProxyLoadBalancer, KubeadmControlPlane, Machine, MachineDeployment, ObjectKey,
    VSphereCluster, VSphereMachine, VSphereMachineTemplate,
};
use ipam::metal3::Metal3Ipam;
use ipam::{IPAddressManager, IpamFactory, IpamType, MemoryMetal3Store, pool_fixture};
use kube::Resource;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const NAMESPACE: &str = "capi";
pub const CLUSTER: &str = "c1";
pub const NETWORK: &str = "vm-network";
pub const PENDING_REQUEUE: Duration = Duration::from_secs(30);

type StoreKey = (String, String, String);

/// In-memory ClusterStore
///
/// Objects are kept as JSON. Patches are applied with `json_patch::merge`,
/// must carry the current resourceVersion and bump it.
#[derive(Clone, Default)]
pub struct MemoryClusterStore {
    objects: Arc<Mutex<BTreeMap<StoreKey, Value>>>,
    patches: Arc<Mutex<Vec<(String, Value)>>>,
    // Next patch finds the object changed since it was read
    conflict_next: Arc<Mutex<bool>>,
}

impl MemoryClusterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object; namespace defaults to [`NAMESPACE`], resourceVersion to "1"
    pub fn insert(&self, mut value: Value) {
        let kind = value["kind"].as_str().expect("fixture needs a kind").to_string();
        let namespace = value["metadata"]["namespace"].as_str().unwrap_or(NAMESPACE).to_string();
        let name = value["metadata"]["name"].as_str().expect("fixture needs a name").to_string();
        value["metadata"]["namespace"] = Value::String(namespace.clone());
        if value["metadata"]["resourceVersion"].is_null() {
            value["metadata"]["resourceVersion"] = Value::String("1".to_string());
        }
        self.objects.lock().unwrap().insert((kind, namespace, name), value);
    }

    pub fn insert_yaml(&self, yaml: &str) {
        self.insert(from_yaml(yaml));
    }

    /// Current state of an object in [`NAMESPACE`]
    pub fn get<K>(&self, name: &str) -> K
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        self.get_in(NAMESPACE, name)
    }

    pub fn get_in<K>(&self, namespace: &str, name: &str) -> K
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        self.read::<K>(&ObjectKey::new(namespace, name))
            .unwrap()
            .unwrap_or_else(|| panic!("{} {namespace}/{name} not in store", K::kind(&())))
    }

    /// Edit an object out of band, bumping its resourceVersion
    pub fn edit<K>(&self, name: &str, edit: impl FnOnce(&mut Value))
    where
        K: Resource<DynamicType = ()>,
    {
        let mut objects = self.objects.lock().unwrap();
        let object = objects
            .get_mut(&(K::kind(&()).into_owned(), NAMESPACE.to_string(), name.to_string()))
            .expect("object to edit must exist");
        edit(object);
        bump_resource_version(object);
    }

    /// Patches applied so far, as (kind, patch)
    pub fn patches(&self) -> Vec<(String, Value)> {
        self.patches.lock().unwrap().clone()
    }

    /// Simulate a concurrent writer: the next patch sees a newer resourceVersion
    pub fn conflict_next_patch(&self) {
        *self.conflict_next.lock().unwrap() = true;
    }

    pub fn patch_count(&self) -> usize {
        self.patches.lock().unwrap().len()
    }

    fn read<K>(&self, key: &ObjectKey) -> Result<Option<K>, StoreError>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        let objects = self.objects.lock().unwrap();
        let value = objects.get(&(K::kind(&()).into_owned(), key.namespace.clone(), key.name.clone()));
        Ok(value.map(|v| serde_json::from_value(v.clone())).transpose()?)
    }

    fn apply_patch<K>(&self, key: &ObjectKey, patch: &Value) -> Result<(), StoreError>
    where
        K: Resource<DynamicType = ()>,
    {
        let kind = K::kind(&()).into_owned();
        let mut objects = self.objects.lock().unwrap();
        let object = objects
            .get_mut(&(kind.clone(), key.namespace.clone(), key.name.clone()))
            .ok_or_else(|| StoreError::Conflict(format!("{kind} {key} does not exist")))?;

        let mut conflict = self.conflict_next.lock().unwrap();
        if *conflict {
            *conflict = false;
            bump_resource_version(object);
        }
        drop(conflict);

        let current = object["metadata"]["resourceVersion"].clone();
        let expected = &patch["metadata"]["resourceVersion"];
        if !expected.is_null() && *expected != current {
            return Err(StoreError::Conflict(format!(
                "{kind} {key}: resourceVersion {expected} does not match {current}"
            )));
        }

        json_patch::merge(object, patch);
        object["metadata"]["resourceVersion"] = current;
        bump_resource_version(object);
        self.patches.lock().unwrap().push((kind, patch.clone()));
        Ok(())
    }
}

fn bump_resource_version(object: &mut Value) {
    let next = object["metadata"]["resourceVersion"]
        .as_str()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0)
        + 1;
    object["metadata"]["resourceVersion"] = Value::String(next.to_string());
}

#[async_trait::async_trait]
impl ClusterStore for MemoryClusterStore {
    async fn get_vsphere_machine(&self, key: &ObjectKey) -> Result<Option<VSphereMachine>, StoreError> {
        self.read(key)
    }

    async fn get_load_balancer(&self, key: &ObjectKey) -> Result<Option<HAProxyLoadBalancer>, StoreError> {
        self.read(key)
    }

    async fn get_vsphere_cluster(&self, key: &ObjectKey) -> Result<Option<VSphereCluster>, StoreError> {
        self.read(key)
    }

    async fn get_machine(&self, key: &ObjectKey) -> Result<Option<Machine>, StoreError> {
        self.read(key)
    }

    async fn get_cluster(&self, key: &ObjectKey) -> Result<Option<Cluster>, StoreError> {
        self.read(key)
    }

    async fn get_machine_template(
        &self,
        key: &ObjectKey,
    ) -> Result<Option<VSphereMachineTemplate>, StoreError> {
        self.read(key)
    }

    async fn get_machine_deployment(
        &self,
        key: &ObjectKey,
    ) -> Result<Option<MachineDeployment>, StoreError> {
        self.read(key)
    }

    async fn list_control_planes(
        &self,
        namespace: &str,
        cluster_name: &str,
    ) -> Result<Vec<KubeadmControlPlane>, StoreError> {
        let kind = KubeadmControlPlane::kind(&()).into_owned();
        let objects = self.objects.lock().unwrap();
        objects
            .iter()
            .filter(|((k, ns, _), v)| {
                *k == kind && ns == namespace && v["metadata"]["labels"][CLUSTER_NAME] == cluster_name
            })
            .map(|(_, v)| serde_json::from_value(v.clone()).map_err(StoreError::from))
            .collect()
    }

    async fn patch_vsphere_machine(&self, key: &ObjectKey, patch: &Value) -> Result<(), StoreError> {
        self.apply_patch::<VSphereMachine>(key, patch)
    }

    async fn patch_load_balancer(&self, key: &ObjectKey, patch: &Value) -> Result<(), StoreError> {
        self.apply_patch::<HAProxyLoadBalancer>(key, patch)
    }

    async fn patch_vsphere_cluster(&self, key: &ObjectKey, patch: &Value) -> Result<(), StoreError> {
        self.apply_patch::<VSphereCluster>(key, patch)
    }
}

/// Reconciler wired to in-memory stores
pub struct TestEnv {
    pub store: MemoryClusterStore,
    pub ipam: MemoryMetal3Store,
    pub reconciler: Reconciler,
}

impl TestEnv {
    /// Environment with the metal3 backend registered
    pub fn new() -> Self {
        let ipam = MemoryMetal3Store::new();
        let mut factory = IpamFactory::new();
        let backend = ipam.clone();
        factory.register(IpamType::Metal3io, move || {
            Arc::new(Metal3Ipam::new(backend.clone())) as Arc<dyn IPAddressManager>
        });
        Self::with_factory(ipam, factory)
    }

    /// Environment whose IPAM registry has nothing registered
    pub fn without_ipam() -> Self {
        Self::with_factory(MemoryMetal3Store::new(), IpamFactory::new())
    }

    fn with_factory(ipam: MemoryMetal3Store, factory: IpamFactory) -> Self {
        let store = MemoryClusterStore::new();
        let reconciler = Reconciler::new(
            Arc::new(store.clone()),
            factory,
            IpamType::Metal3io,
            PENDING_REQUEUE,
        );
        Self {
            store,
            ipam,
            reconciler,
        }
    }

    /// CAPI Cluster `c1`
    pub fn with_cluster(self) -> Self {
        self.store.insert_yaml(&cluster_yaml());
        self
    }

    /// IPPool `c1-pool` bound to `c1` and [`NETWORK`] by label
    pub fn with_pool(self, spec: Value) -> Self {
        self.ipam.add_pool(pool_fixture(
            NAMESPACE,
            "c1-pool",
            &[(CLUSTER_NAME, CLUSTER), (NETWORK_NAME, NETWORK)],
            spec,
        ));
        self
    }

    /// Fulfill a claim with 10.10.100.20/18 via 10.10.100.1
    pub fn fulfill(&self, claim: &str) {
        self.ipam
            .fulfill_claim(NAMESPACE, claim, "10.10.100.20", 18, Some("10.10.100.1"), &[]);
    }
}

/// Moves a fixture to `namespace`, giving it a UID unique to that namespace
pub fn in_namespace(mut object: Value, namespace: &str) -> Value {
    let name = object["metadata"]["name"].as_str().unwrap_or_default().to_string();
    object["metadata"]["namespace"] = json!(namespace);
    object["metadata"]["uid"] = json!(format!("uid-{namespace}-{name}"));
    object
}

/// Parses a YAML fixture
pub fn from_yaml(yaml: &str) -> Value {
    serde_yaml::from_str(yaml).expect("fixture must be valid YAML")
}

pub fn key(name: &str) -> ObjectKey {
    ObjectKey::new(NAMESPACE, name)
}

/// Pool spec without DNS settings
pub fn bare_pool_spec() -> Value {
    json!({
        "namePrefix": "c1-ip",
        "clusterName": CLUSTER,
        "pools": [{"start": "10.10.100.20", "end": "10.10.100.40"}],
        "prefix": 18,
        "gateway": "10.10.100.1"
    })
}

pub fn cluster_yaml() -> String {
    format!(
        r#"
apiVersion: cluster.x-k8s.io/v1alpha4
kind: Cluster
metadata:
  name: {CLUSTER}
  namespace: {NAMESPACE}
spec:
  controlPlaneRef:
    apiVersion: controlplane.cluster.x-k8s.io/v1alpha4
    kind: KubeadmControlPlane
    name: {CLUSTER}-cp
  infrastructureRef:
    apiVersion: infrastructure.cluster.x-k8s.io/v1alpha4
    kind: VSphereCluster
    name: {CLUSTER}
"#
    )
}

/// CAPI Machine owning the VSphereMachine of the same name
pub fn machine_yaml(name: &str, control_plane: bool, deployment: Option<&str>) -> String {
    let mut labels = format!("    {CLUSTER_NAME}: {CLUSTER}\n");
    if control_plane {
        labels.push_str("    cluster.x-k8s.io/control-plane: \"\"\n");
    }
    if let Some(deployment) = deployment {
        labels.push_str(&format!("    cluster.x-k8s.io/deployment-name: {deployment}\n"));
    }
    format!(
        r#"
apiVersion: cluster.x-k8s.io/v1alpha4
kind: Machine
metadata:
  name: {name}
  namespace: {NAMESPACE}
  labels:
{labels}spec:
  clusterName: {CLUSTER}
  infrastructureRef:
    apiVersion: infrastructure.cluster.x-k8s.io/v1alpha4
    kind: VSphereMachine
    name: {name}
"#
    )
}

fn string_map(pairs: &[(&str, &str)]) -> Value {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect::<serde_json::Map<_, _>>()
        .into()
}

/// VSphereMachine owned by Machine `name`, labelled with the cluster name
pub fn vsphere_machine(
    name: &str,
    labels: &[(&str, &str)],
    annotations: &[(&str, &str)],
    devices: Value,
) -> Value {
    let mut machine = json!({
        "apiVersion": "infrastructure.cluster.x-k8s.io/v1alpha4",
        "kind": "VSphereMachine",
        "metadata": {
            "name": name,
            "namespace": NAMESPACE,
            "uid": format!("uid-{name}"),
            "labels": string_map(labels),
            "annotations": string_map(annotations),
            "ownerReferences": [{
                "apiVersion": "cluster.x-k8s.io/v1alpha4",
                "kind": "Machine",
                "name": name,
                "uid": format!("uid-machine-{name}")
            }]
        },
        "spec": {
            "template": "ubuntu-2004-kube-v1.21",
            "network": {"devices": devices}
        }
    });
    machine["metadata"]["labels"][CLUSTER_NAME] = json!(CLUSTER);
    machine
}

/// Device on [`NETWORK`] waiting for a static address
pub fn static_device() -> Value {
    json!({"networkName": NETWORK, "dhcp4": false, "dhcp6": false})
}

pub fn dhcp_device() -> Value {
    json!({"networkName": NETWORK, "dhcp4": true})
}

/// VSphereMachineTemplate whose first device carries nameservers
pub fn machine_template_yaml(name: &str, labels: &str) -> String {
    format!(
        r#"
apiVersion: infrastructure.cluster.x-k8s.io/v1alpha4
kind: VSphereMachineTemplate
metadata:
  name: {name}
  namespace: {NAMESPACE}
  labels:
    {CLUSTER_NAME}: {CLUSTER}
{labels}spec:
  template:
    spec:
      template: ubuntu-2004-kube-v1.21
      network:
        devices:
          - networkName: {NETWORK}
            dhcp4: false
            nameservers:
              - 1.2.3.4
            searchDomains:
              - company.com
"#
    )
}

pub fn control_plane_yaml(template: &str) -> String {
    format!(
        r#"
apiVersion: controlplane.cluster.x-k8s.io/v1alpha4
kind: KubeadmControlPlane
metadata:
  name: {CLUSTER}-cp
  namespace: {NAMESPACE}
  labels:
    {CLUSTER_NAME}: {CLUSTER}
spec:
  replicas: 3
  machineTemplate:
    infrastructureRef:
      apiVersion: infrastructure.cluster.x-k8s.io/v1alpha4
      kind: VSphereMachineTemplate
      name: {template}
"#
    )
}

pub fn machine_deployment_yaml(name: &str, template: &str) -> String {
    format!(
        r#"
apiVersion: cluster.x-k8s.io/v1alpha4
kind: MachineDeployment
metadata:
  name: {name}
  namespace: {NAMESPACE}
  labels:
    {CLUSTER_NAME}: {CLUSTER}
spec:
  clusterName: {CLUSTER}
  replicas: 2
  template:
    spec:
      clusterName: {CLUSTER}
      infrastructureRef:
        apiVersion: infrastructure.cluster.x-k8s.io/v1alpha4
        kind: VSphereMachineTemplate
        name: {template}
"#
    )
}

pub fn load_balancer(name: &str, labels: &[(&str, &str)], devices: Value) -> Value {
    let mut lb = json!({
        "apiVersion": "infrastructure.cluster.x-k8s.io/v1alpha4",
        "kind": "HAProxyLoadBalancer",
        "metadata": {
            "name": name,
            "namespace": NAMESPACE,
            "uid": format!("uid-{name}"),
            "labels": string_map(labels)
        },
        "spec": {
            "virtualMachineConfiguration": {
                "template": "haproxy-v0.7.0",
                "network": {"devices": devices}
            }
        }
    });
    lb["metadata"]["labels"][CLUSTER_NAME] = json!(CLUSTER);
    lb
}

/// VSphereCluster owned by Cluster `c1`; `spec_extra` is indented two spaces
pub fn vsphere_cluster_yaml(host: &str, spec_extra: &str) -> String {
    format!(
        r#"
apiVersion: infrastructure.cluster.x-k8s.io/v1alpha4
kind: VSphereCluster
metadata:
  name: {CLUSTER}
  namespace: {NAMESPACE}
  uid: 9b8a7c6d-5e4f-4a3b-8c2d-1e0f9a8b7c6d
  ownerReferences:
    - apiVersion: cluster.x-k8s.io/v1alpha4
      kind: Cluster
      name: {CLUSTER}
      uid: 1a2b3c4d-5e6f-4a7b-8c9d-0e1f2a3b4c5d
spec:
  server: vcenter.example.com
  controlPlaneEndpoint:
    host: "{host}"
    port: 6443
{spec_extra}"#
    )
}
