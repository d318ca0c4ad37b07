//! Test adapters implementing the collaborator traits
//!
//! In-memory stand-ins for the cluster, AppQoS and the kubelet, used by the
//! reconciliation tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use api_types::PowerProfile;
use api_types::PowerWorkload;
use api_types::PowerWorkloadSpec;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;

use super::traits::{
    NodeAddressResolver, PodResourcesClient, PodSource, ProfileClient, ServiceError, WorkloadStore,
};
use super::workload::merge_node_cpus;

fn injected_failure() -> ServiceError {
    ServiceError::unavailable("injected failure")
}

/// Versioned workload store mimicking the API server's optimistic concurrency.
#[derive(Default)]
pub struct MockWorkloadStore {
    workloads: Mutex<HashMap<String, PowerWorkload>>,
    next_version: AtomicUsize,
    conflicts: AtomicUsize,
    writes: AtomicUsize,
    pending_merges: Mutex<Vec<(String, String, Vec<u32>)>>,
    error_mode: AtomicBool,
}

impl MockWorkloadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_error_mode(&self, enabled: bool) {
        self.error_mode.store(enabled, Ordering::SeqCst);
    }

    pub fn spec_of(&self, name: &str) -> Option<PowerWorkloadSpec> {
        self.workloads
            .lock()
            .unwrap()
            .get(name)
            .map(|workload| workload.spec.clone())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.workloads.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn conflicts(&self) -> usize {
        self.conflicts.load(Ordering::SeqCst)
    }

    /// Number of successful create/replace/delete calls.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Applies a merge right after the next read of `name`, as if a peer won
    /// the race to write.
    pub fn inject_concurrent_merge(&self, name: &str, node: &str, cpus: &[u32]) {
        self.pending_merges
            .lock()
            .unwrap()
            .push((name.to_string(), node.to_string(), cpus.to_vec()));
    }

    fn bump_version(&self, workload: &mut PowerWorkload) {
        let version = self.next_version.fetch_add(1, Ordering::SeqCst) + 1;
        workload.metadata.resource_version = Some(version.to_string());
    }

    fn conflict(&self, name: &str) -> ServiceError {
        self.conflicts.fetch_add(1, Ordering::SeqCst);
        ServiceError::Conflict {
            name: name.to_string(),
        }
    }

    fn check_error_mode(&self) -> Result<(), ServiceError> {
        if self.error_mode.load(Ordering::SeqCst) {
            return Err(injected_failure());
        }
        Ok(())
    }
}

fn name_of(workload: &PowerWorkload) -> String {
    workload.metadata.name.clone().unwrap_or_default()
}

#[async_trait]
impl WorkloadStore for MockWorkloadStore {
    async fn get(&self, name: &str) -> Result<Option<PowerWorkload>, ServiceError> {
        self.check_error_mode()?;
        let mut workloads = self.workloads.lock().unwrap();
        let snapshot = workloads.get(name).cloned();

        let mut pending = self.pending_merges.lock().unwrap();
        if let Some(index) = pending.iter().position(|(target, _, _)| target == name) {
            let (_, node, cpus) = pending.remove(index);
            if let Some(stored) = workloads.get_mut(name) {
                merge_node_cpus(&mut stored.spec, &node, &cpus);
                self.bump_version(stored);
            }
        }

        Ok(snapshot)
    }

    async fn create(&self, workload: &PowerWorkload) -> Result<(), ServiceError> {
        self.check_error_mode()?;
        let name = name_of(workload);
        let mut workloads = self.workloads.lock().unwrap();
        if workloads.contains_key(&name) {
            return Err(self.conflict(&name));
        }

        let mut stored = workload.clone();
        self.bump_version(&mut stored);
        workloads.insert(name, stored);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn replace(&self, workload: &PowerWorkload) -> Result<(), ServiceError> {
        self.check_error_mode()?;
        let name = name_of(workload);
        let mut workloads = self.workloads.lock().unwrap();
        let Some(current) = workloads.get(&name) else {
            return Err(ServiceError::unavailable(format!("{name} not found")));
        };
        if current.metadata.resource_version != workload.metadata.resource_version {
            return Err(self.conflict(&name));
        }

        let mut stored = workload.clone();
        self.bump_version(&mut stored);
        workloads.insert(name, stored);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, workload: &PowerWorkload) -> Result<(), ServiceError> {
        self.check_error_mode()?;
        let name = name_of(workload);
        let mut workloads = self.workloads.lock().unwrap();
        let Some(current) = workloads.get(&name) else {
            return Ok(());
        };
        if current.metadata.resource_version != workload.metadata.resource_version {
            return Err(self.conflict(&name));
        }

        workloads.remove(&name);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// AppQoS stand-in keyed by node address.
#[derive(Default)]
pub struct MockProfileClient {
    profiles: Mutex<HashMap<(String, String), PowerProfile>>,
    error_mode: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl MockProfileClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_profile(&self, address: &str, name: &str) {
        let profile = PowerProfile {
            id: Some(1),
            name: Some(name.to_string()),
            min_freq: Some(2600),
            max_freq: Some(2800),
            epp: Some(name.to_string()),
        };
        self.profiles
            .lock()
            .unwrap()
            .insert((address.to_string(), name.to_string()), profile);
    }

    /// Registers the all-empty answer AppQoS gives for unknown profiles.
    pub fn add_empty_profile(&self, address: &str, name: &str) {
        self.profiles
            .lock()
            .unwrap()
            .insert((address.to_string(), name.to_string()), PowerProfile::default());
    }

    pub fn set_error_mode(&self, enabled: bool) {
        self.error_mode.store(enabled, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl ProfileClient for MockProfileClient {
    async fn get_profile(
        &self,
        name: &str,
        node_address: &str,
    ) -> Result<Option<PowerProfile>, ServiceError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.error_mode.load(Ordering::SeqCst) {
            return Err(injected_failure());
        }
        Ok(self
            .profiles
            .lock()
            .unwrap()
            .get(&(node_address.to_string(), name.to_string()))
            .cloned())
    }
}

/// Pod lookup backed by a map.
#[derive(Default)]
pub struct MockPodSource {
    pods: Mutex<HashMap<(String, String), Pod>>,
    error_mode: AtomicBool,
}

impl MockPodSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, pod: Pod) {
        let namespace = pod.metadata.namespace.clone().unwrap_or_default();
        let name = pod.metadata.name.clone().unwrap_or_default();
        self.pods.lock().unwrap().insert((namespace, name), pod);
    }

    pub fn get(&self, namespace: &str, name: &str) -> Option<Pod> {
        self.pods
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn remove(&self, namespace: &str, name: &str) {
        self.pods
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()));
    }

    pub fn set_error_mode(&self, enabled: bool) {
        self.error_mode.store(enabled, Ordering::SeqCst);
    }
}

#[async_trait]
impl PodSource for MockPodSource {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, ServiceError> {
        if self.error_mode.load(Ordering::SeqCst) {
            return Err(injected_failure());
        }
        Ok(self
            .pods
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }
}

/// Resolves every node to `https://<node>:5000`, unless told to fail.
#[derive(Default)]
pub struct MockNodeAddressResolver {
    error_mode: AtomicBool,
}

impl MockNodeAddressResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn address_of(node_name: &str) -> String {
        format!("https://{node_name}:5000")
    }

    pub fn set_error_mode(&self, enabled: bool) {
        self.error_mode.store(enabled, Ordering::SeqCst);
    }
}

#[async_trait]
impl NodeAddressResolver for MockNodeAddressResolver {
    async fn resolve(&self, node_name: &str) -> Result<String, ServiceError> {
        if self.error_mode.load(Ordering::SeqCst) {
            return Err(injected_failure());
        }
        Ok(Self::address_of(node_name))
    }
}

/// Kubelet pod-resources stand-in returning configured CPU lists.
#[derive(Default)]
pub struct MockPodResourcesClient {
    cpus: Mutex<HashMap<(String, String, String), String>>,
}

impl MockPodResourcesClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_cpus(&self, namespace: &str, pod: &str, container: &str, cpus: &str) {
        self.cpus.lock().unwrap().insert(
            (namespace.to_string(), pod.to_string(), container.to_string()),
            cpus.to_string(),
        );
    }
}

#[async_trait]
impl PodResourcesClient for MockPodResourcesClient {
    async fn get_container_cpus(
        &self,
        namespace: &str,
        pod_name: &str,
        container_name: &str,
    ) -> Result<String, ServiceError> {
        self.cpus
            .lock()
            .unwrap()
            .get(&(
                namespace.to_string(),
                pod_name.to_string(),
                container_name.to_string(),
            ))
            .cloned()
            .ok_or_else(|| {
                ServiceError::unavailable(format!(
                    "no CPU assignment for {namespace}/{pod_name}/{container_name}"
                ))
            })
    }
}
