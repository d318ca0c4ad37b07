//! Reconciliation of one pod against the power workloads
//!
//! A reconciliation reads the pod, works out which of its containers hold
//! exclusive CPUs under which power profile, and folds those CPUs into the
//! per-profile [`PowerWorkload`](api_types::PowerWorkload) records. The grant is
//! remembered in the pod state repository so that it can be taken back when the
//! pod goes away.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use api_types::GuaranteedPod;
use api_types::PowerContainer;
use k8s_openapi::api::core::v1::Container;
use k8s_openapi::api::core::v1::Pod;
use tracing::debug;
use tracing::info;
use tracing::warn;
use utils::keyed_lock::KeyedAsyncLock;

use crate::domain::cpu_list::format_cpu_list;
use crate::domain::cpu_list::parse_cpu_list;
use crate::domain::pod_state::PodStateRepository;
use crate::domain::profile_request::check_pod_profiles;
use crate::domain::profile_request::container_id;
use crate::domain::profile_request::container_profile;
use crate::domain::profile_request::exclusive_cpu_containers;
use crate::domain::profile_validator::validate_profile;
use crate::domain::traits::NodeAddressResolver;
use crate::domain::traits::PodResourcesClient;
use crate::domain::traits::PodSource;
use crate::domain::traits::ProfileClient;
use crate::domain::traits::ServiceError;
use crate::domain::traits::WorkloadStore;
use crate::domain::types::PodKey;
use crate::domain::types::ReconcileError;
use crate::domain::types::ReconcileOutcome;
use crate::domain::types::ReconcilerConfig;
use crate::domain::types::SkipReason;
use crate::domain::types::ValidationError;
use crate::domain::workload::WorkloadAggregator;

const RUNNING_PHASE: &str = "Running";
const FINISHED_PHASES: [&str; 2] = ["Succeeded", "Failed"];

/// CPUs per profile, as granted on a single node.
type ProfileCpus = BTreeMap<String, BTreeSet<u32>>;

/// External services a [`Reconciler`] talks to.
pub struct Collaborators {
    pub pods: Arc<dyn PodSource>,
    pub node_addresses: Arc<dyn NodeAddressResolver>,
    pub profiles: Arc<dyn ProfileClient>,
    pub pod_resources: Arc<dyn PodResourcesClient>,
    pub workloads: Arc<dyn WorkloadStore>,
}

pub struct Reconciler {
    pods: Arc<dyn PodSource>,
    node_addresses: Arc<dyn NodeAddressResolver>,
    profiles: Arc<dyn ProfileClient>,
    pod_resources: Arc<dyn PodResourcesClient>,
    state: Arc<dyn PodStateRepository>,
    workloads: WorkloadAggregator,
    locks: KeyedAsyncLock<PodKey>,
    /// Held around every workload change on a node together with the state
    /// update that goes with it.
    node_locks: KeyedAsyncLock<String>,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(
        collaborators: Collaborators,
        state: Arc<dyn PodStateRepository>,
        config: ReconcilerConfig,
    ) -> Self {
        let workloads = WorkloadAggregator::new(
            collaborators.workloads,
            config.conflict_retries,
            config.conflict_backoff,
        );

        Self {
            pods: collaborators.pods,
            node_addresses: collaborators.node_addresses,
            profiles: collaborators.profiles,
            pod_resources: collaborators.pod_resources,
            state,
            workloads,
            locks: KeyedAsyncLock::new(),
            node_locks: KeyedAsyncLock::new(),
            config,
        }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Brings the power workloads in line with the current state of one pod.
    ///
    /// Calls for the same pod are serialized. Validation failures happen before
    /// any workload is touched.
    #[tracing::instrument(skip(self), fields(pod = %PodKey::new(namespace, name)))]
    pub async fn reconcile(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let key = PodKey::new(namespace, name);
        let _guard = self.locks.lock(&key).await;

        let Some(pod) = self
            .call("pod lookup", self.pods.get_pod(namespace, name))
            .await?
        else {
            debug!("Pod no longer exists");
            return Ok(ReconcileOutcome::Skipped(SkipReason::PodNotFound));
        };

        if pod.metadata.deletion_timestamp.is_some() {
            return self.release_pod(&key).await;
        }

        let phase = pod
            .status
            .as_ref()
            .and_then(|status| status.phase.as_deref())
            .unwrap_or("Unknown");
        if FINISHED_PHASES.contains(&phase) {
            // the kubelet has already given the CPUs back
            debug!(phase, "Pod has finished");
            return self.release_pod(&key).await;
        }
        if phase != RUNNING_PHASE {
            return Err(ReconcileError::NotReady {
                pod: key.to_string(),
                phase: phase.to_string(),
            });
        }

        self.apply_pod(&key, &pod).await
    }

    /// Deletion path: takes back everything recorded for the pod.
    async fn release_pod(&self, key: &PodKey) -> Result<ReconcileOutcome, ReconcileError> {
        let Some(entry) = self.state.get(key) else {
            debug!("Pod has no recorded grant to release");
            return Ok(ReconcileOutcome::Skipped(SkipReason::NoRecordedState));
        };

        let _node_guard = self.node_locks.lock(&entry.node).await;
        let grants = cpus_by_profile(&entry.containers);
        let failures = self.release(key, &entry.node, &grants).await;
        if !failures.is_empty() {
            // the entry stays so the next delivery can finish the job
            return Err(partial_failure(key, "release", failures));
        }

        self.state.delete(key);
        info!(node = %entry.node, profiles = grants.len(), "Released CPUs of pod");
        Ok(ReconcileOutcome::Applied)
    }

    /// Create/update path for a running pod.
    async fn apply_pod(
        &self,
        key: &PodKey,
        pod: &Pod,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let uid = non_empty(pod.metadata.uid.as_deref())
            .ok_or(ValidationError::MissingIdentity { field: "uid" })?;
        let node = non_empty(pod.spec.as_ref().and_then(|spec| spec.node_name.as_deref()))
            .ok_or(ValidationError::MissingIdentity { field: "node name" })?;

        let candidates = exclusive_cpu_containers(pod);
        if candidates.is_empty() {
            debug!("No container holds exclusive CPUs");
            return Ok(ReconcileOutcome::Skipped(SkipReason::NoExclusiveContainers));
        }

        let requests = profile_requests(candidates)?;
        if requests.is_empty() {
            debug!("No container requests a power profile");
            return Ok(ReconcileOutcome::Skipped(SkipReason::NoProfileRequests));
        }
        check_pod_profiles(
            requests.iter().map(|(_, profile)| profile.as_str()),
            self.config.profile_policy,
        )?;

        let address = self
            .call("node address resolution", self.node_addresses.resolve(node))
            .await?;
        let distinct: BTreeSet<&str> = requests.iter().map(|(_, p)| p.as_str()).collect();
        for profile in distinct {
            validate_profile(
                self.profiles.as_ref(),
                profile,
                node,
                &address,
                self.config.call_timeout,
            )
            .await?;
        }

        let mut containers = Vec::with_capacity(requests.len());
        for (container, profile) in requests {
            let exclusive_cpus = self.container_cpus(key, &container.name).await?;
            containers.push(PowerContainer {
                id: container_id(pod, &container.name),
                name: container.name.clone(),
                exclusive_cpus,
                power_profile: profile,
            });
        }

        let granted = cpus_by_profile(&containers);
        let previous = self.state.get(key);

        // nothing new has been merged yet, so the old entry stays accurate on failure
        if let Some(previous) = previous.as_ref() {
            let stale = stale_cpus(previous, node, &granted);
            if !stale.is_empty() {
                let _node_guard = self.node_locks.lock(&previous.node).await;
                let failures = self.release(key, &previous.node, &stale).await;
                if !failures.is_empty() {
                    return Err(partial_failure(key, "release of stale", failures));
                }
            }
        }

        let _node_guard = self.node_locks.lock(&node.to_string()).await;
        let mut failures = Vec::new();
        for (profile, cpus) in &granted {
            let cpus: Vec<u32> = cpus.iter().copied().collect();
            if let Err(e) = self
                .call("workload update", self.workloads.add(profile, node, &cpus))
                .await
            {
                warn!(profile = %profile, error = %e, "Failed to add CPUs to workload");
                failures.push((profile.clone(), e));
            }
        }

        let entry = GuaranteedPod {
            node: node.to_string(),
            name: key.name.clone(),
            namespace: key.namespace.clone(),
            uid: uid.to_string(),
            containers,
        };
        self.state
            .upsert(key, entry)
            .map_err(|e| ReconcileError::transient(e.to_string()))?;

        if !failures.is_empty() {
            return Err(partial_failure(key, "grant", failures));
        }

        info!(
            node = %node,
            profiles = ?granted.keys().collect::<Vec<_>>(),
            "Applied power profiles to pod CPUs"
        );
        Ok(ReconcileOutcome::Applied)
    }

    async fn container_cpus(
        &self,
        key: &PodKey,
        container: &str,
    ) -> Result<Vec<u32>, ReconcileError> {
        let raw = self
            .call(
                "CPU assignment lookup",
                self.pod_resources
                    .get_container_cpus(&key.namespace, &key.name, container),
            )
            .await?;

        if raw.trim().is_empty() {
            return Err(ReconcileError::transient(format!(
                "kubelet reports no exclusive CPUs for container {container} yet"
            )));
        }

        let cpus = parse_cpu_list(&raw).map_err(|source| ValidationError::InvalidCpuList {
            container: container.to_string(),
            source,
        })?;
        debug!(container = %container, cpus = %format_cpu_list(&cpus), "Container CPU assignment");
        Ok(cpus)
    }

    /// Subtracts each profile's CPUs on `node`, attempting every profile.
    ///
    /// CPUs that another recorded pod holds on the same node and profile stay in
    /// the workload. Callers hold the node lock.
    async fn release(
        &self,
        key: &PodKey,
        node: &str,
        grants: &ProfileCpus,
    ) -> Vec<(String, ReconcileError)> {
        let held = self.held_by_others(key, node);
        let mut failures = Vec::new();
        for (profile, cpus) in grants {
            let cpus: Vec<u32> = match held.get(profile) {
                Some(held) => cpus.difference(held).copied().collect(),
                None => cpus.iter().copied().collect(),
            };
            if cpus.is_empty() {
                continue;
            }
            if let Err(e) = self
                .call("workload update", self.workloads.remove(profile, node, &cpus))
                .await
            {
                warn!(profile = %profile, error = %e, "Failed to remove CPUs from workload");
                failures.push((profile.clone(), e));
            }
        }
        failures
    }

    /// CPUs per profile that pods other than `key` hold on `node`.
    fn held_by_others(&self, key: &PodKey, node: &str) -> ProfileCpus {
        let mut held = ProfileCpus::new();
        for (other, entry) in self.state.on_node(node) {
            if &other == key {
                continue;
            }
            for (profile, cpus) in cpus_by_profile(&entry.containers) {
                held.entry(profile).or_default().extend(cpus);
            }
        }
        held
    }

    /// Runs a collaborator call under the configured timeout.
    async fn call<T, F>(&self, what: &str, fut: F) -> Result<T, ReconcileError>
    where
        F: Future<Output = Result<T, ServiceError>>,
    {
        match tokio::time::timeout(self.config.call_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(ReconcileError::transient(format!("{what} failed: {e}"))),
            Err(_) => Err(ReconcileError::transient(format!(
                "{what} timed out after {:?}",
                self.config.call_timeout
            ))),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn profile_requests(
    containers: Vec<&Container>,
) -> Result<Vec<(&Container, String)>, ValidationError> {
    let mut requests = Vec::new();
    for container in containers {
        if let Some(profile) = container_profile(container)? {
            requests.push((container, profile));
        }
    }
    Ok(requests)
}

fn cpus_by_profile(containers: &[PowerContainer]) -> ProfileCpus {
    let mut grants = ProfileCpus::new();
    for container in containers {
        grants
            .entry(container.power_profile.clone())
            .or_default()
            .extend(container.exclusive_cpus.iter().copied());
    }
    grants
}

/// CPUs of `previous` that the fresh grant on `node` no longer covers.
fn stale_cpus(previous: &GuaranteedPod, node: &str, granted: &ProfileCpus) -> ProfileCpus {
    cpus_by_profile(&previous.containers)
        .into_iter()
        .map(|(profile, cpus)| {
            let stale = match granted.get(&profile) {
                Some(kept) if previous.node == node => cpus.difference(kept).copied().collect(),
                _ => cpus,
            };
            (profile, stale)
        })
        .filter(|(_, cpus)| !cpus.is_empty())
        .collect()
}

fn partial_failure(
    key: &PodKey,
    operation: &str,
    failures: Vec<(String, ReconcileError)>,
) -> ReconcileError {
    let details: Vec<String> = failures
        .into_iter()
        .map(|(profile, e)| format!("{profile}: {e}"))
        .collect();
    ReconcileError::transient(format!(
        "{operation} of CPUs for pod {key} failed for {} profile(s): {}",
        details.len(),
        details.join("; ")
    ))
}
