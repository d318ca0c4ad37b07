//! Aggregation of granted CPUs into per-profile `PowerWorkload` records
//!
//! Each record holds, per node, the sorted set of CPUs running with the record's
//! profile. Merging and removal are pure functions on the spec;
//! [`WorkloadAggregator`] applies them to a [`WorkloadStore`] with optimistic
//! concurrency so that two pods updating the same record never drop each
//! other's CPUs.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use api_types::workload_name;
use api_types::NodeInfo;
use api_types::PowerWorkload;
use api_types::PowerWorkloadSpec;
use tokio::time::sleep;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::domain::traits::ServiceError;
use crate::domain::traits::WorkloadStore;

/// What an aggregator call did to the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadChange {
    Created,
    Updated,
    /// The last node entry was removed and the record deleted
    Deleted,
    /// The record already had the requested content
    Unchanged,
    /// Removal from a record that does not exist
    Absent,
}

/// Unions `cpus` into `node`'s entry, creating the entry if needed.
///
/// Returns whether the spec changed.
pub fn merge_node_cpus(spec: &mut PowerWorkloadSpec, node: &str, cpus: &[u32]) -> bool {
    if cpus.is_empty() {
        return false;
    }

    match spec.nodes.iter_mut().find(|entry| entry.node_name == node) {
        Some(entry) => {
            let merged: BTreeSet<u32> = entry.cpu_ids.iter().chain(cpus).copied().collect();
            let merged: Vec<u32> = merged.into_iter().collect();
            if merged == entry.cpu_ids {
                return false;
            }
            entry.cpu_ids = merged;
        }
        None => spec.nodes.push(NodeInfo {
            node_name: node.to_string(),
            cpu_ids: sorted_unique(cpus),
        }),
    }
    true
}

/// Removes `cpus` from `node`'s entry, dropping the entry once it is empty.
///
/// Returns whether the spec changed.
pub fn remove_node_cpus(spec: &mut PowerWorkloadSpec, node: &str, cpus: &[u32]) -> bool {
    let Some(index) = spec.nodes.iter().position(|entry| entry.node_name == node) else {
        return false;
    };

    let removed: BTreeSet<u32> = cpus.iter().copied().collect();
    let entry = &mut spec.nodes[index];
    let remaining: Vec<u32> = entry
        .cpu_ids
        .iter()
        .copied()
        .filter(|cpu| !removed.contains(cpu))
        .collect();

    if remaining.is_empty() {
        spec.nodes.remove(index);
        return true;
    }
    if remaining == entry.cpu_ids {
        return false;
    }
    entry.cpu_ids = remaining;
    true
}

fn sorted_unique(cpus: &[u32]) -> Vec<u32> {
    cpus.iter()
        .copied()
        .collect::<BTreeSet<u32>>()
        .into_iter()
        .collect()
}

/// Read-modify-write of `PowerWorkload` records with retry on conflict.
pub struct WorkloadAggregator {
    store: Arc<dyn WorkloadStore>,
    retries: u32,
    backoff: Duration,
}

impl WorkloadAggregator {
    pub fn new(store: Arc<dyn WorkloadStore>, retries: u32, backoff: Duration) -> Self {
        Self {
            store,
            retries: retries.max(1),
            backoff,
        }
    }

    /// Adds `cpus` on `node` to the workload of `profile`.
    #[tracing::instrument(skip(self, cpus), fields(cpus = ?cpus))]
    pub async fn add(
        &self,
        profile: &str,
        node: &str,
        cpus: &[u32],
    ) -> Result<WorkloadChange, ServiceError> {
        let name = workload_name(profile);

        for attempt in 0..self.retries {
            let result = match self.store.get(&name).await? {
                None => {
                    let mut spec = PowerWorkloadSpec {
                        profile_name: profile.to_string(),
                        nodes: Vec::new(),
                    };
                    if !merge_node_cpus(&mut spec, node, cpus) {
                        return Ok(WorkloadChange::Unchanged);
                    }
                    let workload = PowerWorkload::new(&name, spec);
                    self.store
                        .create(&workload)
                        .await
                        .map(|()| WorkloadChange::Created)
                }
                Some(mut workload) => {
                    if !merge_node_cpus(&mut workload.spec, node, cpus) {
                        debug!(workload = %name, "CPUs already present in workload");
                        return Ok(WorkloadChange::Unchanged);
                    }
                    self.store
                        .replace(&workload)
                        .await
                        .map(|()| WorkloadChange::Updated)
                }
            };

            match result {
                Ok(change) => {
                    info!(workload = %name, node = %node, change = ?change, "Added CPUs to workload");
                    return Ok(change);
                }
                Err(ServiceError::Conflict { .. }) => self.wait_before_retry(&name, attempt).await,
                Err(e) => return Err(e),
            }
        }

        Err(ServiceError::Conflict { name })
    }

    /// Removes `cpus` on `node` from the workload of `profile`.
    ///
    /// A workload left without nodes is deleted.
    #[tracing::instrument(skip(self, cpus), fields(cpus = ?cpus))]
    pub async fn remove(
        &self,
        profile: &str,
        node: &str,
        cpus: &[u32],
    ) -> Result<WorkloadChange, ServiceError> {
        let name = workload_name(profile);

        for attempt in 0..self.retries {
            let Some(mut workload) = self.store.get(&name).await? else {
                debug!(workload = %name, "Workload already gone, nothing to remove");
                return Ok(WorkloadChange::Absent);
            };

            if !remove_node_cpus(&mut workload.spec, node, cpus) {
                return Ok(WorkloadChange::Unchanged);
            }

            let result = if workload.spec.nodes.is_empty() {
                self.store
                    .delete(&workload)
                    .await
                    .map(|()| WorkloadChange::Deleted)
            } else {
                self.store
                    .replace(&workload)
                    .await
                    .map(|()| WorkloadChange::Updated)
            };

            match result {
                Ok(change) => {
                    info!(workload = %name, node = %node, change = ?change, "Removed CPUs from workload");
                    return Ok(change);
                }
                Err(ServiceError::Conflict { .. }) => self.wait_before_retry(&name, attempt).await,
                Err(e) => return Err(e),
            }
        }

        Err(ServiceError::Conflict { name })
    }

    async fn wait_before_retry(&self, name: &str, attempt: u32) {
        warn!(
            workload = %name,
            "Conflicting workload write (attempt {}/{}), retrying",
            attempt + 1,
            self.retries
        );
        if attempt + 1 < self.retries {
            sleep(self.backoff * 2u32.saturating_pow(attempt.min(6))).await;
        }
    }
}
