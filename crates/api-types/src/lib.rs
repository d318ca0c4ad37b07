//! Shared API type definitions
//!
//! This crate contains the types exchanged between the power controller and the
//! components around it: the `PowerWorkload` custom resource consumed by the
//! node agents, the per-pod bookkeeping records and the AppQoS power profile
//! payload.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

/// Prefix of the extended resource a container requests to select a profile,
/// e.g. `power.example.com/performance`.
pub const PROFILE_RESOURCE_PREFIX: &str = "power.example.com/";

/// Suffix appended to a profile name to build its workload name.
pub const WORKLOAD_NAME_SUFFIX: &str = "-workload";

/// Name of the `PowerWorkload` aggregating every CPU granted to `profile`.
pub fn workload_name(profile: &str) -> String {
    format!("{profile}{WORKLOAD_NAME_SUFFIX}")
}

/// Aggregate CPU assignment of one power profile across the cluster.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "power.example.com",
    version = "v1alpha1",
    kind = "PowerWorkload",
    plural = "powerworkloads",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct PowerWorkloadSpec {
    /// Power profile applied to every CPU listed in `nodes`
    pub profile_name: String,
    /// Per-node CPU sets, at most one entry per node
    #[serde(default)]
    pub nodes: Vec<NodeInfo>,
}

/// CPUs of a single node that belong to a workload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    pub node_name: String,
    /// Sorted ascending, no duplicates
    #[serde(default)]
    pub cpu_ids: Vec<u32>,
}

/// Container of a guaranteed pod that was granted exclusive CPUs and a profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerContainer {
    /// Container name
    pub name: String,
    /// Runtime container ID without the transport scheme
    pub id: String,
    /// CPUs the kubelet pinned the container to
    pub exclusive_cpus: Vec<u32>,
    /// Validated power profile name
    pub power_profile: String,
}

/// Everything the controller granted to one pod.
///
/// Stored until the pod is deleted so the grant can be reverted without
/// re-reading the pod spec.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuaranteedPod {
    pub node: String,
    pub name: String,
    pub namespace: String,
    pub uid: String,
    pub containers: Vec<PowerContainer>,
}

/// Power profile as served by the AppQoS REST API.
///
/// AppQoS answers with an all-empty object when it knows no such profile, so
/// every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_freq: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_freq: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epp: Option<String>,
}

impl PowerProfile {
    /// Whether this is the empty sentinel AppQoS returns for unknown profiles.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
