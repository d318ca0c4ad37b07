//! Core types shared by the reconciliation components

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::domain::cpu_list::CpuListError;

/// Identity of a pod in the state tracker and the per-pod lock.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct PodKey {
    pub namespace: String,
    pub name: String,
}

impl PodKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for PodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// How many distinct profiles a single pod may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProfilePolicy {
    /// Every profile-requesting container of a pod must ask for the same profile
    #[default]
    OnePerPod,
    /// Each container may pick its own profile
    PerContainer,
}

/// Tuning knobs of the [`Reconciler`](crate::domain::reconciler::Reconciler).
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Namespace holding the `PowerWorkload` resources
    pub workload_namespace: String,
    pub profile_policy: ProfilePolicy,
    /// Upper bound for every call to an external service
    pub call_timeout: Duration,
    /// Attempts of a conflicting `PowerWorkload` write before giving up
    pub conflict_retries: u32,
    /// Base delay between conflicting writes, doubled on every attempt
    pub conflict_backoff: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            workload_namespace: "power-manager".to_string(),
            profile_policy: ProfilePolicy::OnePerPod,
            call_timeout: Duration::from_secs(5),
            conflict_retries: 5,
            conflict_backoff: Duration::from_millis(50),
        }
    }
}

/// Result of a reconciliation that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Workloads and pod state were changed
    Applied,
    /// Nothing to do for this pod
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum SkipReason {
    #[display("pod not found")]
    PodNotFound,
    #[display("deleted pod has no recorded state")]
    NoRecordedState,
    #[display("no container requests exclusive CPUs")]
    NoExclusiveContainers,
    #[display("no container requests a power profile")]
    NoProfileRequests,
}

/// A pod asks for something the controller refuses to apply.
///
/// These never resolve by retrying; the pod has to change first.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("container {container} requests more than one power profile")]
    MultipleProfilesInContainer { container: String },

    #[error("pod requests more than one power profile: {profiles:?}")]
    MultipleProfilesInPod { profiles: Vec<String> },

    #[error("power profile '{profile}' not found on node {node}")]
    UnknownProfile { profile: String, node: String },

    #[error("pod is missing {field}")]
    MissingIdentity { field: &'static str },

    #[error("invalid CPU list for container {container}: {source}")]
    InvalidCpuList {
        container: String,
        #[source]
        source: CpuListError,
    },
}

/// Failure of a single reconciliation.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("pod {pod} is not running yet (phase {phase})")]
    NotReady { pod: String, phase: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{message}")]
    Transient { message: String },
}

impl ReconcileError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Whether re-delivering the same event may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Validation(_))
    }
}
