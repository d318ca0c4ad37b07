//! Seams between the reconciliation logic and the outside world
//!
//! Production implementations live in `infrastructure`, in-memory ones used by
//! the tests in `domain::mock`.

use api_types::PowerProfile;
use api_types::PowerWorkload;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use thiserror::Error;

/// Error reported by a collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The object changed since it was read, or was created concurrently
    #[error("conflicting write to {name}")]
    Conflict { name: String },

    #[error("{message}")]
    Unavailable { message: String },
}

impl ServiceError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

/// Read access to the pods being reconciled.
#[async_trait]
pub trait PodSource: Send + Sync {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, ServiceError>;
}

/// Resolves the base URL of the AppQoS instance serving a node.
#[async_trait]
pub trait NodeAddressResolver: Send + Sync {
    async fn resolve(&self, node_name: &str) -> Result<String, ServiceError>;
}

/// Looks up power profiles known to a node's AppQoS instance.
#[async_trait]
pub trait ProfileClient: Send + Sync {
    /// `Ok(None)` when the profile does not exist.
    async fn get_profile(
        &self,
        name: &str,
        node_address: &str,
    ) -> Result<Option<PowerProfile>, ServiceError>;
}

/// Reports the CPUs the kubelet pinned a container to.
#[async_trait]
pub trait PodResourcesClient: Send + Sync {
    /// Returns a CPU list such as `"4-5,8"`.
    async fn get_container_cpus(
        &self,
        namespace: &str,
        pod_name: &str,
        container_name: &str,
    ) -> Result<String, ServiceError>;
}

/// Versioned storage of `PowerWorkload` records.
///
/// Writes are conditional on the `resourceVersion` carried by the object and
/// fail with [`ServiceError::Conflict`] when it is stale.
#[async_trait]
pub trait WorkloadStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<PowerWorkload>, ServiceError>;

    /// Fails with `Conflict` when a workload with that name already exists.
    async fn create(&self, workload: &PowerWorkload) -> Result<(), ServiceError>;

    async fn replace(&self, workload: &PowerWorkload) -> Result<(), ServiceError>;

    /// Deleting a workload that is already gone succeeds.
    async fn delete(&self, workload: &PowerWorkload) -> Result<(), ServiceError>;
}
