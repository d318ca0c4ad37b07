pub mod cpu_list;
pub mod pod_state;
pub mod profile_request;
pub mod profile_validator;
pub mod quantity;
pub mod reconciler;
pub mod traits;
pub mod types;
pub mod workload;

#[cfg(test)]
pub mod mock;

pub use pod_state::PodStateRepository;
pub use pod_state::PodStateStore;
pub use reconciler::Collaborators;
pub use reconciler::Reconciler;
pub use types::ReconcileError;
pub use types::ReconcileOutcome;
pub use types::ReconcilerConfig;
