pub mod controller;
pub mod node_address;
pub mod pod_source;
pub mod types;
pub mod workload_store;

pub use node_address::KubeNodeAddressResolver;
pub use pod_source::KubePodSource;
pub use types::KubernetesError;
pub use workload_store::KubeWorkloadStore;
