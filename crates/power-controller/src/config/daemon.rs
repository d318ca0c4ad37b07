use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::domain::types::ProfilePolicy;
use crate::domain::types::ReconcilerConfig;

#[derive(Parser, Debug, Clone)]
pub struct DaemonArgs {
    #[arg(
        long,
        env = "KUBECONFIG",
        value_hint = clap::ValueHint::FilePath,
        help = "Path to kubeconfig file (defaults to cluster config or ~/.kube/config)"
    )]
    pub kubeconfig: Option<PathBuf>,

    #[arg(
        long,
        env = "POWER_WORKLOAD_NAMESPACE",
        default_value = "power-manager",
        help = "Namespace holding the PowerWorkload resources"
    )]
    pub workload_namespace: String,

    #[arg(
        long,
        help = "Kubernetes namespace to watch for pods (empty for all namespaces)"
    )]
    pub watch_namespace: Option<String>,

    #[arg(
        long,
        env = "NODE_NAME",
        help = "Only reconcile pods scheduled to this node"
    )]
    pub node_name: Option<String>,

    #[arg(
        long,
        default_value = "https",
        help = "URL scheme of the per-node AppQoS service"
    )]
    pub appqos_scheme: String,

    #[arg(long, default_value_t = 5000, help = "Port of the per-node AppQoS service")]
    pub appqos_port: u16,

    #[arg(
        long,
        env = "APPQOS_INSECURE",
        default_value_t = false,
        help = "Accept self-signed AppQoS certificates"
    )]
    pub appqos_insecure: bool,

    #[arg(
        long,
        help = "Kubelet socket path for reading exclusive CPU assignments",
        default_value = "/var/lib/kubelet/pod-resources/kubelet.sock",
        value_hint = clap::ValueHint::FilePath,
    )]
    pub kubelet_socket_path: PathBuf,

    #[arg(
        long,
        default_value_t = 5000,
        help = "Timeout in milliseconds for every call to the API server, AppQoS or the kubelet"
    )]
    pub call_timeout_ms: u64,

    #[arg(
        long,
        default_value_t = 5,
        help = "Attempts of a conflicting PowerWorkload write before giving up"
    )]
    pub conflict_retries: u32,

    #[arg(
        long,
        env = "POWER_ALLOW_PER_CONTAINER_PROFILES",
        default_value_t = false,
        help = "Let each container of a pod request its own power profile"
    )]
    pub allow_per_container_profiles: bool,
}

impl DaemonArgs {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        let profile_policy = if self.allow_per_container_profiles {
            ProfilePolicy::PerContainer
        } else {
            ProfilePolicy::OnePerPod
        };

        ReconcilerConfig {
            workload_namespace: self.workload_namespace.clone(),
            profile_policy,
            call_timeout: self.call_timeout(),
            conflict_retries: self.conflict_retries,
            ..ReconcilerConfig::default()
        }
    }
}
