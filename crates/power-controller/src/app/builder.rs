use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::app::core::Application;
use crate::app::services::ApplicationServices;
use crate::config::DaemonArgs;
use crate::domain::Collaborators;
use crate::domain::PodStateStore;
use crate::domain::Reconciler;
use crate::infrastructure::appqos::AppQosClient;
use crate::infrastructure::k8s::controller::PowerPodController;
use crate::infrastructure::k8s::KubeNodeAddressResolver;
use crate::infrastructure::k8s::KubePodSource;
use crate::infrastructure::k8s::KubeWorkloadStore;
use crate::infrastructure::kube_client;
use crate::infrastructure::pod_resources::KubeletPodResourcesClient;

/// Application builder
pub struct ApplicationBuilder {
    daemon_args: DaemonArgs,
}

impl ApplicationBuilder {
    pub fn new(daemon_args: DaemonArgs) -> Self {
        Self { daemon_args }
    }

    /// Connects to the cluster and wires the reconciler to its adapters.
    pub async fn build(self) -> Result<Application> {
        info!("Building application components...");
        let args = &self.daemon_args;

        let client = kube_client::init_kube_client(args.kubeconfig.as_deref(), args.call_timeout())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to initialize Kubernetes client: {e:?}"))?;

        let appqos = AppQosClient::new(args.appqos_insecure, args.call_timeout())
            .map_err(|e| anyhow::anyhow!("Failed to initialize AppQoS client: {e:?}"))?;

        let config = args.reconciler_config();
        let collaborators = Collaborators {
            pods: Arc::new(KubePodSource::new(client.clone())),
            node_addresses: Arc::new(KubeNodeAddressResolver::new(
                client.clone(),
                args.appqos_scheme.clone(),
                args.appqos_port,
            )),
            profiles: Arc::new(appqos),
            pod_resources: Arc::new(KubeletPodResourcesClient::new(
                args.kubelet_socket_path.clone(),
            )),
            workloads: Arc::new(KubeWorkloadStore::new(
                client.clone(),
                &config.workload_namespace,
            )),
        };

        let pod_state = Arc::new(PodStateStore::new());
        let reconciler = Arc::new(Reconciler::new(collaborators, pod_state.clone(), config));

        let controller = Arc::new(PowerPodController::new(
            client,
            reconciler.clone(),
            args.watch_namespace.clone(),
            args.node_name.clone(),
        ));

        info!(
            workload_namespace = %reconciler.config().workload_namespace,
            policy = ?reconciler.config().profile_policy,
            "Application components ready"
        );

        let services = ApplicationServices {
            pod_state,
            controller,
        };
        Ok(Application::new(services, self.daemon_args))
    }
}
