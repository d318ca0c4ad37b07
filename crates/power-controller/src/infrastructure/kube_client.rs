use std::path::Path;
use std::time::Duration;

use error_stack::Report;
use error_stack::ResultExt;
use kube::config::KubeConfigOptions;
use kube::config::Kubeconfig;
use kube::Client;
use kube::Config;

use crate::infrastructure::k8s::KubernetesError;

/// Builds a client from `kubeconfig`, or from the in-cluster/default config.
///
/// Only connecting is bounded by `connect_timeout`. Reads keep kube's default
/// so that watch streams are not cut short.
pub async fn init_kube_client(
    kubeconfig: Option<&Path>,
    connect_timeout: Duration,
) -> Result<Client, Report<KubernetesError>> {
    let config = match kubeconfig {
        Some(path) => load_kubeconfig(path).await?,
        None => Config::infer()
            .await
            .change_context(KubernetesError::ConnectionFailed {
                message: "no in-cluster or default kubeconfig available".to_string(),
            })?,
    };

    Client::try_from(with_connect_timeout(config, connect_timeout)).change_context(
        KubernetesError::ConnectionFailed {
            message: "cannot create client".to_string(),
        },
    )
}

async fn load_kubeconfig(path: &Path) -> Result<Config, Report<KubernetesError>> {
    let kubeconfig =
        Kubeconfig::read_from(path).change_context(KubernetesError::ConnectionFailed {
            message: format!("cannot read kubeconfig {}", path.display()),
        })?;

    Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .change_context(KubernetesError::ConnectionFailed {
            message: format!("invalid kubeconfig {}", path.display()),
        })
}

fn with_connect_timeout(mut config: Config, connect_timeout: Duration) -> Config {
    config.connect_timeout = Some(connect_timeout);
    config
}
