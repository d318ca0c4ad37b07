use async_trait::async_trait;
use error_stack::Report;
use k8s_openapi::api::core::v1::Node;
use kube::Api;
use kube::Client;
use tracing::debug;

use crate::domain::traits::NodeAddressResolver;
use crate::domain::traits::ServiceError;
use crate::infrastructure::k8s::types::request_failed;
use crate::infrastructure::k8s::types::KubernetesError;

/// Derives the AppQoS URL of a node from the first address in its status.
pub struct KubeNodeAddressResolver {
    client: Client,
    scheme: String,
    port: u16,
}

impl KubeNodeAddressResolver {
    pub fn new(client: Client, scheme: impl Into<String>, port: u16) -> Self {
        Self {
            client,
            scheme: scheme.into(),
            port,
        }
    }

    async fn lookup(&self, node_name: &str) -> Result<String, Report<KubernetesError>> {
        let api: Api<Node> = Api::all(self.client.clone());
        let node = api
            .get_opt(node_name)
            .await
            .map_err(|e| Report::new(request_failed(format!("get node {node_name}: {e}"))))?
            .ok_or_else(|| {
                Report::new(KubernetesError::NodeAddressMissing {
                    node_name: node_name.to_string(),
                })
                .attach_printable("node does not exist")
            })?;

        let address = node
            .status
            .and_then(|status| status.addresses)
            .and_then(|addresses| addresses.into_iter().next())
            .map(|address| address.address)
            .filter(|address| !address.is_empty())
            .ok_or_else(|| {
                Report::new(KubernetesError::NodeAddressMissing {
                    node_name: node_name.to_string(),
                })
            })?;

        Ok(service_url(&self.scheme, &address, self.port))
    }
}

fn service_url(scheme: &str, host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("{scheme}://[{host}]:{port}")
    } else {
        format!("{scheme}://{host}:{port}")
    }
}

#[async_trait]
impl NodeAddressResolver for KubeNodeAddressResolver {
    async fn resolve(&self, node_name: &str) -> Result<String, ServiceError> {
        let url = self.lookup(node_name).await?;
        debug!(node = %node_name, url = %url, "Resolved AppQoS address");
        Ok(url)
    }
}
