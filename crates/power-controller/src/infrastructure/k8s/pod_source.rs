use async_trait::async_trait;
use error_stack::Report;
use k8s_openapi::api::core::v1::Pod;
use kube::Api;
use kube::Client;

use crate::domain::traits::PodSource;
use crate::domain::traits::ServiceError;
use crate::infrastructure::k8s::types::request_failed;
use crate::infrastructure::k8s::types::KubernetesError;

/// Reads pods straight from the API server.
#[derive(Clone)]
pub struct KubePodSource {
    client: Client,
}

impl KubePodSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn fetch(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Pod>, Report<KubernetesError>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .map_err(|e| Report::new(request_failed(format!("get pod {namespace}/{name}: {e}"))))
    }
}

#[async_trait]
impl PodSource for KubePodSource {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, ServiceError> {
        Ok(self.fetch(namespace, name).await?)
    }
}
