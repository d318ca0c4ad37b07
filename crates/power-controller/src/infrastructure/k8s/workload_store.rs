use api_types::PowerWorkload;
use async_trait::async_trait;
use error_stack::Report;
use kube::api::DeleteParams;
use kube::api::PostParams;
use kube::api::Preconditions;
use kube::Api;
use kube::Client;
use kube::ResourceExt;

use crate::domain::traits::ServiceError;
use crate::domain::traits::WorkloadStore;
use crate::infrastructure::k8s::types::api_status;
use crate::infrastructure::k8s::types::request_failed;
use crate::infrastructure::k8s::types::KubernetesError;

const KIND: &str = "PowerWorkload";

/// `PowerWorkload` records in a single namespace.
///
/// Replace and delete are conditional on the object's `resourceVersion`; the
/// API server answers a stale version with 409, surfaced as a conflict.
#[derive(Clone)]
pub struct KubeWorkloadStore {
    api: Api<PowerWorkload>,
}

impl KubeWorkloadStore {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
        }
    }
}

fn classify(err: kube::Error, operation: &str, name: &str) -> Report<KubernetesError> {
    match api_status(&err) {
        Some(409) => Report::new(KubernetesError::Conflict {
            kind: KIND,
            name: name.to_string(),
        })
        .attach_printable(err.to_string()),
        _ => Report::new(request_failed(format!("{operation} {KIND} {name}: {err}"))),
    }
}

#[async_trait]
impl WorkloadStore for KubeWorkloadStore {
    async fn get(&self, name: &str) -> Result<Option<PowerWorkload>, ServiceError> {
        let workload = self
            .api
            .get_opt(name)
            .await
            .map_err(|e| classify(e, "get", name))?;
        Ok(workload)
    }

    async fn create(&self, workload: &PowerWorkload) -> Result<(), ServiceError> {
        let name = workload.name_any();
        self.api
            .create(&PostParams::default(), workload)
            .await
            .map_err(|e| classify(e, "create", &name))?;
        Ok(())
    }

    async fn replace(&self, workload: &PowerWorkload) -> Result<(), ServiceError> {
        let name = workload.name_any();
        self.api
            .replace(&name, &PostParams::default(), workload)
            .await
            .map_err(|e| classify(e, "replace", &name))?;
        Ok(())
    }

    async fn delete(&self, workload: &PowerWorkload) -> Result<(), ServiceError> {
        let name = workload.name_any();
        let params = DeleteParams {
            preconditions: Some(Preconditions {
                resource_version: workload.resource_version(),
                uid: None,
            }),
            ..DeleteParams::default()
        };

        match self.api.delete(&name, &params).await {
            Ok(_) => Ok(()),
            Err(e) if api_status(&e) == Some(404) => Ok(()),
            Err(e) => Err(classify(e, "delete", &name).into()),
        }
    }
}
