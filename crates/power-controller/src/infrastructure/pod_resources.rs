//! Client of the kubelet pod-resources API served on a local unix socket

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use error_stack::Report;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Channel;
use tracing::debug;

use crate::domain::cpu_list::format_cpu_list;
use crate::domain::traits::PodResourcesClient;
use crate::domain::traits::ServiceError;

const LIST_METHOD: &str = "/v1.PodResourcesLister/List";

/// Subset of the kubelet `v1` pod-resources messages that carries CPU ids.
pub mod v1 {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ListPodResourcesRequest {}

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ListPodResourcesResponse {
        #[prost(message, repeated, tag = "1")]
        pub pod_resources: ::prost::alloc::vec::Vec<PodResources>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct PodResources {
        #[prost(string, tag = "1")]
        pub name: ::prost::alloc::string::String,
        #[prost(string, tag = "2")]
        pub namespace: ::prost::alloc::string::String,
        #[prost(message, repeated, tag = "3")]
        pub containers: ::prost::alloc::vec::Vec<ContainerResources>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ContainerResources {
        #[prost(string, tag = "1")]
        pub name: ::prost::alloc::string::String,
        #[prost(int64, repeated, tag = "3")]
        pub cpu_ids: ::prost::alloc::vec::Vec<i64>,
    }
}

#[derive(Debug, derive_more::Display)]
pub enum PodResourcesError {
    #[display("Failed to connect to kubelet socket {path}: {message}")]
    ConnectionFailed { path: String, message: String },
    #[display("Kubelet pod-resources List call failed: {message}")]
    ListFailed { message: String },
    #[display("Kubelet reports no container {container} in pod {namespace}/{pod}")]
    ContainerNotFound {
        namespace: String,
        pod: String,
        container: String,
    },
}

impl core::error::Error for PodResourcesError {}

impl From<Report<PodResourcesError>> for ServiceError {
    fn from(report: Report<PodResourcesError>) -> Self {
        ServiceError::unavailable(report.to_string())
    }
}

pub struct KubeletPodResourcesClient {
    socket_path: PathBuf,
}

impl KubeletPodResourcesClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    #[tracing::instrument(skip(self), fields(socket = ?self.socket_path))]
    async fn list(&self) -> Result<v1::ListPodResourcesResponse, Report<PodResourcesError>> {
        let channel = self.create_unix_channel().await.map_err(|e| {
            Report::new(PodResourcesError::ConnectionFailed {
                path: self.socket_path.display().to_string(),
                message: e.to_string(),
            })
        })?;

        let list_failed = |message: String| Report::new(PodResourcesError::ListFailed { message });

        let mut grpc = tonic::client::Grpc::new(channel);
        grpc.ready()
            .await
            .map_err(|e| list_failed(format!("service not ready: {e}")))?;

        let codec: ProstCodec<v1::ListPodResourcesRequest, v1::ListPodResourcesResponse> =
            ProstCodec::default();
        let response = grpc
            .unary(
                tonic::Request::new(v1::ListPodResourcesRequest {}),
                PathAndQuery::from_static(LIST_METHOD),
                codec,
            )
            .await
            .map_err(|status| list_failed(status.to_string()))?;

        let response = response.into_inner();
        debug!(pods = response.pod_resources.len(), "Listed pod resources");
        Ok(response)
    }

    /// Create a gRPC channel connected to the kubelet unix socket
    async fn create_unix_channel(&self) -> Result<Channel, io::Error> {
        use hyper_util::rt::TokioIo;
        use tonic::transport::{Endpoint, Uri};
        use tower::service_fn;

        let socket_path = self.socket_path.clone();

        // the URI is ignored by the connector
        let channel = Endpoint::try_from("http://[::]:50051")
            .map_err(|e| io::Error::other(e.to_string()))?
            .connect_with_connector(service_fn(move |_: Uri| {
                let socket_path = socket_path.clone();
                async move {
                    tokio::net::UnixStream::connect(socket_path)
                        .await
                        .map(TokioIo::new)
                }
            }))
            .await
            .map_err(|e| io::Error::other(e.to_string()))?;
        Ok(channel)
    }
}

/// CPU list of one container in a List response.
fn container_cpu_list(
    response: &v1::ListPodResourcesResponse,
    namespace: &str,
    pod_name: &str,
    container_name: &str,
) -> Result<String, Report<PodResourcesError>> {
    let container = response
        .pod_resources
        .iter()
        .filter(|pod| pod.namespace == namespace && pod.name == pod_name)
        .flat_map(|pod| pod.containers.iter())
        .find(|container| container.name == container_name)
        .ok_or_else(|| {
            Report::new(PodResourcesError::ContainerNotFound {
                namespace: namespace.to_string(),
                pod: pod_name.to_string(),
                container: container_name.to_string(),
            })
        })?;

    let cpus: Vec<u32> = container
        .cpu_ids
        .iter()
        .filter_map(|&cpu| u32::try_from(cpu).ok())
        .collect();
    Ok(format_cpu_list(&cpus))
}

#[async_trait]
impl PodResourcesClient for KubeletPodResourcesClient {
    async fn get_container_cpus(
        &self,
        namespace: &str,
        pod_name: &str,
        container_name: &str,
    ) -> Result<String, ServiceError> {
        let response = self.list().await?;
        Ok(container_cpu_list(
            &response,
            namespace,
            pod_name,
            container_name,
        )?)
    }
}
