use core::error::Error;

use error_stack::Report;

use crate::domain::traits::ServiceError;

/// Errors that can occur during Kubernetes operations.
#[derive(Debug, derive_more::Display)]
pub enum KubernetesError {
    #[display("Failed to connect to Kubernetes API: {message}")]
    ConnectionFailed { message: String },
    #[display("Kubernetes API request failed: {message}")]
    RequestFailed { message: String },
    #[display("Conflicting write to {kind} {name}")]
    Conflict { kind: &'static str, name: String },
    #[display("Node {node_name} has no usable address")]
    NodeAddressMissing { node_name: String },
}

impl Error for KubernetesError {}

impl From<Report<KubernetesError>> for ServiceError {
    fn from(report: Report<KubernetesError>) -> Self {
        match report.current_context() {
            KubernetesError::Conflict { name, .. } => ServiceError::Conflict { name: name.clone() },
            _ => ServiceError::unavailable(report.to_string()),
        }
    }
}

/// HTTP status of an API error response, if the error is one.
pub(crate) fn api_status(err: &kube::Error) -> Option<u16> {
    match err {
        kube::Error::Api(response) => Some(response.code),
        _ => None,
    }
}

pub(crate) fn request_failed(what: impl Into<String>) -> KubernetesError {
    KubernetesError::RequestFailed {
        message: what.into(),
    }
}
