use std::sync::Arc;
use std::time::Duration;

use error_stack::Report;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::controller::Action;
use kube::runtime::events::Event;
use kube::runtime::events::EventType;
use kube::runtime::events::Recorder;
use kube::runtime::events::Reporter;
use kube::runtime::watcher;
use kube::runtime::Controller;
use kube::Api;
use kube::Client;
use kube::Resource;
use kube::ResourceExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::domain::ReconcileError;
use crate::domain::ReconcileOutcome;
use crate::domain::Reconciler;
use crate::infrastructure::k8s::types::KubernetesError;

pub const CONTROLLER_NAME: &str = "power-pod-controller";

const NOT_READY_REQUEUE: Duration = Duration::from_secs(5);
const TRANSIENT_REQUEUE: Duration = Duration::from_secs(15);

struct Context {
    reconciler: Arc<Reconciler>,
    client: Client,
    reporter: Reporter,
}

/// Drives the [`Reconciler`] from pod watch events.
pub struct PowerPodController {
    client: Client,
    reconciler: Arc<Reconciler>,
    namespace: Option<String>,
    node_name: Option<String>,
}

impl PowerPodController {
    pub fn new(
        client: Client,
        reconciler: Arc<Reconciler>,
        namespace: Option<String>,
        node_name: Option<String>,
    ) -> Self {
        Self {
            client,
            reconciler,
            namespace,
            node_name,
        }
    }

    /// Runs until `cancellation_token` fires.
    ///
    /// Reconciliations already in flight are allowed to finish.
    #[tracing::instrument(skip(self, cancellation_token), fields(namespace = ?self.namespace, node_name = ?self.node_name))]
    pub async fn run(
        &self,
        cancellation_token: CancellationToken,
    ) -> Result<(), Report<KubernetesError>> {
        info!("Starting power pod controller");

        let pods: Api<Pod> = match &self.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };

        let mut config = watcher::Config::default();
        if let Some(node_name) = &self.node_name {
            config = config.fields(&format!("spec.nodeName={node_name}"));
        }

        let context = Arc::new(Context {
            reconciler: Arc::clone(&self.reconciler),
            client: self.client.clone(),
            reporter: Reporter {
                controller: CONTROLLER_NAME.to_string(),
                instance: std::env::var("POD_NAME").ok(),
            },
        });

        Controller::new(pods, config)
            .graceful_shutdown_on(cancellation_token.cancelled_owned())
            .run(reconcile, error_policy, context)
            .for_each(|result| async move {
                match result {
                    Ok((pod, _)) => debug!(pod = %pod.name, "Reconciled"),
                    Err(e) => debug!(error = %e, "Reconciliation did not complete"),
                }
            })
            .await;

        info!("Power pod controller stopped");
        Ok(())
    }
}

async fn reconcile(pod: Arc<Pod>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    let namespace = pod.namespace().unwrap_or_default();
    let name = pod.name_any();

    match ctx.reconciler.reconcile(&namespace, &name).await {
        Ok(ReconcileOutcome::Applied) => Ok(Action::await_change()),
        Ok(ReconcileOutcome::Skipped(reason)) => {
            debug!(pod = %name, namespace = %namespace, %reason, "Nothing to do");
            Ok(Action::await_change())
        }
        Err(ReconcileError::Validation(e)) => {
            warn!(pod = %name, namespace = %namespace, error = %e, "Rejected power profile request");
            publish_rejection(&ctx, &pod, &e.to_string()).await;
            Ok(Action::await_change())
        }
        Err(e) => Err(e),
    }
}

fn error_policy(pod: Arc<Pod>, error: &ReconcileError, _ctx: Arc<Context>) -> Action {
    match error {
        ReconcileError::NotReady { .. } => {
            debug!(pod = %pod.name_any(), %error, "Pod not ready, requeueing");
            Action::requeue(NOT_READY_REQUEUE)
        }
        _ => {
            error!(pod = %pod.name_any(), %error, "Reconciliation failed, requeueing");
            Action::requeue(TRANSIENT_REQUEUE)
        }
    }
}

async fn publish_rejection(ctx: &Context, pod: &Pod, note: &str) {
    let recorder = Recorder::new(ctx.client.clone(), ctx.reporter.clone(), pod.object_ref(&()));
    let event = Event {
        type_: EventType::Warning,
        reason: "PowerProfileRejected".to_string(),
        note: Some(note.to_string()),
        action: "Reconcile".to_string(),
        secondary: None,
    };
    if let Err(e) = recorder.publish(event).await {
        warn!(pod = %pod.name_any(), error = %e, "Failed to publish event");
    }
}
