//! # Watch Loop
//!
//! Controller watch loop that monitors one managed resource kind and triggers
//! reconciliation when changes are detected.

use futures::StreamExt;
use kube::api::Api;
use kube::Client;
use kube_runtime::{controller, controller::Action, watcher, Controller};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ControllerConfig;
use crate::controller::reconciler::{ObjectKey, Reconciler, ReconcilerError};
use crate::crd::ManagedResource;
use crate::runtime::error_policy::handle_reconciliation_error;
use crate::store::{KubeStore, StoreObject};

/// Delay before the watch is restarted after its stream ended unexpectedly
const WATCH_RESTART_DELAY: Duration = Duration::from_secs(5);

/// Shared state handed to every reconcile of one kind
pub struct ReconcileContext<R> {
    pub reconciler: Arc<Reconciler<R, KubeStore>>,
    /// Cancelled on shutdown; aborts in-flight provider calls
    pub shutdown: CancellationToken,
}

impl<R: Send + Sync> std::fmt::Debug for ReconcileContext<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconcileContext")
            .field("reconciler", &self.reconciler)
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish()
    }
}

/// Run the controller watch loop for kind `R` until `shutdown` is cancelled
///
/// Watches `R` across all namespaces. The watch is restarted if its stream
/// ends while the operator is still running.
pub async fn run_controller<R>(
    client: Client,
    reconciler: Arc<Reconciler<R, KubeStore>>,
    config: &ControllerConfig,
    shutdown: CancellationToken,
) -> Result<(), anyhow::Error>
where
    R: ManagedResource + StoreObject,
{
    let context = Arc::new(ReconcileContext {
        reconciler,
        shutdown: shutdown.clone(),
    });
    let controller_config =
        controller::Config::default().concurrency(config.max_concurrent_reconciliations);

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        let watch_span = tracing::span!(
            tracing::Level::INFO,
            "controller.watch",
            resource.kind = R::RESOURCE_TYPE
        );
        info!(parent: &watch_span, "Starting controller watch loop...");

        let api: Api<R> = Api::all(client.clone());
        Controller::new(api, watcher::Config::default().any_semantic())
            .with_config(controller_config.clone())
            .graceful_shutdown_on(shutdown.clone().cancelled_owned())
            .run(
                reconcile_object::<R>,
                handle_reconciliation_error::<R>,
                Arc::clone(&context),
            )
            .for_each(|result| {
                match result {
                    Ok((obj_ref, action)) => {
                        debug!(parent: &watch_span, object = %obj_ref, ?action, "watch.event.success");
                    }
                    Err(e) => {
                        warn!(parent: &watch_span, error = %e, "Controller stream error");
                    }
                }
                futures::future::ready(())
            })
            .await;

        if shutdown.is_cancelled() {
            break;
        }

        warn!(
            parent: &watch_span,
            "Controller watch stream ended, restarting in {} seconds...",
            WATCH_RESTART_DELAY.as_secs()
        );
        tokio::select! {
            () = shutdown.cancelled() => break,
            () = tokio::time::sleep(WATCH_RESTART_DELAY) => {}
        }
    }

    info!(resource.kind = R::RESOURCE_TYPE, "Controller stopped gracefully");
    Ok(())
}

async fn reconcile_object<R>(
    obj: Arc<R>,
    ctx: Arc<ReconcileContext<R>>,
) -> Result<Action, ReconcilerError>
where
    R: ManagedResource + StoreObject,
{
    let key = ObjectKey::from_resource(obj.as_ref());
    ctx.reconciler
        .reconcile(&key, &ctx.shutdown)
        .await
        .map(Action::from)
}
