//! # Error Policy
//!
//! Error handling for the controller watch loop.

use kube::Resource;
use kube_runtime::controller::Action;
use std::sync::Arc;
use tracing::{error, info};

use crate::constants::ERROR_RECONCILE_TIME;
use crate::controller::reconciler::ReconcilerError;
use crate::crd::ManagedResource;
use crate::observability;

use super::watch_loop::ReconcileContext;

/// Handle a failed reconciliation
///
/// Every error requeues after the fixed error interval.
pub fn handle_reconciliation_error<R>(
    obj: Arc<R>,
    error: &ReconcilerError,
    _ctx: Arc<ReconcileContext<R>>,
) -> Action
where
    R: ManagedResource,
{
    let meta = obj.meta();
    let name = meta.name.as_deref().unwrap_or("unknown");
    let namespace = meta.namespace.as_deref().unwrap_or("default");

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.kind = R::RESOURCE_TYPE,
        resource.name = name,
        resource.namespace = namespace,
        error = %error
    );
    let _error_guard = error_span.enter();

    observability::metrics::increment_reconciliation_errors(R::RESOURCE_TYPE, error.reason());

    if matches!(error, ReconcilerError::Cancelled) {
        info!("Reconciliation of {}/{} cancelled", namespace, name);
    } else {
        error!("Reconciliation error for {}/{}: {:?}", namespace, name, error);
    }

    Action::requeue(ERROR_RECONCILE_TIME)
}
