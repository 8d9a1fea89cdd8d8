//! # Reconcile
//!
//! The reconcile state machine for managed resources.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::crd::{ManagedResource, Phase};
use crate::observability::metrics;
use crate::provider::{
    select_provider, DeletionOutcome, Provider, ProviderError, ProvisionOutcome,
};
use crate::resources::{ensure_finalizer, has_finalizer, remove_finalizer};
use crate::store::{ObjectStore, StoreObject};
use crate::strategy::{ConfigError, StrategyConfig};

use super::secret::{delete_unowned_secret, write_secret};
use super::status::{update_status, StatusUpdate};
use super::types::{ObjectKey, ReconcileOutcome, Reconciler, ReconcilerError};

/// Why strategy or provider could not be resolved
#[derive(Debug, Error)]
enum ResolveError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

type Resolved<R> = (StrategyConfig, Arc<dyn Provider<R>>);

impl<R, S> Reconciler<R, S>
where
    R: ManagedResource + StoreObject,
    S: ObjectStore,
{
    /// Drive the object at `key` one step towards its desired state
    ///
    /// `cancel` aborts an in-flight provider call; a cancelled pass returns
    /// [`ReconcilerError::Cancelled`] without touching status.
    pub async fn reconcile(
        &self,
        key: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        let span = info_span!(
            "reconcile",
            resource.kind = R::RESOURCE_TYPE,
            resource.namespace = %key.namespace,
            resource.name = %key.name,
        );

        async move {
            let start = Instant::now();
            metrics::increment_reconciliations(R::RESOURCE_TYPE);
            let result = self.reconcile_object(key, cancel).await;
            metrics::observe_reconciliation_duration(
                R::RESOURCE_TYPE,
                start.elapsed().as_secs_f64(),
            );
            match &result {
                Ok(outcome) => debug!(
                    requeue = outcome.requeue,
                    requeue_after_secs = outcome.requeue_after.as_secs(),
                    "Reconcile finished"
                ),
                Err(e) => warn!(error = %e, "Reconcile failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn reconcile_object(
        &self,
        key: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        let obj: Option<R> = self
            .store
            .get(&key.namespace, &key.name)
            .await
            .map_err(|source| ReconcilerError::Store {
                context: format!("{} {key}", R::RESOURCE_TYPE),
                source,
            })?;

        let Some(obj) = obj else {
            debug!("Resource no longer exists, nothing to do");
            return Ok(ReconcileOutcome::done());
        };

        if obj.is_being_deleted() {
            self.reconcile_delete(obj, cancel).await
        } else {
            self.reconcile_create(obj, cancel).await
        }
    }

    async fn reconcile_create(
        &self,
        mut obj: R,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        if ensure_finalizer(&*self.store, &mut obj, &self.finalizer)
            .await
            .map_err(|source| ReconcilerError::Persistence {
                context: "finalizer".to_string(),
                source,
            })?
        {
            info!(finalizer = %self.finalizer, "Added finalizer");
        }

        let (strategy, provider) = match self.resolve(&obj).await {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(error = %e, "Failed to resolve provider");
                self.record_failure(&mut obj, e.to_string()).await;
                return Ok(ReconcileOutcome::retry());
            }
        };

        // A complete resource is only re-checked; keep its status stable
        let already_complete = obj
            .resource_status()
            .is_some_and(|status| status.phase == Phase::Complete);
        if !already_complete {
            let update = StatusUpdate::new(
                Phase::InProgress,
                format!("{} creation in progress", R::RESOURCE_TYPE),
            )
            .with_strategy(&strategy.strategy_name, provider.name());
            if let Err(e) = update_status(&*self.store, &mut obj, update).await {
                warn!(error = %e, "Failed to set in progress status");
            }
        }

        let result = self
            .run_provider(provider.name(), "create", cancel, provider.create(&obj, &strategy))
            .await?;

        match result {
            Err(source) => {
                error!(provider = provider.name(), error = %source, "Provider failed to create resource");
                self.record_failure(&mut obj, format!("failed to create {}: {source}", R::RESOURCE_TYPE))
                    .await;
                Err(ReconcilerError::Provider {
                    provider: provider.name().to_string(),
                    source,
                })
            }
            Ok(ProvisionOutcome::InProgress(message)) => {
                info!(provider = provider.name(), %message, "Provisioning in progress");
                let update = StatusUpdate::new(Phase::InProgress, message)
                    .with_strategy(&strategy.strategy_name, provider.name());
                update_status(&*self.store, &mut obj, update)
                    .await
                    .map_err(|source| ReconcilerError::Persistence {
                        context: "status".to_string(),
                        source,
                    })?;
                Ok(ReconcileOutcome::after(provider.reconcile_time(&obj)))
            }
            Ok(ProvisionOutcome::Ready(details)) => {
                let target = obj.target_secret();
                if let Err(source) = write_secret(&*self.store, &obj, &target, &details).await {
                    error!(secret = %target.name, error = %source, "Failed to write connection secret");
                    self.record_failure(&mut obj, format!("failed to write secret {}: {source}", target.name))
                        .await;
                    return Err(ReconcilerError::Persistence {
                        context: format!("secret {}", target.name),
                        source,
                    });
                }

                let update = StatusUpdate::new(
                    Phase::Complete,
                    format!("{} creation successful", R::RESOURCE_TYPE),
                )
                .with_strategy(&strategy.strategy_name, provider.name())
                .with_secret_ref(target);
                if update_status(&*self.store, &mut obj, update)
                    .await
                    .map_err(|source| ReconcilerError::Persistence {
                        context: "status".to_string(),
                        source,
                    })?
                {
                    info!(provider = provider.name(), "Resource is ready");
                }
                Ok(ReconcileOutcome::after(provider.reconcile_time(&obj)))
            }
        }
    }

    async fn reconcile_delete(
        &self,
        mut obj: R,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        if !has_finalizer(&obj, &self.finalizer) {
            debug!("Resource is being deleted and holds no finalizer of ours");
            return Ok(ReconcileOutcome::done());
        }

        let (strategy, provider) = match self.resolve(&obj).await {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(error = %e, "Failed to resolve provider for deletion");
                self.record_failure(&mut obj, e.to_string()).await;
                return Ok(ReconcileOutcome::retry());
            }
        };

        info!(provider = provider.name(), "Deleting backing resource");
        let result = self
            .run_provider(provider.name(), "delete", cancel, provider.delete(&obj, &strategy))
            .await?;

        match result {
            Err(source) => {
                error!(provider = provider.name(), error = %source, "Provider failed to delete resource");
                self.record_failure(&mut obj, format!("failed to delete {}: {source}", R::RESOURCE_TYPE))
                    .await;
                return Err(ReconcilerError::Provider {
                    provider: provider.name().to_string(),
                    source,
                });
            }
            Ok(DeletionOutcome::InProgress(message)) => {
                info!(provider = provider.name(), %message, "Deletion in progress");
                let update = StatusUpdate::new(Phase::InProgress, message)
                    .with_strategy(&strategy.strategy_name, provider.name());
                if let Err(e) = update_status(&*self.store, &mut obj, update).await {
                    warn!(error = %e, "Failed to set deletion status");
                }
                return Ok(ReconcileOutcome::after(provider.reconcile_time(&obj)));
            }
            Ok(DeletionOutcome::Deleted) => {}
        }

        let target = obj.target_secret();
        if delete_unowned_secret(&*self.store, &obj, &target)
            .await
            .map_err(|source| ReconcilerError::Persistence {
                context: format!("secret {} deletion", target.name),
                source,
            })?
        {
            info!(secret = %target.name, "Deleted connection secret");
        }

        remove_finalizer(&*self.store, &mut obj, &self.finalizer)
            .await
            .map_err(|source| ReconcilerError::Persistence {
                context: "finalizer".to_string(),
                source,
            })?;
        info!(finalizer = %self.finalizer, "Removed finalizer");
        Ok(ReconcileOutcome::done())
    }

    async fn resolve(&self, obj: &R) -> Result<Resolved<R>, ResolveError> {
        let strategy = self
            .config_manager
            .read_strategy(obj.deployment_type(), obj.tier())
            .await?;
        let provider = select_provider(&self.providers, &strategy.strategy_name)?;
        debug!(
            strategy = %strategy.strategy_name,
            provider = provider.name(),
            "Resolved provider"
        );
        Ok((strategy, provider))
    }

    /// Await a provider call unless `cancel` fires first
    async fn run_provider<T, F>(
        &self,
        provider: &str,
        operation: &str,
        cancel: &CancellationToken,
        call: F,
    ) -> Result<Result<T, ProviderError>, ReconcilerError>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        let start = Instant::now();
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                info!(provider, operation, "Provider call cancelled");
                return Err(ReconcilerError::Cancelled);
            }
            result = call => result,
        };
        metrics::record_provider_operation(
            provider,
            operation,
            start.elapsed().as_secs_f64(),
            result.is_ok(),
        );
        Ok(result)
    }

    /// Best effort `failed` status; the caller already reports the error
    async fn record_failure(&self, obj: &mut R, message: String) {
        if let Err(e) = update_status(&*self.store, obj, StatusUpdate::failed(message)).await {
            warn!(error = %e, "Failed to set failed status");
        }
    }
}
