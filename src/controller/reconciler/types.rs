//! # Reconciler Types
//!
//! Core types for the reconciler.

use kube::Resource;
use kube_runtime::controller::Action;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::constants::{DEFAULT_FINALIZER, ERROR_RECONCILE_TIME};
use crate::provider::{Provider, ProviderError};
use crate::store::StoreError;
use crate::strategy::ConfigManager;

/// Namespace and name of the object to reconcile
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn from_resource<K: Resource>(obj: &K) -> Self {
        Self {
            namespace: obj.meta().namespace.clone().unwrap_or_default(),
            name: obj.meta().name.clone().unwrap_or_default(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Requeue decision of one reconcile pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub requeue: bool,
    pub requeue_after: Duration,
}

impl ReconcileOutcome {
    /// Nothing left to do until the object changes
    #[must_use]
    pub fn done() -> Self {
        Self {
            requeue: false,
            requeue_after: Duration::ZERO,
        }
    }

    /// Requeue after `after`
    #[must_use]
    pub fn after(after: Duration) -> Self {
        Self {
            requeue: true,
            requeue_after: after,
        }
    }

    /// Requeue after the error interval
    #[must_use]
    pub fn retry() -> Self {
        Self::after(ERROR_RECONCILE_TIME)
    }
}

impl From<ReconcileOutcome> for Action {
    fn from(outcome: ReconcileOutcome) -> Self {
        if outcome.requeue {
            Action::requeue(outcome.requeue_after)
        } else {
            Action::await_change()
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("failed to read {context}: {source}")]
    Store {
        context: String,
        #[source]
        source: StoreError,
    },

    #[error("provider {provider} failed: {source}")]
    Provider {
        provider: String,
        #[source]
        source: ProviderError,
    },

    #[error("failed to persist {context}: {source}")]
    Persistence {
        context: String,
        #[source]
        source: StoreError,
    },

    #[error("reconciliation cancelled")]
    Cancelled,
}

impl ReconcilerError {
    /// Short reason used as a metric label
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcilerError::Store { .. } => "store",
            ReconcilerError::Provider { .. } => "provider",
            ReconcilerError::Persistence { .. } => "persistence",
            ReconcilerError::Cancelled => "cancelled",
        }
    }
}

/// Reconciler for one managed resource kind `R` backed by store `S`
pub struct Reconciler<R, S> {
    pub(crate) store: Arc<S>,
    pub(crate) config_manager: Arc<dyn ConfigManager>,
    pub(crate) providers: Vec<Arc<dyn Provider<R>>>,
    pub(crate) finalizer: String,
}

impl<R, S> Reconciler<R, S> {
    /// Create a reconciler; `providers` are consulted in order
    pub fn new(
        store: Arc<S>,
        config_manager: Arc<dyn ConfigManager>,
        providers: Vec<Arc<dyn Provider<R>>>,
    ) -> Self {
        Self {
            store,
            config_manager,
            providers,
            finalizer: DEFAULT_FINALIZER.to_string(),
        }
    }

    #[must_use]
    pub fn with_finalizer(mut self, finalizer: impl Into<String>) -> Self {
        self.finalizer = finalizer.into();
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn finalizer(&self) -> &str {
        &self.finalizer
    }
}

impl<R: Send + Sync, S> fmt::Debug for Reconciler<R, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field(
                "providers",
                &self.providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("finalizer", &self.finalizer)
            .finish_non_exhaustive()
    }
}
