//! # Status Management
//!
//! Updates managed resource status with reconciliation results.

use kube::Resource;
use serde_json::json;
use tracing::debug;

use crate::crd::{ManagedResource, Phase, ResourceTypeStatus, SecretRef};
use crate::observability::metrics;
use crate::store::{ObjectStore, StoreError, StoreObject};

/// Desired status of one reconcile step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub phase: Phase,
    pub message: String,
    pub strategy: Option<String>,
    pub provider: Option<String>,
    pub secret_ref: Option<SecretRef>,
}

impl StatusUpdate {
    pub fn new(phase: Phase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
            strategy: None,
            provider: None,
            secret_ref: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(Phase::Failed, message)
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: &str, provider: &str) -> Self {
        self.strategy = Some(strategy.to_string());
        self.provider = Some(provider.to_string());
        self
    }

    #[must_use]
    pub fn with_secret_ref(mut self, secret_ref: SecretRef) -> Self {
        self.secret_ref = Some(secret_ref);
        self
    }

    /// Whether `current` already reflects this update
    fn is_reflected_in(&self, current: &ResourceTypeStatus) -> bool {
        current.phase == self.phase
            && current.message.as_deref() == Some(self.message.as_str())
            && (self.strategy.is_none() || current.strategy == self.strategy)
            && (self.provider.is_none() || current.provider == self.provider)
            && (self.secret_ref.is_none() || current.secret_ref == self.secret_ref)
    }
}

/// Write `update` to the status subresource of `obj`
///
/// Skips the write when phase, message and the provided fields are already
/// in place, so an unchanged resource does not trigger another watch event.
/// `lastTransitionTime` moves only when the phase changes. On write `obj` is
/// replaced with the stored object. Returns whether a write happened.
pub async fn update_status<S, R>(
    store: &S,
    obj: &mut R,
    update: StatusUpdate,
) -> Result<bool, StoreError>
where
    S: ObjectStore,
    R: ManagedResource + StoreObject,
{
    let current = obj.resource_status().cloned().unwrap_or_default();
    if obj.resource_status().is_some() && update.is_reflected_in(&current) {
        debug!(
            phase = %update.phase,
            "Skipping status update - phase and message unchanged"
        );
        return Ok(false);
    }

    let phase_changed = obj.resource_status().is_none() || current.phase != update.phase;
    let last_transition_time = if phase_changed {
        Some(chrono::Utc::now().to_rfc3339())
    } else {
        current.last_transition_time.clone()
    };

    let status = ResourceTypeStatus {
        phase: update.phase,
        message: Some(update.message),
        strategy: update.strategy.or(current.strategy),
        provider: update.provider.or(current.provider),
        secret_ref: update.secret_ref.or(current.secret_ref),
        last_transition_time,
    };

    let namespace = obj.meta().namespace.clone().unwrap_or_default();
    let name = obj.meta().name.clone().unwrap_or_default();
    let patch = json!({ "status": status });
    *obj = store.patch_status(&namespace, &name, &patch).await?;

    if phase_changed {
        metrics::increment_phase_transitions(R::RESOURCE_TYPE, update.phase.as_str());
    }
    debug!(%namespace, %name, phase = %update.phase, "Updated status");
    Ok(true)
}
