//! Common view over every managed resource kind.

use kube::ResourceExt;

use super::{ResourceTypeStatus, SecretRef};

/// A namespaced custom resource asking the operator for a backing resource
///
/// The reconciler, the strategy lookup and the providers only see a request
/// through this trait, so one reconcile loop serves every kind.
pub trait ManagedResource: kube::Resource + Sized + Send + Sync {
    /// Resource type key used in metrics, logs and generated names
    const RESOURCE_TYPE: &'static str;

    /// Declared `spec.type`, the strategy configuration key
    fn deployment_type(&self) -> &str;

    /// Declared `spec.tier`
    fn tier(&self) -> &str;

    /// Declared `spec.secretRef`, if any
    fn secret_ref(&self) -> Option<&SecretRef>;

    /// Current status, if any has been written
    fn resource_status(&self) -> Option<&ResourceTypeStatus>;

    /// Whether the object is pending deletion
    fn is_being_deleted(&self) -> bool {
        self.meta().deletion_timestamp.is_some()
    }

    /// Secret that receives connection details
    ///
    /// Falls back to `<name>-connection` in the object's namespace.
    fn target_secret(&self) -> SecretRef {
        let namespace = self.namespace().unwrap_or_default();
        match self.secret_ref() {
            Some(secret_ref) if !secret_ref.name.is_empty() => secret_ref.resolve(&namespace),
            _ => SecretRef {
                name: format!("{}-connection", self.name_any()),
                namespace: Some(namespace),
            },
        }
    }
}
