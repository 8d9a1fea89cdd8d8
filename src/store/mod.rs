//! # Object Store
//!
//! Narrow access layer over namespaced Kubernetes objects.
//!
//! The reconciler, the strategy lookup and the providers never talk to
//! `kube::Api` directly. They go through [`ObjectStore`], which has two
//! implementations:
//!
//! - [`KubeStore`] - backed by the cluster API server
//! - [`MemoryStore`] - in-process store with merge-patch semantics, used in tests

mod cluster;
mod memory;

pub use cluster::KubeStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Debug;
use thiserror::Error;

/// Any namespaced Kubernetes object the store can handle
pub trait StoreObject:
    ::kube::Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<T> StoreObject for T where
    T: ::kube::Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Result of a create-or-update call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    Created,
    Updated,
    Unchanged,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },

    #[error("conflict writing {kind} {namespace}/{name}: {message}")]
    Conflict {
        kind: String,
        namespace: String,
        name: String,
        message: String,
    },

    #[error("kubernetes api error: {0}")]
    Api(#[from] ::kube::Error),

    #[error("failed to (de)serialize object: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("injected failure writing {kind} {namespace}/{name}")]
    Injected {
        kind: String,
        namespace: String,
        name: String,
    },
}

/// Namespaced object access used by every layer of the operator
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Fetch an object; `Ok(None)` when it does not exist
    async fn get<K: StoreObject>(&self, namespace: &str, name: &str)
        -> Result<Option<K>, StoreError>;

    /// Apply a JSON merge patch to the object (status subresource excluded)
    async fn patch<K: StoreObject>(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<K, StoreError>;

    /// Apply a JSON merge patch to the status subresource
    async fn patch_status<K: StoreObject>(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<K, StoreError>;

    /// Create the object, or replace its content when it already exists
    async fn create_or_update<K: StoreObject>(&self, obj: &K)
        -> Result<OperationResult, StoreError>;

    /// Delete an object; `Ok(false)` when it was already absent
    async fn delete<K: StoreObject>(&self, namespace: &str, name: &str)
        -> Result<bool, StoreError>;
}

/// Top level fields whose keys belong entirely to the writer
const EXACT_FIELDS: [&str; 2] = ["data", "stringData"];

/// Whether `existing` already carries everything `desired` asks for
///
/// Fields the API server defaults or fills in are ignored, so a stored
/// Deployment or Service matches the object it was created from. `status` is
/// ignored and of `metadata` only labels and annotations count. `data` and
/// `stringData` must match exactly so removed keys are noticed.
pub(crate) fn same_content(existing: &Value, desired: &Value) -> bool {
    let Some(desired) = desired.as_object() else {
        return existing == desired;
    };
    desired.iter().all(|(field, wanted)| {
        let found = existing.get(field).unwrap_or(&Value::Null);
        match field.as_str() {
            "status" => true,
            "metadata" => ["labels", "annotations"].iter().all(|key| {
                contains(
                    found.get(key).unwrap_or(&Value::Null),
                    wanted.get(key).unwrap_or(&Value::Null),
                )
            }),
            f if EXACT_FIELDS.contains(&f) => found == wanted,
            _ => contains(found, wanted),
        }
    })
}

/// Recursive subset check; arrays must keep their length and order
fn contains(existing: &Value, desired: &Value) -> bool {
    match (existing, desired) {
        (_, Value::Null) => true,
        (Value::Null, Value::Object(wanted)) => wanted.is_empty(),
        (Value::Null, Value::Array(wanted)) => wanted.is_empty(),
        (Value::Object(found), Value::Object(wanted)) => wanted
            .iter()
            .all(|(key, value)| contains(found.get(key).unwrap_or(&Value::Null), value)),
        (Value::Array(found), Value::Array(wanted)) => {
            found.len() == wanted.len() && found.iter().zip(wanted).all(|(f, w)| contains(f, w))
        }
        _ => existing == desired,
    }
}
