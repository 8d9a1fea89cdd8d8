use kube::Resource;
use serde_json::{json, Value};
use tracing::debug;

use crate::store::{ObjectStore, StoreError, StoreObject};

/// Whether `obj` carries `finalizer`
pub fn has_finalizer<K: Resource>(obj: &K, finalizer: &str) -> bool {
    obj.meta()
        .finalizers
        .as_ref()
        .is_some_and(|finalizers| finalizers.iter().any(|f| f == finalizer))
}

fn finalizer_patch<K: Resource>(obj: &K, finalizers: &[String]) -> Value {
    let mut patch = json!({ "metadata": { "finalizers": finalizers } });
    if let Some(version) = &obj.meta().resource_version {
        patch["metadata"]["resourceVersion"] = Value::String(version.clone());
    }
    patch
}

/// Add `finalizer` to `obj` and persist it, if absent
///
/// On success `obj` is replaced with the stored object. Returns whether a
/// write happened.
pub async fn ensure_finalizer<S, K>(store: &S, obj: &mut K, finalizer: &str) -> Result<bool, StoreError>
where
    S: ObjectStore,
    K: StoreObject,
{
    if has_finalizer(obj, finalizer) {
        return Ok(false);
    }

    let mut finalizers = obj.meta().finalizers.clone().unwrap_or_default();
    finalizers.push(finalizer.to_string());
    let patch = finalizer_patch(obj, &finalizers);

    let namespace = obj.meta().namespace.clone().unwrap_or_default();
    let name = obj.meta().name.clone().unwrap_or_default();
    *obj = store.patch(&namespace, &name, &patch).await?;
    debug!(%namespace, %name, finalizer, "added finalizer");
    Ok(true)
}

/// Remove `finalizer` from `obj` and persist it, if present
///
/// Returns whether a write happened. Once the last finalizer of an object
/// pending deletion is gone the API server drops the object.
pub async fn remove_finalizer<S, K>(store: &S, obj: &mut K, finalizer: &str) -> Result<bool, StoreError>
where
    S: ObjectStore,
    K: StoreObject,
{
    if !has_finalizer(obj, finalizer) {
        return Ok(false);
    }

    let finalizers: Vec<String> = obj
        .meta()
        .finalizers
        .iter()
        .flatten()
        .filter(|f| *f != finalizer)
        .cloned()
        .collect();
    let patch = finalizer_patch(obj, &finalizers);

    let namespace = obj.meta().namespace.clone().unwrap_or_default();
    let name = obj.meta().name.clone().unwrap_or_default();
    *obj = store.patch(&namespace, &name, &patch).await?;
    debug!(%namespace, %name, finalizer, "removed finalizer");
    Ok(true)
}
