//! In-process object store.
//!
//! Objects are kept as JSON and mutated with RFC 7386 merge patches, which is
//! what the API server does for `Patch::Merge`. Deleting an object that still
//! carries finalizers only stamps `metadata.deletionTimestamp`; the object is
//! dropped once a later patch empties its finalizer list.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use kube::Resource;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, PoisonError};

use super::{same_content, ObjectStore, OperationResult, StoreError, StoreObject};

type ObjectId = (String, String, String);

#[derive(Debug, Default)]
struct Inner {
    objects: BTreeMap<ObjectId, Value>,
    failing_kinds: BTreeSet<String>,
    writes: BTreeMap<String, usize>,
    next_version: u64,
}

impl Inner {
    fn bump_version(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }

    fn record_write(&mut self, kind: &str) {
        *self.writes.entry(kind.to_string()).or_default() += 1;
    }

    fn check_injected(&self, kind: &str, namespace: &str, name: &str) -> Result<(), StoreError> {
        if self.failing_kinds.contains(kind) {
            return Err(StoreError::Injected {
                kind: kind.to_string(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        }
        Ok(())
    }
}

/// Object store holding everything in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

fn kind_key<K: StoreObject>() -> String {
    format!("{}/{}", K::api_version(&()), K::kind(&()))
}

fn object_id<K: StoreObject>(namespace: &str, name: &str) -> ObjectId {
    (kind_key::<K>(), namespace.to_string(), name.to_string())
}

fn not_found<K: StoreObject>(namespace: &str, name: &str) -> StoreError {
    StoreError::NotFound {
        kind: K::kind(&()).to_string(),
        namespace: namespace.to_string(),
        name: name.to_string(),
    }
}

/// RFC 7386 JSON merge patch
pub(crate) fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target) = target {
        for (key, value) in patch {
            if value.is_null() {
                target.remove(key);
            } else {
                merge_patch(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

fn is_collectable(obj: &Value) -> bool {
    let deleting = obj
        .pointer("/metadata/deletionTimestamp")
        .is_some_and(|ts| !ts.is_null());
    let has_finalizers = obj
        .pointer("/metadata/finalizers")
        .and_then(Value::as_array)
        .is_some_and(|f| !f.is_empty());
    deleting && !has_finalizers
}

fn set_metadata(obj: &mut Value, field: &str, value: Value) {
    merge_patch(obj, &serde_json::json!({ "metadata": { field: value } }));
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed an object, bypassing failure injection
    ///
    /// Returns the stored copy with a fresh `resourceVersion`.
    pub fn insert<K: StoreObject>(&self, obj: K) -> Result<K, StoreError> {
        let mut value = serde_json::to_value(&obj)?;
        let namespace = obj.meta().namespace.clone().unwrap_or_default();
        let name = obj.meta().name.clone().unwrap_or_default();
        let mut inner = self.lock();
        let version = inner.bump_version();
        set_metadata(&mut value, "resourceVersion", Value::String(version));
        if value.pointer("/metadata/creationTimestamp").is_none() {
            set_metadata(
                &mut value,
                "creationTimestamp",
                Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
            );
        }
        let stored = serde_json::from_value(value.clone())?;
        inner
            .objects
            .insert(object_id::<K>(&namespace, &name), value);
        Ok(stored)
    }

    /// Make every write of kind `K` fail with [`StoreError::Injected`]
    pub fn fail_writes<K: StoreObject>(&self) {
        self.lock().failing_kinds.insert(kind_key::<K>());
    }

    /// Stop injecting failures for kind `K`
    pub fn restore_writes<K: StoreObject>(&self) {
        self.lock().failing_kinds.remove(&kind_key::<K>());
    }

    /// All objects of kind `K` in a namespace
    pub fn list<K: StoreObject>(&self, namespace: &str) -> Result<Vec<K>, StoreError> {
        let kind = kind_key::<K>();
        self.lock()
            .objects
            .iter()
            .filter(|((k, ns, _), _)| *k == kind && ns == namespace)
            .map(|(_, value)| serde_json::from_value(value.clone()).map_err(StoreError::from))
            .collect()
    }

    /// Whether an object of kind `K` exists
    pub fn contains<K: StoreObject>(&self, namespace: &str, name: &str) -> bool {
        self.lock()
            .objects
            .contains_key(&object_id::<K>(namespace, name))
    }

    /// Number of successful writes that changed an object of kind `K`
    pub fn write_count<K: StoreObject>(&self) -> usize {
        self.lock()
            .writes
            .get(&kind_key::<K>())
            .copied()
            .unwrap_or_default()
    }

    fn apply_patch<K: StoreObject>(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
        status_only: bool,
    ) -> Result<K, StoreError> {
        let kind = kind_key::<K>();
        let id = object_id::<K>(namespace, name);
        let mut inner = self.lock();
        inner.check_injected(&kind, namespace, name)?;

        let version = inner.bump_version();
        let current = inner
            .objects
            .get_mut(&id)
            .ok_or_else(|| not_found::<K>(namespace, name))?;

        if let Some(expected) = patch
            .pointer("/metadata/resourceVersion")
            .and_then(Value::as_str)
        {
            let actual = current
                .pointer("/metadata/resourceVersion")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if expected != actual {
                return Err(StoreError::Conflict {
                    kind: K::kind(&()).to_string(),
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                    message: format!("resourceVersion {expected} does not match {actual}"),
                });
            }
        }

        let mut effective = if status_only {
            serde_json::json!({ "status": patch.get("status").cloned().unwrap_or(Value::Null) })
        } else {
            let mut p = patch.clone();
            if let Some(map) = p.as_object_mut() {
                map.remove("status");
            }
            p
        };
        if let Some(meta) = effective
            .get_mut("metadata")
            .and_then(Value::as_object_mut)
        {
            meta.remove("resourceVersion");
        }

        merge_patch(current, &effective);
        set_metadata(current, "resourceVersion", Value::String(version));
        effective = current.clone();

        if is_collectable(&effective) {
            inner.objects.remove(&id);
        }
        inner.record_write(&kind);
        Ok(serde_json::from_value(effective)?)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get<K: StoreObject>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<K>, StoreError> {
        self.lock()
            .objects
            .get(&object_id::<K>(namespace, name))
            .map(|value| serde_json::from_value(value.clone()))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn patch<K: StoreObject>(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<K, StoreError> {
        self.apply_patch(namespace, name, patch, false)
    }

    async fn patch_status<K: StoreObject>(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<K, StoreError> {
        self.apply_patch(namespace, name, patch, true)
    }

    async fn create_or_update<K: StoreObject>(
        &self,
        obj: &K,
    ) -> Result<OperationResult, StoreError> {
        let kind = kind_key::<K>();
        let namespace = obj.meta().namespace.clone().unwrap_or_default();
        let name = obj.meta().name.clone().unwrap_or_default();
        let id = object_id::<K>(&namespace, &name);
        let mut desired = serde_json::to_value(obj)?;

        let mut inner = self.lock();
        inner.check_injected(&kind, &namespace, &name)?;

        if let Some(existing) = inner.objects.get(&id) {
            if same_content(existing, &desired) {
                return Ok(OperationResult::Unchanged);
            }
            for field in ["uid", "creationTimestamp", "finalizers", "deletionTimestamp"] {
                if let Some(value) = existing.pointer(&format!("/metadata/{field}")) {
                    set_metadata(&mut desired, field, value.clone());
                }
            }
            if let Some(status) = existing.get("status") {
                merge_patch(&mut desired, &serde_json::json!({ "status": status }));
            }
        }

        let result = if inner.objects.contains_key(&id) {
            OperationResult::Updated
        } else {
            OperationResult::Created
        };
        let version = inner.bump_version();
        set_metadata(&mut desired, "resourceVersion", Value::String(version));
        inner.objects.insert(id, desired);
        inner.record_write(&kind);
        Ok(result)
    }

    async fn delete<K: StoreObject>(&self, namespace: &str, name: &str) -> Result<bool, StoreError> {
        let kind = kind_key::<K>();
        let id = object_id::<K>(namespace, name);
        let mut inner = self.lock();
        inner.check_injected(&kind, namespace, name)?;

        let version = inner.bump_version();
        let Some(current) = inner.objects.get_mut(&id) else {
            return Ok(false);
        };
        let has_finalizers = current
            .pointer("/metadata/finalizers")
            .and_then(Value::as_array)
            .is_some_and(|f| !f.is_empty());
        if has_finalizers {
            if current.pointer("/metadata/deletionTimestamp").is_none() {
                set_metadata(
                    current,
                    "deletionTimestamp",
                    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
                );
                set_metadata(current, "resourceVersion", Value::String(version));
            }
        } else {
            inner.objects.remove(&id);
        }
        inner.record_write(&kind);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::api::ObjectMeta;
    use serde_json::json;

    fn config_map(name: &str, finalizers: Option<Vec<String>>) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                finalizers,
                ..ObjectMeta::default()
            },
            data: Some([("k".to_string(), "v".to_string())].into()),
            ..ConfigMap::default()
        }
    }

    #[test]
    fn test_merge_patch_replaces_removes_and_nests() {
        let mut target = json!({"a": {"b": 1, "c": 2}, "d": [1, 2]});
        merge_patch(&mut target, &json!({"a": {"b": null, "e": 3}, "d": [3]}));
        assert_eq!(target, json!({"a": {"c": 2, "e": 3}, "d": [3]}));
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let store = MemoryStore::new();
        let found: Option<ConfigMap> = store.get("default", "absent").await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_patch_bumps_resource_version_and_rejects_stale_writes() {
        let store = MemoryStore::new();
        let stored = store.insert(config_map("cm", None)).unwrap();
        let stale = stored.metadata.resource_version.clone().unwrap();

        let patched: ConfigMap = store
            .patch("default", "cm", &json!({"data": {"k": "w"}}))
            .await
            .unwrap();
        assert_ne!(patched.metadata.resource_version.as_deref(), Some(stale.as_str()));
        assert_eq!(patched.data.unwrap()["k"], "w");

        let err = store
            .patch::<ConfigMap>(
                "default",
                "cm",
                &json!({"metadata": {"resourceVersion": stale}, "data": {"k": "x"}}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_delete_waits_for_finalizers() {
        let store = MemoryStore::new();
        store
            .insert(config_map("cm", Some(vec!["example.org/cleanup".to_string()])))
            .unwrap();

        assert!(store.delete::<ConfigMap>("default", "cm").await.unwrap());
        let pending: ConfigMap = store.get("default", "cm").await.unwrap().unwrap();
        assert!(pending.metadata.deletion_timestamp.is_some());

        store
            .patch::<ConfigMap>("default", "cm", &json!({"metadata": {"finalizers": []}}))
            .await
            .unwrap();
        assert!(!store.contains::<ConfigMap>("default", "cm"));
        assert!(!store.delete::<ConfigMap>("default", "cm").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_or_update_reports_changes() {
        let store = MemoryStore::new();
        let cm = config_map("cm", None);
        assert_eq!(
            store.create_or_update(&cm).await.unwrap(),
            OperationResult::Created
        );
        assert_eq!(
            store.create_or_update(&cm).await.unwrap(),
            OperationResult::Unchanged
        );
        let mut changed = cm.clone();
        changed.data = Some([("k".to_string(), "other".to_string())].into());
        assert_eq!(
            store.create_or_update(&changed).await.unwrap(),
            OperationResult::Updated
        );
        assert_eq!(store.write_count::<ConfigMap>(), 2);
        assert_eq!(store.list::<ConfigMap>("default").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_injected_failures_apply_to_writes_only() {
        let store = MemoryStore::new();
        store.insert(config_map("cm", None)).unwrap();
        store.fail_writes::<ConfigMap>();

        let err = store
            .create_or_update(&config_map("other", None))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Injected { .. }));
        assert!(store
            .get::<ConfigMap>("default", "cm")
            .await
            .unwrap()
            .is_some());

        store.restore_writes::<ConfigMap>();
        assert!(store.create_or_update(&config_map("other", None)).await.is_ok());
    }
}
