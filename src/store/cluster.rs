//! `kube::Api` backed object store.

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde_json::Value;
use std::fmt;
use tracing::debug;

use super::{same_content, ObjectStore, OperationResult, StoreError, StoreObject};
use crate::constants::OPERATOR_NAME;

/// Object store talking to the Kubernetes API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl KubeStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Underlying client, for the watch loop
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn api<K: StoreObject>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn patch_params() -> PatchParams {
    PatchParams {
        field_manager: Some(OPERATOR_NAME.to_string()),
        ..PatchParams::default()
    }
}

fn post_params() -> PostParams {
    PostParams {
        field_manager: Some(OPERATOR_NAME.to_string()),
        ..PostParams::default()
    }
}

fn map_api_error<K: StoreObject>(err: kube::Error, namespace: &str, name: &str) -> StoreError {
    match err {
        kube::Error::Api(api_err) if api_err.code == 404 => StoreError::NotFound {
            kind: K::kind(&()).to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        },
        kube::Error::Api(api_err) if api_err.code == 409 => StoreError::Conflict {
            kind: K::kind(&()).to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            message: api_err.message,
        },
        other => StoreError::Api(other),
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get<K: StoreObject>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<K>, StoreError> {
        Ok(self.api::<K>(namespace).get_opt(name).await?)
    }

    async fn patch<K: StoreObject>(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<K, StoreError> {
        self.api::<K>(namespace)
            .patch(name, &patch_params(), &Patch::Merge(patch))
            .await
            .map_err(|e| map_api_error::<K>(e, namespace, name))
    }

    async fn patch_status<K: StoreObject>(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<K, StoreError> {
        self.api::<K>(namespace)
            .patch_status(name, &patch_params(), &Patch::Merge(patch))
            .await
            .map_err(|e| map_api_error::<K>(e, namespace, name))
    }

    async fn create_or_update<K: StoreObject>(
        &self,
        obj: &K,
    ) -> Result<OperationResult, StoreError> {
        let namespace = obj.namespace().unwrap_or_default();
        let name = obj.name_any();
        let api = self.api::<K>(&namespace);

        let Some(existing) = api.get_opt(&name).await? else {
            api.create(&post_params(), obj)
                .await
                .map_err(|e| map_api_error::<K>(e, &namespace, &name))?;
            debug!(kind = %K::kind(&()), %namespace, %name, "created object");
            return Ok(OperationResult::Created);
        };

        if same_content(&serde_json::to_value(&existing)?, &serde_json::to_value(obj)?) {
            return Ok(OperationResult::Unchanged);
        }

        let mut desired = obj.clone();
        desired.meta_mut().resource_version = existing.meta().resource_version.clone();
        api.replace(&name, &post_params(), &desired)
            .await
            .map_err(|e| map_api_error::<K>(e, &namespace, &name))?;
        debug!(kind = %K::kind(&()), %namespace, %name, "updated object");
        Ok(OperationResult::Updated)
    }

    async fn delete<K: StoreObject>(&self, namespace: &str, name: &str) -> Result<bool, StoreError> {
        match self
            .api::<K>(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => Ok(false),
            Err(e) => Err(map_api_error::<K>(e, namespace, name)),
        }
    }
}
