//! Azure cluster configuration.
//!
//! The cluster's cloud provider ConfigMap holds a JSON document under the
//! `config` key with the service principal and network layout of the cluster.

use k8s_openapi::api::core::v1::ConfigMap;
use serde::Deserialize;
use std::sync::Arc;

use super::auth::AzureCredentials;
use crate::config::ControllerConfig;
use crate::provider::ProviderError;
use crate::store::ObjectStore;

const CONFIG_KEY: &str = "config";

/// Service principal and network layout of the cluster
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AzureClusterConfig {
    pub tenant_id: String,
    pub aad_client_id: String,
    pub aad_client_secret: String,
    pub subscription_id: String,
    pub location: String,
    pub resource_group: String,
    pub vnet_name: String,
    pub subnet_name: String,
    pub vnet_resource_group: String,
    pub security_group_name: String,
}

impl std::fmt::Debug for AzureClusterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureClusterConfig")
            .field("tenant_id", &self.tenant_id)
            .field("aad_client_id", &self.aad_client_id)
            .field("aad_client_secret", &"<redacted>")
            .field("subscription_id", &self.subscription_id)
            .field("location", &self.location)
            .field("resource_group", &self.resource_group)
            .field("vnet_name", &self.vnet_name)
            .field("subnet_name", &self.subnet_name)
            .field("vnet_resource_group", &self.vnet_resource_group)
            .finish_non_exhaustive()
    }
}

impl AzureClusterConfig {
    /// Parse and validate the `config` entry of the cluster ConfigMap
    pub fn from_config_map(config_map: &ConfigMap) -> Result<Self, ProviderError> {
        let raw = config_map
            .data
            .as_ref()
            .and_then(|data| data.get(CONFIG_KEY))
            .ok_or_else(|| {
                ProviderError::Configuration(format!(
                    "azure cluster config map has no {CONFIG_KEY} entry"
                ))
            })?;
        let mut config: Self = serde_json::from_str(raw).map_err(|e| {
            ProviderError::Configuration(format!("failed to parse azure cluster config: {e}"))
        })?;
        if config.vnet_resource_group.is_empty() {
            config.vnet_resource_group.clone_from(&config.resource_group);
        }
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ProviderError> {
        let missing: Vec<&str> = [
            ("tenantId", &self.tenant_id),
            ("aadClientId", &self.aad_client_id),
            ("aadClientSecret", &self.aad_client_secret),
            ("subscriptionId", &self.subscription_id),
            ("location", &self.location),
            ("resourceGroup", &self.resource_group),
            ("vnetName", &self.vnet_name),
            ("subnetName", &self.subnet_name),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.is_empty().then_some(field))
        .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ProviderError::Configuration(format!(
                "azure cluster config is missing: {}",
                missing.join(", ")
            )))
        }
    }

    #[must_use]
    pub fn credentials(&self) -> AzureCredentials {
        AzureCredentials {
            tenant_id: self.tenant_id.clone(),
            client_id: self.aad_client_id.clone(),
            client_secret: self.aad_client_secret.clone(),
            subscription_id: self.subscription_id.clone(),
        }
    }
}

/// Loads the cluster configuration on every provisioning pass
pub struct ClusterConfigSource<S> {
    store: Arc<S>,
    name: String,
    namespace: String,
}

impl<S> std::fmt::Debug for ClusterConfigSource<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterConfigSource")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl<S: ObjectStore> ClusterConfigSource<S> {
    pub fn new(store: Arc<S>, name: &str, namespace: &str) -> Self {
        Self {
            store,
            name: name.to_string(),
            namespace: namespace.to_string(),
        }
    }

    pub fn from_config(store: Arc<S>, config: &ControllerConfig) -> Self {
        Self::new(
            store,
            &config.azure_cluster_config_map_name,
            &config.azure_cluster_config_map_namespace,
        )
    }

    pub async fn load(&self) -> Result<AzureClusterConfig, ProviderError> {
        let config_map = self
            .store
            .get::<ConfigMap>(&self.namespace, &self.name)
            .await?
            .ok_or_else(|| {
                ProviderError::Configuration(format!(
                    "azure cluster config map {}/{} not found",
                    self.namespace, self.name
                ))
            })?;
        AzureClusterConfig::from_config_map(&config_map)
    }
}
