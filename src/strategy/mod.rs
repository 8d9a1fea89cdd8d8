//! # Strategy Configuration
//!
//! Resolves which strategy backs a resource request.
//!
//! Strategies live in a ConfigMap. Each data key is a deployment type (the
//! `spec.type` of a request) and each value is a JSON object keyed by tier:
//!
//! ```json
//! {
//!   "development": "openshift",
//!   "production": { "strategy": "azure", "parameters": { "skuName": "GP_Gen5_2" } }
//! }
//! ```
//!
//! The shorthand form names the strategy only. The full form also carries
//! provider parameters, which are passed through without interpretation.
//! A missing ConfigMap reads as an empty configuration.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::config::ControllerConfig;
use crate::constants::{DEFAULT_STRATEGY_CONFIG_MAP_NAME, DEFAULT_STRATEGY_CONFIG_MAP_NAMESPACE};
use crate::store::{ObjectStore, StoreError};

/// Strategy selected for one tier
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyConfig {
    pub tier: String,
    pub strategy_name: String,
    /// Provider specific parameters, `Value::Null` when none are configured
    pub raw_parameters: Value,
}

/// Tier name to strategy for a single deployment type
pub type StrategyMapping = BTreeMap<String, StrategyConfig>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read strategy config map {namespace}/{name}: {source}")]
    Store {
        namespace: String,
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to parse strategy mapping for resource type {resource_type}: {source}")]
    Parse {
        resource_type: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("strategy for resource type {resource_type} and tier {tier} is not defined")]
    StrategyNotDefined { resource_type: String, tier: String },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TierEntry {
    Name(String),
    Full {
        strategy: String,
        #[serde(default)]
        parameters: Value,
    },
}

/// Parse one ConfigMap value into a strategy mapping
pub fn parse_strategy_mapping(resource_type: &str, raw: &str) -> Result<StrategyMapping, ConfigError> {
    if raw.trim().is_empty() {
        return Ok(StrategyMapping::new());
    }
    let entries: BTreeMap<String, TierEntry> =
        serde_json::from_str(raw).map_err(|source| ConfigError::Parse {
            resource_type: resource_type.to_string(),
            source,
        })?;

    Ok(entries
        .into_iter()
        .map(|(tier, entry)| {
            let (strategy_name, raw_parameters) = match entry {
                TierEntry::Name(name) => (name, Value::Null),
                TierEntry::Full {
                    strategy,
                    parameters,
                } => (strategy, parameters),
            };
            let config = StrategyConfig {
                tier: tier.clone(),
                strategy_name,
                raw_parameters,
            };
            (tier, config)
        })
        .collect())
}

/// Source of strategy mappings
#[async_trait]
pub trait ConfigManager: Send + Sync {
    /// All tier strategies declared for a deployment type
    async fn get_strategy_mapping(&self, resource_type: &str)
        -> Result<StrategyMapping, ConfigError>;

    /// Strategy for one tier of a deployment type
    async fn read_strategy(
        &self,
        resource_type: &str,
        tier: &str,
    ) -> Result<StrategyConfig, ConfigError> {
        self.get_strategy_mapping(resource_type)
            .await?
            .remove(tier)
            .ok_or_else(|| ConfigError::StrategyNotDefined {
                resource_type: resource_type.to_string(),
                tier: tier.to_string(),
            })
    }
}

/// Reads strategy mappings from a ConfigMap on every call
pub struct ConfigMapConfigManager<S> {
    store: Arc<S>,
    name: String,
    namespace: String,
}

impl<S> std::fmt::Debug for ConfigMapConfigManager<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigMapConfigManager")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl<S: ObjectStore> ConfigMapConfigManager<S> {
    /// Empty name or namespace select the defaults
    pub fn new(store: Arc<S>, name: &str, namespace: &str) -> Self {
        let name = if name.is_empty() {
            DEFAULT_STRATEGY_CONFIG_MAP_NAME
        } else {
            name
        };
        let namespace = if namespace.is_empty() {
            DEFAULT_STRATEGY_CONFIG_MAP_NAMESPACE
        } else {
            namespace
        };
        Self {
            store,
            name: name.to_string(),
            namespace: namespace.to_string(),
        }
    }

    pub fn from_config(store: Arc<S>, config: &ControllerConfig) -> Self {
        Self::new(
            store,
            &config.strategy_config_map_name,
            &config.strategy_config_map_namespace,
        )
    }

    async fn read_config_map(&self) -> Result<ConfigMap, ConfigError> {
        let found = self
            .store
            .get::<ConfigMap>(&self.namespace, &self.name)
            .await
            .map_err(|source| ConfigError::Store {
                namespace: self.namespace.clone(),
                name: self.name.clone(),
                source,
            })?;
        Ok(found.unwrap_or_else(|| {
            debug!(
                name = %self.name,
                namespace = %self.namespace,
                "strategy config map not found, using empty configuration"
            );
            ConfigMap::default()
        }))
    }
}

#[async_trait]
impl<S: ObjectStore> ConfigManager for ConfigMapConfigManager<S> {
    async fn get_strategy_mapping(
        &self,
        resource_type: &str,
    ) -> Result<StrategyMapping, ConfigError> {
        let config_map = self.read_config_map().await?;
        let raw = config_map
            .data
            .as_ref()
            .and_then(|data| data.get(resource_type))
            .map(String::as_str)
            .unwrap_or_default();
        parse_strategy_mapping(resource_type, raw)
    }
}
