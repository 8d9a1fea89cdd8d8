//! # Controller Configuration
//!
//! Operator-level settings loaded from environment variables.

use crate::constants::{
    DEFAULT_AZURE_CLUSTER_CONFIG_MAP_NAME, DEFAULT_AZURE_CLUSTER_CONFIG_MAP_NAMESPACE,
    DEFAULT_MAX_CONCURRENT_RECONCILIATIONS, DEFAULT_METRICS_PORT,
    DEFAULT_STRATEGY_CONFIG_MAP_NAME, DEFAULT_STRATEGY_CONFIG_MAP_NAMESPACE,
};

/// Operator-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
///
/// The forced reconcile interval and the organization tag prefix are deliberately
/// not part of this struct: they are read on every use, see [`crate::resources`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Port of the metrics and probe HTTP server
    pub metrics_port: u16,
    /// Name of the ConfigMap holding strategy mappings
    pub strategy_config_map_name: String,
    /// Namespace of the ConfigMap holding strategy mappings
    pub strategy_config_map_namespace: String,
    /// Name of the ConfigMap holding Azure cluster configuration
    pub azure_cluster_config_map_name: String,
    /// Namespace of the ConfigMap holding Azure cluster configuration
    pub azure_cluster_config_map_namespace: String,
    /// Maximum concurrent reconciliations per resource kind
    pub max_concurrent_reconciliations: u16,
    /// Default log filter used when `RUST_LOG` is not set
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            metrics_port: DEFAULT_METRICS_PORT,
            strategy_config_map_name: DEFAULT_STRATEGY_CONFIG_MAP_NAME.to_string(),
            strategy_config_map_namespace: DEFAULT_STRATEGY_CONFIG_MAP_NAMESPACE.to_string(),
            azure_cluster_config_map_name: DEFAULT_AZURE_CLUSTER_CONFIG_MAP_NAME.to_string(),
            azure_cluster_config_map_namespace: DEFAULT_AZURE_CLUSTER_CONFIG_MAP_NAMESPACE
                .to_string(),
            max_concurrent_reconciliations: DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            log_level: "info".to_string(),
            log_format: "json".to_string(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    ///
    /// Unset or unparseable values fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            metrics_port: parsed_or(&lookup, "METRICS_PORT", defaults.metrics_port),
            strategy_config_map_name: string_or(
                &lookup,
                "STRATEGY_CONFIG_MAP_NAME",
                defaults.strategy_config_map_name,
            ),
            strategy_config_map_namespace: string_or(
                &lookup,
                "STRATEGY_CONFIG_MAP_NAMESPACE",
                defaults.strategy_config_map_namespace,
            ),
            azure_cluster_config_map_name: string_or(
                &lookup,
                "AZURE_CLUSTER_CONFIG_MAP_NAME",
                defaults.azure_cluster_config_map_name,
            ),
            azure_cluster_config_map_namespace: string_or(
                &lookup,
                "AZURE_CLUSTER_CONFIG_MAP_NAMESPACE",
                defaults.azure_cluster_config_map_namespace,
            ),
            max_concurrent_reconciliations: parsed_or(
                &lookup,
                "MAX_CONCURRENT_RECONCILIATIONS",
                defaults.max_concurrent_reconciliations,
            ),
            log_level: string_or(&lookup, "LOG_LEVEL", defaults.log_level),
            log_format: string_or(&lookup, "LOG_FORMAT", defaults.log_format),
        }
    }

    /// Whether logs should be emitted as JSON lines
    #[must_use]
    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

fn parsed_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn string_or<F>(lookup: &F, key: &str, default: String) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|v| !v.is_empty()).unwrap_or(default)
}
