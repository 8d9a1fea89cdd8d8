//! # Constants
//!
//! Shared constants used throughout the operator.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

use std::time::Duration;

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Requeue interval after any failed reconcile step
pub const ERROR_RECONCILE_TIME: Duration = Duration::from_secs(30);

/// Requeue interval after a successful reconcile when the provider does not
/// specify its own
pub const SUCCESS_RECONCILE_TIME: Duration = Duration::from_secs(60);

/// Environment variable forcing the reconcile interval (integer seconds)
pub const ENV_FORCE_RECONCILE_TIMEOUT: &str = "ENV_FORCE_RECONCILE_TIMEOUT";

/// Environment variable overriding the organization tag prefix
pub const ENV_TAG_KEY_PREFIX: &str = "TAG_KEY_PREFIX";

/// Organization tag prefix applied to labels on objects the operator writes
pub const DEFAULT_TAG_KEY_PREFIX: &str = "integreatly.org/";

/// Finalizer guarding backing resources of managed custom resources
pub const DEFAULT_FINALIZER: &str = "finalizers.cloud-resources-operator.integreatly.org";

/// Field manager / label value identifying this operator
pub const OPERATOR_NAME: &str = "cloud-resource-operator";

/// Default strategy ConfigMap name
pub const DEFAULT_STRATEGY_CONFIG_MAP_NAME: &str = "cloud-resources-config";

/// Default strategy ConfigMap namespace
pub const DEFAULT_STRATEGY_CONFIG_MAP_NAMESPACE: &str = "cloud-resource-operator";

/// Default ConfigMap holding the Azure cluster configuration
pub const DEFAULT_AZURE_CLUSTER_CONFIG_MAP_NAME: &str = "cloud-provider-config";

/// Default namespace of the Azure cluster configuration ConfigMap
pub const DEFAULT_AZURE_CLUSTER_CONFIG_MAP_NAMESPACE: &str = "openshift-config";

/// Default maximum number of reconciles running at once per resource kind
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: u16 = 10;
