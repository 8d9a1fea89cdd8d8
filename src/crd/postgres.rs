//! `Postgres` custom resource.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{ManagedResource, ResourceTypeStatus, SecretRef};

/// Request for a PostgreSQL database
///
/// # Example
///
/// ```yaml
/// apiVersion: integreatly.org/v1alpha1
/// kind: Postgres
/// metadata:
///   name: example-postgres
///   namespace: apps
/// spec:
///   type: managed
///   tier: production
///   secretRef:
///     name: example-postgres-sec
/// ```
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "integreatly.org",
    version = "v1alpha1",
    kind = "Postgres",
    plural = "postgres",
    namespaced,
    status = "ResourceTypeStatus",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Strategy", "type":"string", "jsonPath":".status.strategy"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PostgresSpec {
    /// Deployment type, used as the key into the strategy configuration
    #[serde(rename = "type")]
    pub deployment_type: String,
    /// Tier, selects the strategy within the deployment type
    pub tier: String,
    /// Secret to write connection details into
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretRef>,
}

impl ManagedResource for Postgres {
    const RESOURCE_TYPE: &'static str = "postgres";

    fn deployment_type(&self) -> &str {
        &self.spec.deployment_type
    }

    fn tier(&self) -> &str {
        &self.spec.tier
    }

    fn secret_ref(&self) -> Option<&SecretRef> {
        self.spec.secret_ref.as_ref()
    }

    fn resource_status(&self) -> Option<&ResourceTypeStatus> {
        self.status.as_ref()
    }
}
