//! Shared spec types for managed resource requests.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to the Secret that receives connection details
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretRef {
    /// Secret name
    pub name: String,
    /// Secret namespace, defaults to the namespace of the owning resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl SecretRef {
    /// Resolve this reference against the namespace of the owning object
    #[must_use]
    pub fn resolve(&self, owner_namespace: &str) -> SecretRef {
        SecretRef {
            name: self.name.clone(),
            namespace: Some(
                self.namespace
                    .clone()
                    .filter(|ns| !ns.is_empty())
                    .unwrap_or_else(|| owner_namespace.to_string()),
            ),
        }
    }
}
