//! Status types shared by all managed resource kinds.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::SecretRef;

/// Lifecycle phase reported in `status.phase`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Pending,
    #[serde(rename = "in progress")]
    InProgress,
    Complete,
    Failed,
}

impl Phase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Pending => "pending",
            Phase::InProgress => "in progress",
            Phase::Complete => "complete",
            Phase::Failed => "failed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observed state of a managed resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTypeStatus {
    #[serde(default)]
    pub phase: Phase,
    /// Human readable description of the last reconcile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Strategy the resource was resolved to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    /// Provider that handled the resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Secret holding the connection details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretRef>,
    /// RFC3339 timestamp of the last phase change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}
