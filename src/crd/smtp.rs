//! `SmtpCredentialSet` custom resource.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{ManagedResource, ResourceTypeStatus, SecretRef};

/// Request for a set of SMTP credentials
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "integreatly.org",
    version = "v1alpha1",
    kind = "SmtpCredentialSet",
    namespaced,
    status = "ResourceTypeStatus",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SmtpCredentialSetSpec {
    #[serde(rename = "type")]
    pub deployment_type: String,
    pub tier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretRef>,
}

impl ManagedResource for SmtpCredentialSet {
    const RESOURCE_TYPE: &'static str = "smtpcredentials";

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
