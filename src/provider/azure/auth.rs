//! Azure AD service principal credentials.

use azure_core::credentials::{Secret, TokenCredential};
use azure_identity::ClientSecretCredential;
use std::sync::Arc;
use tracing::debug;

use crate::provider::ProviderError;

/// Scope of Azure Resource Manager tokens
pub const MANAGEMENT_SCOPE: &str = "https://management.azure.com/.default";

/// Service principal used against Azure Resource Manager
#[derive(Clone, PartialEq, Eq)]
pub struct AzureCredentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub subscription_id: String,
}

impl std::fmt::Debug for AzureCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureCredentials")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("subscription_id", &self.subscription_id)
            .finish()
    }
}

impl AzureCredentials {
    /// Client secret credential for this service principal
    ///
    /// Token acquisition and caching are left to `azure_identity`.
    pub fn token_credential(&self) -> Result<Arc<dyn TokenCredential>, ProviderError> {
        let credential = ClientSecretCredential::new(
            &self.tenant_id,
            self.client_id.clone(),
            Secret::new(self.client_secret.clone()),
            None,
        )
        .map_err(|e| ProviderError::Auth(format!("failed to create ClientSecretCredential: {e}")))?;
        debug!(tenant = %self.tenant_id, client = %self.client_id, "using azure client secret credential");
        Ok(credential as Arc<dyn TokenCredential>)
    }
}
