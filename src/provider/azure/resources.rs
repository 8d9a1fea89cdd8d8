//! Azure Resource Manager REST client.
//!
//! Covers the three resource types the PostgreSQL provider touches:
//! Azure Database for PostgreSQL servers, subnets of the cluster VNet and
//! VNet rules on a server.
//!
//! References:
//! - [PostgreSQL servers](https://learn.microsoft.com/rest/api/postgresql/singleserver/servers)
//! - [Subnets](https://learn.microsoft.com/rest/api/virtualnetwork/subnets)

use async_trait::async_trait;
use azure_core::credentials::TokenCredential;
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use super::auth::MANAGEMENT_SCOPE;
use crate::provider::ProviderError;

const DEFAULT_ARM_ENDPOINT: &str = "https://management.azure.com";
const POSTGRES_API_VERSION: &str = "2017-12-01";
const NETWORK_API_VERSION: &str = "2020-05-01";

/// Server state reported once provisioning has finished
pub const SERVER_STATE_READY: &str = "Ready";
/// Server state while an accepted delete is running
pub const SERVER_STATE_DROPPING: &str = "Dropping";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PostgresServerProperties {
    pub fully_qualified_domain_name: Option<String>,
    pub user_visible_state: Option<String>,
}

/// Azure Database for PostgreSQL server
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PostgresServer {
    pub name: String,
    #[serde(default)]
    pub properties: PostgresServerProperties,
}

impl PostgresServer {
    #[must_use]
    pub fn state(&self) -> &str {
        self.properties
            .user_visible_state
            .as_deref()
            .unwrap_or("Unknown")
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state() == SERVER_STATE_READY
    }

    #[must_use]
    pub fn is_dropping(&self) -> bool {
        self.state() == SERVER_STATE_DROPPING
    }
}

/// Settings for a new server
#[derive(Clone, PartialEq, Eq)]
pub struct PostgresServerRequest {
    pub location: String,
    pub sku_name: String,
    pub administrator_login: String,
    pub administrator_password: String,
    pub version: String,
    pub ssl_enforcement: String,
}

impl std::fmt::Debug for PostgresServerRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresServerRequest")
            .field("location", &self.location)
            .field("sku_name", &self.sku_name)
            .field("administrator_login", &self.administrator_login)
            .field("version", &self.version)
            .field("ssl_enforcement", &self.ssl_enforcement)
            .finish_non_exhaustive()
    }
}

impl PostgresServerRequest {
    fn body(&self) -> Value {
        json!({
            "location": self.location,
            "sku": { "name": self.sku_name },
            "properties": {
                "createMode": "Default",
                "administratorLogin": self.administrator_login,
                "administratorLoginPassword": self.administrator_password,
                "version": self.version,
                "sslEnforcement": self.ssl_enforcement
            }
        })
    }
}

/// Subnet of a virtual network
///
/// `properties` is kept verbatim so an update writes back everything the
/// subnet already had.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subnet {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub properties: Value,
}

impl Subnet {
    /// Services with an endpoint on this subnet
    #[must_use]
    pub fn service_endpoints(&self) -> Vec<String> {
        self.properties
            .get("serviceEndpoints")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|endpoint| endpoint.get("service").and_then(Value::as_str))
            .map(str::to_string)
            .collect()
    }

    /// Add a service endpoint; returns whether the subnet changed
    pub fn add_service_endpoint(&mut self, service: &str) -> bool {
        if self.service_endpoints().iter().any(|s| s == service) {
            return false;
        }
        if !self.properties.is_object() {
            self.properties = json!({});
        }
        if !self.properties["serviceEndpoints"].is_array() {
            self.properties["serviceEndpoints"] = json!([]);
        }
        if let Some(list) = self.properties["serviceEndpoints"].as_array_mut() {
            list.push(json!({ "service": service }));
        }
        true
    }
}

/// Operations against Azure Resource Manager used by the PostgreSQL provider
#[async_trait]
pub trait AzureResourceManager: Send + Sync {
    async fn get_postgres_server(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<Option<PostgresServer>, ProviderError>;

    /// Start server creation; completion is observed through `get_postgres_server`
    async fn create_postgres_server(
        &self,
        resource_group: &str,
        name: &str,
        request: &PostgresServerRequest,
    ) -> Result<(), ProviderError>;

    /// Start server deletion; returns `false` when the server did not exist
    ///
    /// ARM deletes asynchronously. The server is only gone once
    /// `get_postgres_server` returns `None`.
    async fn delete_postgres_server(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<bool, ProviderError>;

    async fn get_subnet(
        &self,
        resource_group: &str,
        vnet_name: &str,
        subnet_name: &str,
    ) -> Result<Subnet, ProviderError>;

    async fn update_subnet(
        &self,
        resource_group: &str,
        vnet_name: &str,
        subnet: &Subnet,
    ) -> Result<(), ProviderError>;

    async fn create_or_update_vnet_rule(
        &self,
        resource_group: &str,
        server_name: &str,
        rule_name: &str,
        subnet_id: &str,
    ) -> Result<(), ProviderError>;
}

#[derive(Debug, Deserialize)]
struct ArmErrorResponse {
    error: ArmErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ArmErrorDetail {
    code: String,
    message: String,
}

/// REST implementation of [`AzureResourceManager`]
pub struct ArmClient {
    http_client: Client,
    base_url: String,
    subscription_id: String,
    credential: Arc<dyn TokenCredential>,
}

impl std::fmt::Debug for ArmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArmClient")
            .field("base_url", &self.base_url)
            .field("subscription_id", &self.subscription_id)
            .finish_non_exhaustive()
    }
}

impl ArmClient {
    pub fn new(
        http_client: Client,
        subscription_id: &str,
        credential: Arc<dyn TokenCredential>,
    ) -> Self {
        Self {
            http_client,
            base_url: DEFAULT_ARM_ENDPOINT.to_string(),
            subscription_id: subscription_id.to_string(),
            credential,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn server_path(&self, resource_group: &str, name: &str) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{resource_group}/providers/Microsoft.DBforPostgreSQL/servers/{name}",
            self.subscription_id
        )
    }

    fn subnet_path(&self, resource_group: &str, vnet_name: &str, subnet_name: &str) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{resource_group}/providers/Microsoft.Network/virtualNetworks/{vnet_name}/subnets/{subnet_name}",
            self.subscription_id
        )
    }

    /// Send a request; `Ok(None)` on 404
    async fn send(
        &self,
        method: Method,
        path: &str,
        api_version: &str,
        body: Option<&Value>,
    ) -> Result<Option<reqwest::Response>, ProviderError> {
        let url = format!("{}{path}?api-version={api_version}", self.base_url);
        let token = self
            .credential
            .get_token(&[MANAGEMENT_SCOPE], None)
            .await
            .map_err(|e| ProviderError::Auth(format!("failed to get management token: {e}")))?;
        debug!(%method, %url, "azure resource manager request");

        let mut request = self
            .http_client
            .request(method, &url)
            .bearer_auth(token.token.secret())
            .header("Content-Type", "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status.is_success() {
            return Ok(Some(response));
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ArmErrorResponse>(&text)
            .map(|e| format!("{}: {}", e.error.code, e.error.message))
            .unwrap_or(text);
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            Err(ProviderError::Auth(format!("{status}: {message}")))
        } else {
            Err(ProviderError::Cloud(format!("{status}: {message}")))
        }
    }
}

#[async_trait]
impl AzureResourceManager for ArmClient {
    async fn get_postgres_server(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<Option<PostgresServer>, ProviderError> {
        let path = self.server_path(resource_group, name);
        match self
            .send(Method::GET, &path, POSTGRES_API_VERSION, None)
            .await?
        {
            Some(response) => Ok(Some(response.json().await?)),
            None => Ok(None),
        }
    }

    async fn create_postgres_server(
        &self,
        resource_group: &str,
        name: &str,
        request: &PostgresServerRequest,
    ) -> Result<(), ProviderError> {
        let path = self.server_path(resource_group, name);
        self.send(Method::PUT, &path, POSTGRES_API_VERSION, Some(&request.body()))
            .await?
            .ok_or_else(|| {
                ProviderError::Cloud(format!("resource group {resource_group} not found"))
            })?;
        Ok(())
    }

    async fn delete_postgres_server(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<bool, ProviderError> {
        let path = self.server_path(resource_group, name);
        let response = self
            .send(Method::DELETE, &path, POSTGRES_API_VERSION, None)
            .await?;
        // 204 means there was nothing to delete
        Ok(response.is_some_and(|r| r.status() != StatusCode::NO_CONTENT))
    }

    async fn get_subnet(
        &self,
        resource_group: &str,
        vnet_name: &str,
        subnet_name: &str,
    ) -> Result<Subnet, ProviderError> {
        let path = self.subnet_path(resource_group, vnet_name, subnet_name);
        let response = self
            .send(Method::GET, &path, NETWORK_API_VERSION, None)
            .await?
            .ok_or_else(|| {
                ProviderError::Cloud(format!(
                    "subnet {subnet_name} not found in vnet {resource_group}/{vnet_name}"
                ))
            })?;
        Ok(response.json().await?)
    }

    async fn update_subnet(
        &self,
        resource_group: &str,
        vnet_name: &str,
        subnet: &Subnet,
    ) -> Result<(), ProviderError> {
        let path = self.subnet_path(resource_group, vnet_name, &subnet.name);
        let body = json!({ "properties": subnet.properties });
        self.send(Method::PUT, &path, NETWORK_API_VERSION, Some(&body))
            .await?
            .ok_or_else(|| ProviderError::Cloud(format!("vnet {vnet_name} not found")))?;
        Ok(())
    }

    async fn create_or_update_vnet_rule(
        &self,
        resource_group: &str,
        server_name: &str,
        rule_name: &str,
        subnet_id: &str,
    ) -> Result<(), ProviderError> {
        let path = format!(
            "{}/virtualNetworkRules/{rule_name}",
            self.server_path(resource_group, server_name)
        );
        let body = json!({
            "properties": {
                "virtualNetworkSubnetId": subnet_id,
                "ignoreMissingVnetServiceEndpoint": false
            }
        });
        self.send(Method::PUT, &path, POSTGRES_API_VERSION, Some(&body))
            .await?
            .ok_or_else(|| ProviderError::Cloud(format!("server {server_name} not found")))?;
        Ok(())
    }
}
