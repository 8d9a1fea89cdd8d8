//! Azure Database for PostgreSQL provider.
//!
//! One pass of `create`:
//!
//! 1. load the cluster configuration and credentials secret
//! 2. start server creation if the server does not exist, then report in progress
//! 3. once the server is ready, open the worker subnet to it through the
//!    `Microsoft.Sql` service endpoint and a VNet rule
//! 4. report the connection details
//!
//! `delete` starts the server deletion and reports it as in progress until
//! ARM no longer lists the server. Only then is the credentials Secret
//! removed.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::config::{AzureClusterConfig, ClusterConfigSource};
use super::resources::{ArmClient, AzureResourceManager, PostgresServerRequest};
use super::AZURE_STRATEGY;
use crate::constants::{ERROR_RECONCILE_TIME, OPERATOR_NAME};
use crate::crd::Postgres;
use crate::provider::{
    parse_parameters, DeletionOutcome, DeploymentDetails, Provider, ProviderError,
    ProvisionOutcome,
};
use crate::resources::{forced_reconcile_time_or_default, generate_password, organization_tag};
use crate::store::ObjectStore;
use crate::strategy::StrategyConfig;

const PROVIDER_NAME: &str = "azure-postgres";
const CREDENTIALS_SUFFIX: &str = "-azure-postgres-credentials";
const USER_KEY: &str = "user";
const PASSWORD_KEY: &str = "password";
const DEFAULT_USER: &str = "postgres";
const DEFAULT_DATABASE: &str = "postgres";
const DEFAULT_PORT: u16 = 5432;
const DEFAULT_SKU: &str = "GP_Gen5_2";
const DEFAULT_VERSION: &str = "10";
const DEFAULT_SSL_ENFORCEMENT: &str = "Disabled";
const VNET_RULE_NAME: &str = "postgres-vnet-rule";
const SQL_SERVICE_ENDPOINT: &str = "Microsoft.Sql";
const POSTGRES_HOST_SUFFIX: &str = "postgres.database.azure.com";

/// Builds the ARM client for a cluster configuration
pub type ResourceManagerFactory = Arc<
    dyn Fn(&AzureClusterConfig) -> Result<Arc<dyn AzureResourceManager>, ProviderError>
        + Send
        + Sync,
>;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct AzurePostgresParameters {
    sku_name: Option<String>,
    version: Option<String>,
    ssl_enforcement: Option<String>,
}

/// Provisions PostgreSQL servers in the cluster's Azure resource group
pub struct AzurePostgresProvider<S> {
    store: Arc<S>,
    cluster_config: ClusterConfigSource<S>,
    manager_factory: ResourceManagerFactory,
}

impl<S> std::fmt::Debug for AzurePostgresProvider<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzurePostgresProvider")
            .field("cluster_config", &self.cluster_config)
            .finish_non_exhaustive()
    }
}

fn arm_client_factory(http_client: reqwest::Client) -> ResourceManagerFactory {
    Arc::new(move |config: &AzureClusterConfig| {
        let credential = config.credentials().token_credential()?;
        let client = ArmClient::new(http_client.clone(), &config.subscription_id, credential);
        Ok(Arc::new(client) as Arc<dyn AzureResourceManager>)
    })
}

impl<S: ObjectStore> AzurePostgresProvider<S> {
    /// Provider talking to the public Azure Resource Manager endpoint
    pub fn new(store: Arc<S>, cluster_config: ClusterConfigSource<S>) -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self::with_manager_factory(
            store,
            cluster_config,
            arm_client_factory(http_client),
        ))
    }

    pub fn with_manager_factory(
        store: Arc<S>,
        cluster_config: ClusterConfigSource<S>,
        manager_factory: ResourceManagerFactory,
    ) -> Self {
        Self {
            store,
            cluster_config,
            manager_factory,
        }
    }

    /// Administrator password, generated once and kept in a Secret
    async fn ensure_password(&self, namespace: &str, name: &str) -> Result<String, ProviderError> {
        let secret_name = format!("{name}{CREDENTIALS_SUFFIX}");
        if let Some(existing) = self.store.get::<Secret>(namespace, &secret_name).await? {
            let password = existing
                .data
                .as_ref()
                .and_then(|data| data.get(PASSWORD_KEY))
                .map(|v| String::from_utf8_lossy(&v.0).into_owned())
                .filter(|v| !v.is_empty());
            if let Some(password) = password {
                return Ok(password);
            }
        }

        let password = generate_password()?;
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(secret_name),
                namespace: Some(namespace.to_string()),
                labels: Some(BTreeMap::from([(
                    format!("{}managed-by", organization_tag()),
                    OPERATOR_NAME.to_string(),
                )])),
                ..ObjectMeta::default()
            },
            data: Some(BTreeMap::from([
                (USER_KEY.to_string(), ByteString(DEFAULT_USER.as_bytes().to_vec())),
                (PASSWORD_KEY.to_string(), ByteString(password.as_bytes().to_vec())),
            ])),
            type_: Some("Opaque".to_string()),
            ..Secret::default()
        };
        self.store.create_or_update(&secret).await?;
        debug!(%namespace, %name, "stored azure postgres credentials");
        Ok(password)
    }
}

#[async_trait]
impl<S: ObjectStore> Provider<Postgres> for AzurePostgresProvider<S> {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn supports_strategy(&self, strategy: &str) -> bool {
        strategy == AZURE_STRATEGY
    }

    fn reconcile_time(&self, _resource: &Postgres) -> Duration {
        forced_reconcile_time_or_default(ERROR_RECONCILE_TIME)
    }

    async fn create(
        &self,
        resource: &Postgres,
        strategy: &StrategyConfig,
    ) -> Result<ProvisionOutcome, ProviderError> {
        let params: AzurePostgresParameters = parse_parameters(strategy)?;
        let namespace = resource.namespace().unwrap_or_default();
        let name = resource.name_any();

        let config = self.cluster_config.load().await?;
        let password = self.ensure_password(&namespace, &name).await?;
        let manager = (self.manager_factory)(&config)?;

        let Some(server) = manager
            .get_postgres_server(&config.resource_group, &name)
            .await?
        else {
            let request = PostgresServerRequest {
                location: config.location.clone(),
                sku_name: params.sku_name.unwrap_or_else(|| DEFAULT_SKU.to_string()),
                administrator_login: DEFAULT_USER.to_string(),
                administrator_password: password,
                version: params.version.unwrap_or_else(|| DEFAULT_VERSION.to_string()),
                ssl_enforcement: params
                    .ssl_enforcement
                    .unwrap_or_else(|| DEFAULT_SSL_ENFORCEMENT.to_string()),
            };
            manager
                .create_postgres_server(&config.resource_group, &name, &request)
                .await?;
            info!(%name, resource_group = %config.resource_group, "azure postgres server creation started");
            return Ok(ProvisionOutcome::InProgress(format!(
                "azure postgres server {name} creation started"
            )));
        };

        if !server.is_ready() {
            return Ok(ProvisionOutcome::InProgress(format!(
                "azure postgres server {name} is {}",
                server.state()
            )));
        }

        let mut subnet = manager
            .get_subnet(
                &config.vnet_resource_group,
                &config.vnet_name,
                &config.subnet_name,
            )
            .await?;
        if subnet.add_service_endpoint(SQL_SERVICE_ENDPOINT) {
            manager
                .update_subnet(&config.vnet_resource_group, &config.vnet_name, &subnet)
                .await?;
            info!(subnet = %subnet.name, "added {SQL_SERVICE_ENDPOINT} service endpoint");
        }
        manager
            .create_or_update_vnet_rule(&config.resource_group, &name, VNET_RULE_NAME, &subnet.id)
            .await?;

        let host = server
            .properties
            .fully_qualified_domain_name
            .clone()
            .unwrap_or_else(|| format!("{name}.{POSTGRES_HOST_SUFFIX}"));
        let details: DeploymentDetails = BTreeMap::from([
            ("host".to_string(), host.into_bytes()),
            ("port".to_string(), DEFAULT_PORT.to_string().into_bytes()),
            ("username".to_string(), DEFAULT_USER.as_bytes().to_vec()),
            ("password".to_string(), password.into_bytes()),
            ("database".to_string(), DEFAULT_DATABASE.as_bytes().to_vec()),
        ]);
        Ok(ProvisionOutcome::Ready(details))
    }

    async fn delete(
        &self,
        resource: &Postgres,
        _strategy: &StrategyConfig,
    ) -> Result<DeletionOutcome, ProviderError> {
        let namespace = resource.namespace().unwrap_or_default();
        let name = resource.name_any();

        let config = self.cluster_config.load().await?;
        let manager = (self.manager_factory)(&config)?;

        if let Some(server) = manager
            .get_postgres_server(&config.resource_group, &name)
            .await?
        {
            if !server.is_dropping() {
                manager
                    .delete_postgres_server(&config.resource_group, &name)
                    .await?;
                info!(%name, resource_group = %config.resource_group, "azure postgres server deletion started");
            }
            if let Some(server) = manager
                .get_postgres_server(&config.resource_group, &name)
                .await?
            {
                return Ok(DeletionOutcome::InProgress(format!(
                    "azure postgres server {name} is {}",
                    server.state()
                )));
            }
        }

        // The password must outlive the server
        self.store
            .delete::<Secret>(&namespace, &format!("{name}{CREDENTIALS_SUFFIX}"))
            .await?;
        info!(%name, "azure postgres server deleted");
        Ok(DeletionOutcome::Deleted)
    }
}
