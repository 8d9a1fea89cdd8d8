//! In-cluster PostgreSQL provider.
//!
//! Runs PostgreSQL as a single replica Deployment next to the request, with a
//! Service in front and the credentials kept in a dedicated Secret.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Secret, Service};
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::OPENSHIFT_STRATEGY;
use crate::constants::OPERATOR_NAME;
use crate::crd::Postgres;
use crate::provider::{
    parse_parameters, DeletionOutcome, DeploymentDetails, Provider, ProviderError,
    ProvisionOutcome,
};
use crate::resources::{generate_password, organization_tag};
use crate::store::ObjectStore;
use crate::strategy::StrategyConfig;

const PROVIDER_NAME: &str = "openshift-postgres-template";
const CREDENTIALS_SUFFIX: &str = "-postgres-credentials";
const DEFAULT_IMAGE: &str = "registry.redhat.io/rhscl/postgresql-10-rhel7";
const DEFAULT_USER: &str = "user";
const DEFAULT_DATABASE: &str = "postgres";
const POSTGRES_PORT: u16 = 5432;
const USER_KEY: &str = "user";
const PASSWORD_KEY: &str = "password";

/// Optional strategy parameters
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct InClusterPostgresParameters {
    image: Option<String>,
    database: Option<String>,
}

/// Provisions PostgreSQL as a Deployment in the request's namespace
pub struct InClusterPostgresProvider<S> {
    store: Arc<S>,
}

impl<S> std::fmt::Debug for InClusterPostgresProvider<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InClusterPostgresProvider").finish_non_exhaustive()
    }
}

impl<S: ObjectStore> InClusterPostgresProvider<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    fn labels(name: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("app".to_string(), name.to_string()),
            (format!("{}managed-by", organization_tag()), OPERATOR_NAME.to_string()),
        ])
    }

    /// Reuse stored credentials, generating them on first use
    async fn ensure_credentials(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(String, String), ProviderError> {
        let secret_name = format!("{name}{CREDENTIALS_SUFFIX}");
        if let Some(existing) = self.store.get::<Secret>(namespace, &secret_name).await? {
            let data = existing.data.unwrap_or_default();
            let read = |key: &str| {
                data.get(key)
                    .map(|v| String::from_utf8_lossy(&v.0).into_owned())
                    .filter(|v| !v.is_empty())
            };
            if let (Some(user), Some(password)) = (read(USER_KEY), read(PASSWORD_KEY)) {
                return Ok((user, password));
            }
        }

        let password = generate_password()?;
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(secret_name),
                namespace: Some(namespace.to_string()),
                labels: Some(Self::labels(name)),
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
        Ok((DEFAULT_USER.to_string(), password))
    }

    fn deployment(
        namespace: &str,
        name: &str,
        image: &str,
        database: &str,
    ) -> Result<Deployment, ProviderError> {
        let credentials = format!("{name}{CREDENTIALS_SUFFIX}");
        let labels = Self::labels(name);
        let spec = json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": { "name": name, "namespace": namespace, "labels": labels },
            "spec": {
                "replicas": 1,
                "selector": { "matchLabels": { "app": name } },
                "template": {
                    "metadata": { "labels": labels },
                    "spec": {
                        "containers": [{
                            "name": "postgresql",
                            "image": image,
                            "ports": [{ "containerPort": POSTGRES_PORT, "protocol": "TCP" }],
                            "env": [
                                { "name": "POSTGRESQL_USER", "valueFrom": { "secretKeyRef": { "name": credentials, "key": USER_KEY } } },
                                { "name": "POSTGRESQL_PASSWORD", "valueFrom": { "secretKeyRef": { "name": credentials, "key": PASSWORD_KEY } } },
                                { "name": "POSTGRESQL_DATABASE", "value": database }
                            ],
                            "readinessProbe": {
                                "tcpSocket": { "port": POSTGRES_PORT },
                                "initialDelaySeconds": 5,
                                "periodSeconds": 10
                            }
                        }]
                    }
                }
            }
        });
        serde_json::from_value(spec)
            .map_err(|e| ProviderError::Configuration(format!("invalid deployment for {name}: {e}")))
    }

    fn service(namespace: &str, name: &str) -> Result<Service, ProviderError> {
        let spec = json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": { "name": name, "namespace": namespace, "labels": Self::labels(name) },
            "spec": {
                "selector": { "app": name },
                "ports": [{ "name": "postgresql", "port": POSTGRES_PORT, "targetPort": POSTGRES_PORT, "protocol": "TCP" }]
            }
        });
        serde_json::from_value(spec)
            .map_err(|e| ProviderError::Configuration(format!("invalid service for {name}: {e}")))
    }
}

fn is_available(deployment: &Deployment) -> bool {
    deployment
        .status
        .as_ref()
        .and_then(|status| status.available_replicas)
        .unwrap_or_default()
        > 0
}

#[async_trait]
impl<S: ObjectStore> Provider<Postgres> for InClusterPostgresProvider<S> {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn supports_strategy(&self, strategy: &str) -> bool {
        strategy == OPENSHIFT_STRATEGY
    }

    async fn create(
        &self,
        resource: &Postgres,
        strategy: &StrategyConfig,
    ) -> Result<ProvisionOutcome, ProviderError> {
        let params: InClusterPostgresParameters = parse_parameters(strategy)?;
        let namespace = resource.namespace().unwrap_or_default();
        let name = resource.name_any();
        let image = params.image.as_deref().unwrap_or(DEFAULT_IMAGE);
        let database = params.database.as_deref().unwrap_or(DEFAULT_DATABASE);

        let (user, password) = self.ensure_credentials(&namespace, &name).await?;
        let deployment = Self::deployment(&namespace, &name, image, database)?;
        let result = self.store.create_or_update(&deployment).await?;
        debug!(%namespace, %name, ?result, "postgres deployment reconciled");
        self.store
            .create_or_update(&Self::service(&namespace, &name)?)
            .await?;

        let current = self.store.get::<Deployment>(&namespace, &name).await?;
        if !current.as_ref().is_some_and(is_available) {
            return Ok(ProvisionOutcome::InProgress(format!(
                "postgres deployment {namespace}/{name} is not available yet"
            )));
        }

        info!(%namespace, %name, "in-cluster postgres is available");
        let details: DeploymentDetails = BTreeMap::from([
            (
                "host".to_string(),
                format!("{name}.{namespace}.svc.cluster.local").into_bytes(),
            ),
            ("port".to_string(), POSTGRES_PORT.to_string().into_bytes()),
            ("username".to_string(), user.into_bytes()),
            ("password".to_string(), password.into_bytes()),
            ("database".to_string(), database.as_bytes().to_vec()),
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

        self.store.delete::<Deployment>(&namespace, &name).await?;
        self.store.delete::<Service>(&namespace, &name).await?;
        self.store
            .delete::<Secret>(&namespace, &format!("{name}{CREDENTIALS_SUFFIX}"))
            .await?;
        info!(%namespace, %name, "in-cluster postgres removed");
        Ok(DeletionOutcome::Deleted)
    }
}
