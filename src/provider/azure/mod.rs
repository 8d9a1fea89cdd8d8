//! # Azure Providers
//!
//! Azure Database for PostgreSQL, provisioned through the ARM REST API with
//! the service principal from the cluster's cloud provider configuration.
//!
//! - `config.rs` - cluster configuration ConfigMap
//! - `auth.rs` - service principal credentials through `azure_identity`
//! - `resources.rs` - ARM client for servers, subnets and VNet rules
//! - `postgres.rs` - the provider

mod auth;
mod config;
mod postgres;
mod resources;

pub use auth::{AzureCredentials, MANAGEMENT_SCOPE};
pub use config::{AzureClusterConfig, ClusterConfigSource};
pub use postgres::{AzurePostgresProvider, ResourceManagerFactory};
pub use resources::{
    ArmClient, AzureResourceManager, PostgresServer, PostgresServerProperties,
    PostgresServerRequest, Subnet, SERVER_STATE_DROPPING, SERVER_STATE_READY,
};

/// Strategy name claimed by the Azure providers
pub const AZURE_STRATEGY: &str = "azure";
