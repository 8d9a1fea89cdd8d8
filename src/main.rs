//! # Cloud Resource Operator
//!
//! Runs one controller per managed resource kind:
//!
//! - `Postgres` - Azure Database for PostgreSQL or an in-cluster PostgreSQL
//! - `SmtpCredentialSet` - SMTP credentials from strategy parameters
//!
//! Both controllers share the Kubernetes client, the strategy configuration
//! and the metrics and probe server.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use cloud_resource_operator::config::ControllerConfig;
use cloud_resource_operator::controller::reconciler::Reconciler;
use cloud_resource_operator::crd::{Postgres, SmtpCredentialSet};
use cloud_resource_operator::observability;
use cloud_resource_operator::provider::azure::{AzurePostgresProvider, ClusterConfigSource};
use cloud_resource_operator::provider::openshift::{
    InClusterPostgresProvider, InClusterSmtpProvider,
};
use cloud_resource_operator::provider::Provider;
use cloud_resource_operator::runtime::run_controller;
use cloud_resource_operator::server::{start_server, ServerState};
use cloud_resource_operator::store::KubeStore;
use cloud_resource_operator::strategy::{ConfigManager, ConfigMapConfigManager};

#[tokio::main]
async fn main() -> Result<()> {
    // Must happen before any TLS connection is made
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("Failed to install rustls crypto provider");
    }

    let config = ControllerConfig::from_env();
    init_tracing(&config);

    info!(
        "Starting cloud-resource-operator (build: {}, git: {})",
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    observability::metrics::register_metrics()?;

    let shutdown = CancellationToken::new();
    let server_state = Arc::new(ServerState::default());

    let server_port = config.metrics_port;
    let server_state_clone = Arc::clone(&server_state);
    let server_shutdown = shutdown.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone, server_shutdown).await {
            error!("HTTP server error: {}", e);
        }
    });

    let client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let store = Arc::new(KubeStore::new(client.clone()));

    let config_manager: Arc<dyn ConfigManager> = Arc::new(ConfigMapConfigManager::from_config(
        Arc::clone(&store),
        &config,
    ));

    let azure_postgres = AzurePostgresProvider::new(
        Arc::clone(&store),
        ClusterConfigSource::from_config(Arc::clone(&store), &config),
    )
    .context("Failed to create Azure Postgres provider")?;
    let postgres_providers: Vec<Arc<dyn Provider<Postgres>>> = vec![
        Arc::new(azure_postgres),
        Arc::new(InClusterPostgresProvider::new(Arc::clone(&store))),
    ];
    let smtp_providers: Vec<Arc<dyn Provider<SmtpCredentialSet>>> =
        vec![Arc::new(InClusterSmtpProvider::new())];

    let postgres_reconciler = Arc::new(Reconciler::new(
        Arc::clone(&store),
        Arc::clone(&config_manager),
        postgres_providers,
    ));
    let smtp_reconciler = Arc::new(Reconciler::new(
        Arc::clone(&store),
        Arc::clone(&config_manager),
        smtp_providers,
    ));

    let signal_state = Arc::clone(&server_state);
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Received shutdown signal, initiating graceful shutdown...");
        signal_state.set_ready(false);
        signal_shutdown.cancel();
    });

    server_state.set_ready(true);
    info!("Controller initialized, starting watch loops...");

    let (postgres_result, smtp_result) = tokio::join!(
        run_controller(
            client.clone(),
            postgres_reconciler,
            &config,
            shutdown.clone()
        ),
        run_controller(client, smtp_reconciler, &config, shutdown.clone()),
    );

    // A failed watch loop takes the whole operator down
    shutdown.cancel();
    if let Err(e) = server_handle.await {
        error!("HTTP server task failed: {}", e);
    }

    postgres_result.context("Postgres controller failed")?;
    smtp_result.context("SMTP credential set controller failed")?;
    info!("Operator stopped");
    Ok(())
}

fn init_tracing(config: &ControllerConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "cloud_resource_operator={level},cloud_resource_operator::runtime={level}",
            level = config.log_level
        )
        .into()
    });

    if config.json_logs() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
