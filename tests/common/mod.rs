//! Common test utilities for reconciler integration tests
//!
//! Provides a scripted provider, seeded strategy configuration and request
//! builders on top of the in-memory store.

#![allow(dead_code, reason = "not every test binary uses every helper")]

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cloud_resource_operator::constants::{
    DEFAULT_STRATEGY_CONFIG_MAP_NAME, DEFAULT_STRATEGY_CONFIG_MAP_NAMESPACE,
};
use cloud_resource_operator::controller::reconciler::Reconciler;
use cloud_resource_operator::crd::{Postgres, PostgresSpec, SecretRef};
use cloud_resource_operator::provider::{
    DeletionOutcome, DeploymentDetails, Provider, ProviderError, ProvisionOutcome,
};
use cloud_resource_operator::store::MemoryStore;
use cloud_resource_operator::strategy::{ConfigManager, ConfigMapConfigManager, StrategyConfig};

pub const TEST: &str = "test";

/// What a [`ScriptedProvider`] does when asked to create
#[derive(Debug, Clone)]
pub enum CreateBehaviour {
    Ready(DeploymentDetails),
    InProgress(String),
    Fail(String),
    /// Never completes
    Hang,
}

/// What a [`ScriptedProvider`] does when asked to delete
#[derive(Debug, Clone)]
pub enum DeleteBehaviour {
    Deleted,
    InProgress(String),
    Fail(String),
}

#[derive(Debug)]
pub struct ScriptedProvider {
    name: String,
    strategy: String,
    reconcile_time: Duration,
    create: Mutex<CreateBehaviour>,
    delete: Mutex<DeleteBehaviour>,
    create_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(name: &str, strategy: &str, create: CreateBehaviour) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            strategy: strategy.to_string(),
            reconcile_time: Duration::from_secs(30),
            create: Mutex::new(create),
            delete: Mutex::new(DeleteBehaviour::Deleted),
            create_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
        })
    }

    /// Provider for strategy `test` returning `{"test": "test"}`
    pub fn ready() -> Arc<Self> {
        Self::new(
            TEST,
            TEST,
            CreateBehaviour::Ready(BTreeMap::from([(
                TEST.to_string(),
                TEST.as_bytes().to_vec(),
            )])),
        )
    }

    pub fn set_create(&self, behaviour: CreateBehaviour) {
        *self.create.lock().unwrap() = behaviour;
    }

    pub fn set_delete(&self, behaviour: DeleteBehaviour) {
        *self.delete.lock().unwrap() = behaviour;
    }

    pub fn fail_deletes(&self, message: &str) {
        self.set_delete(DeleteBehaviour::Fail(message.to_string()));
    }

    pub fn creates(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<R: Send + Sync> Provider<R> for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_strategy(&self, strategy: &str) -> bool {
        strategy == self.strategy
    }

    fn reconcile_time(&self, _resource: &R) -> Duration {
        self.reconcile_time
    }

    async fn create(
        &self,
        _resource: &R,
        _strategy: &StrategyConfig,
    ) -> Result<ProvisionOutcome, ProviderError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let behaviour = self.create.lock().unwrap().clone();
        match behaviour {
            CreateBehaviour::Ready(details) => Ok(ProvisionOutcome::Ready(details)),
            CreateBehaviour::InProgress(message) => Ok(ProvisionOutcome::InProgress(message)),
            CreateBehaviour::Fail(message) => Err(ProviderError::Cloud(message)),
            CreateBehaviour::Hang => std::future::pending().await,
        }
    }

    async fn delete(
        &self,
        _resource: &R,
        _strategy: &StrategyConfig,
    ) -> Result<DeletionOutcome, ProviderError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let behaviour = self.delete.lock().unwrap().clone();
        match behaviour {
            DeleteBehaviour::Deleted => Ok(DeletionOutcome::Deleted),
            DeleteBehaviour::InProgress(message) => Ok(DeletionOutcome::InProgress(message)),
            DeleteBehaviour::Fail(message) => Err(ProviderError::Cloud(message)),
        }
    }
}

/// Seed the strategy ConfigMap with `(deployment type, tier mapping JSON)` entries
pub fn seed_strategies(store: &MemoryStore, entries: &[(&str, &str)]) {
    let config_map = ConfigMap {
        metadata: ObjectMeta {
            name: Some(DEFAULT_STRATEGY_CONFIG_MAP_NAME.to_string()),
            namespace: Some(DEFAULT_STRATEGY_CONFIG_MAP_NAMESPACE.to_string()),
            ..ObjectMeta::default()
        },
        data: Some(
            entries
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        ),
        ..ConfigMap::default()
    };
    store.insert(config_map).unwrap();
}

/// Map deployment type `test`, tier `test` to strategy `test`
pub fn seed_test_strategy(store: &MemoryStore) {
    seed_strategies(store, &[(TEST, r#"{"test": "test"}"#)]);
}

/// Postgres request `test/test` of type `test`, tier `test`, secret `test`
pub fn test_postgres() -> Postgres {
    let mut pg = Postgres::new(
        TEST,
        PostgresSpec {
            deployment_type: TEST.to_string(),
            tier: TEST.to_string(),
            secret_ref: Some(SecretRef {
                name: TEST.to_string(),
                namespace: None,
            }),
        },
    );
    pg.metadata.namespace = Some(TEST.to_string());
    pg
}

pub fn config_manager(store: &Arc<MemoryStore>) -> Arc<dyn ConfigManager> {
    Arc::new(ConfigMapConfigManager::new(Arc::clone(store), "", ""))
}

pub fn postgres_reconciler(
    store: &Arc<MemoryStore>,
    providers: Vec<Arc<dyn Provider<Postgres>>>,
) -> Reconciler<Postgres, MemoryStore> {
    Reconciler::new(Arc::clone(store), config_manager(store), providers)
}

pub fn postgres_provider(provider: &Arc<ScriptedProvider>) -> Arc<dyn Provider<Postgres>> {
    Arc::clone(provider) as Arc<dyn Provider<Postgres>>
}
