//! # Providers
//!
//! Pluggable implementations that create and delete the backing resource of
//! a managed resource request.
//!
//! A provider claims one or more strategy names. The reconciler resolves the
//! strategy of a request from the strategy configuration and hands the request
//! to the first provider claiming it, see [`registry::select_provider`].
//!
//! - `openshift` - in-cluster PostgreSQL and SMTP credentials from parameters
//! - `azure` - Azure Database for PostgreSQL through the ARM REST API

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

use crate::constants::SUCCESS_RECONCILE_TIME;
use crate::resources::{forced_reconcile_time_or_default, PasswordError};
use crate::store::StoreError;
use crate::strategy::StrategyConfig;

pub mod azure;
pub mod openshift;
pub mod registry;

pub use registry::select_provider;

/// Connection and credential data written to the target Secret
pub type DeploymentDetails = BTreeMap<String, Vec<u8>>;

/// Result of one provisioning pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// The backing resource is usable
    Ready(DeploymentDetails),
    /// Provisioning was accepted but has not finished yet
    InProgress(String),
}

/// Result of one deletion pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionOutcome {
    /// The backing resource is gone
    Deleted,
    /// Deletion was accepted but the backing resource still exists
    InProgress(String),
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("no provider found for strategy {strategy}")]
    NoProvider { strategy: String },

    #[error("invalid provider configuration: {0}")]
    Configuration(String),

    #[error("kubernetes store error: {0}")]
    Store(#[from] StoreError),

    #[error("failed to generate credentials: {0}")]
    Password(#[from] PasswordError),

    #[error("cloud api error: {0}")]
    Cloud(String),

    #[error("authentication failed: {0}")]
    Auth(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        ProviderError::Cloud(e.to_string())
    }
}

/// Create/delete lifecycle for one kind of managed resource
///
/// `create` must converge: calling it again for a resource that already
/// exists returns the same details without duplicating anything.
/// `delete` treats an absent backing resource as success and only reports
/// [`DeletionOutcome::Deleted`] once the backing resource is confirmed gone.
#[async_trait]
pub trait Provider<R>: Send + Sync
where
    R: Send + Sync,
{
    /// Provider name reported in status and logs
    fn name(&self) -> &str;

    /// Whether the provider handles `strategy`
    fn supports_strategy(&self, strategy: &str) -> bool;

    /// Interval until the next reconcile of a healthy resource
    fn reconcile_time(&self, _resource: &R) -> Duration {
        forced_reconcile_time_or_default(SUCCESS_RECONCILE_TIME)
    }

    async fn create(
        &self,
        resource: &R,
        strategy: &StrategyConfig,
    ) -> Result<ProvisionOutcome, ProviderError>;

    async fn delete(
        &self,
        resource: &R,
        strategy: &StrategyConfig,
    ) -> Result<DeletionOutcome, ProviderError>;
}

/// Deserialize strategy parameters, treating `null` as the default
pub(crate) fn parse_parameters<P>(strategy: &StrategyConfig) -> Result<P, ProviderError>
where
    P: serde::de::DeserializeOwned + Default,
{
    if strategy.raw_parameters.is_null() {
        return Ok(P::default());
    }
    serde_json::from_value(strategy.raw_parameters.clone()).map_err(|e| {
        ProviderError::Configuration(format!(
            "invalid parameters for strategy {} (tier {}): {e}",
            strategy.strategy_name, strategy.tier
        ))
    })
}
