//! SMTP credentials from strategy parameters.
//!
//! There is no backing cloud resource: the credentials of a shared relay are
//! configured per tier and copied into the request's Secret.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;

use super::OPENSHIFT_STRATEGY;
use crate::crd::SmtpCredentialSet;
use crate::provider::{
    parse_parameters, DeletionOutcome, Provider, ProviderError, ProvisionOutcome,
};
use crate::strategy::StrategyConfig;

const PROVIDER_NAME: &str = "openshift-smtp";

fn default_port() -> u16 {
    587
}

fn default_tls() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SmtpParameters {
    #[serde(default)]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default = "default_tls")]
    tls: bool,
}

impl Default for SmtpParameters {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            username: String::new(),
            password: String::new(),
            tls: default_tls(),
        }
    }
}

/// Hands out SMTP relay credentials configured in the strategy parameters
#[derive(Debug, Default)]
pub struct InClusterSmtpProvider;

impl InClusterSmtpProvider {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Provider<SmtpCredentialSet> for InClusterSmtpProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn supports_strategy(&self, strategy: &str) -> bool {
        strategy == OPENSHIFT_STRATEGY
    }

    async fn create(
        &self,
        _resource: &SmtpCredentialSet,
        strategy: &StrategyConfig,
    ) -> Result<ProvisionOutcome, ProviderError> {
        let params: SmtpParameters = parse_parameters(strategy)?;
        let missing: Vec<&str> = [
            ("host", params.host.is_empty()),
            ("username", params.username.is_empty()),
            ("password", params.password.is_empty()),
        ]
        .into_iter()
        .filter_map(|(field, missing)| missing.then_some(field))
        .collect();
        if !missing.is_empty() {
            return Err(ProviderError::Configuration(format!(
                "smtp strategy for tier {} is missing parameters: {}",
                strategy.tier,
                missing.join(", ")
            )));
        }

        Ok(ProvisionOutcome::Ready(BTreeMap::from([
            ("host".to_string(), params.host.into_bytes()),
            ("port".to_string(), params.port.to_string().into_bytes()),
            ("username".to_string(), params.username.into_bytes()),
            ("password".to_string(), params.password.into_bytes()),
            ("tls".to_string(), params.tls.to_string().into_bytes()),
        ])))
    }

    async fn delete(
        &self,
        _resource: &SmtpCredentialSet,
        _strategy: &StrategyConfig,
    ) -> Result<DeletionOutcome, ProviderError> {
        Ok(DeletionOutcome::Deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::SmtpCredentialSetSpec;
    use serde_json::{json, Value};

    fn request() -> SmtpCredentialSet {
        SmtpCredentialSet::new(
            "mailer",
            SmtpCredentialSetSpec {
                deployment_type: "workshop".to_string(),
                tier: "development".to_string(),
                secret_ref: None,
            },
        )
    }

    fn strategy(parameters: Value) -> StrategyConfig {
        StrategyConfig {
            tier: "development".to_string(),
            strategy_name: OPENSHIFT_STRATEGY.to_string(),
            raw_parameters: parameters,
        }
    }

    #[tokio::test]
    async fn test_credentials_come_from_parameters() {
        let outcome = InClusterSmtpProvider::new()
            .create(
                &request(),
                &strategy(json!({"host": "smtp.example.com", "username": "relay", "password": "hunter2"})),
            )
            .await
            .unwrap();
        let ProvisionOutcome::Ready(details) = outcome else {
            panic!("expected ready outcome");
        };
        assert_eq!(details["host"], b"smtp.example.com".to_vec());
        assert_eq!(details["port"], b"587".to_vec());
        assert_eq!(details["tls"], b"true".to_vec());
    }

    #[tokio::test]
    async fn test_missing_parameters_are_reported() {
        let err = InClusterSmtpProvider::new()
            .create(&request(), &strategy(Value::Null))
            .await
            .unwrap_err();
        let ProviderError::Configuration(message) = err else {
            panic!("expected configuration error");
        };
        assert!(message.contains("host, username, password"));
    }
}
