//! # Connection Secret
//!
//! Writes provider deployment details to the target Secret of a resource.

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use tracing::debug;

use crate::constants::OPERATOR_NAME;
use crate::crd::{ManagedResource, SecretRef};
use crate::provider::DeploymentDetails;
use crate::resources::organization_tag;
use crate::store::{ObjectStore, OperationResult, StoreError};

/// Build the Opaque Secret holding `details` for `owner`
///
/// The Secret is labelled with the organization tag prefix. It is owned by
/// `owner` when both live in the same namespace, so it is garbage collected
/// with the request.
pub fn build_secret<R>(owner: &R, target: &SecretRef, details: &DeploymentDetails) -> Secret
where
    R: ManagedResource + Resource<DynamicType = ()>,
{
    let owner_namespace = owner.namespace().unwrap_or_default();
    let namespace = target
        .namespace
        .clone()
        .unwrap_or_else(|| owner_namespace.clone());

    let tag = organization_tag();
    let labels = BTreeMap::from([
        (format!("{tag}managed-by"), OPERATOR_NAME.to_string()),
        (format!("{tag}resource-type"), R::RESOURCE_TYPE.to_string()),
    ]);

    let owner_references = (namespace == owner_namespace)
        .then(|| owner.controller_owner_ref(&()))
        .flatten()
        .map(|owner_ref| vec![owner_ref]);

    Secret {
        metadata: ObjectMeta {
            name: Some(target.name.clone()),
            namespace: Some(namespace),
            labels: Some(labels),
            owner_references,
            ..ObjectMeta::default()
        },
        data: Some(
            details
                .iter()
                .map(|(key, value)| (key.clone(), ByteString(value.clone())))
                .collect(),
        ),
        type_: Some("Opaque".to_string()),
        ..Secret::default()
    }
}

/// Create or update the target Secret of `owner`
pub async fn write_secret<S, R>(
    store: &S,
    owner: &R,
    target: &SecretRef,
    details: &DeploymentDetails,
) -> Result<OperationResult, StoreError>
where
    S: ObjectStore,
    R: ManagedResource + Resource<DynamicType = ()>,
{
    let secret = build_secret(owner, target, details);
    let result = store.create_or_update(&secret).await?;
    debug!(
        secret.name = %target.name,
        secret.namespace = ?target.namespace,
        ?result,
        "Wrote connection secret"
    );
    Ok(result)
}

/// Delete the target Secret of `owner` when no owner reference covers it
///
/// Secrets in the owner's namespace are garbage collected with it. Secrets
/// elsewhere are removed here, but only when this operator wrote them.
/// Returns whether a Secret was deleted.
pub async fn delete_unowned_secret<S, R>(
    store: &S,
    owner: &R,
    target: &SecretRef,
) -> Result<bool, StoreError>
where
    S: ObjectStore,
    R: ManagedResource + Resource<DynamicType = ()>,
{
    let owner_namespace = owner.namespace().unwrap_or_default();
    let namespace = target
        .namespace
        .clone()
        .unwrap_or_else(|| owner_namespace.clone());
    if namespace == owner_namespace {
        return Ok(false);
    }

    let Some(secret) = store.get::<Secret>(&namespace, &target.name).await? else {
        return Ok(false);
    };
    let managed_by = format!("{}managed-by", organization_tag());
    let ours = secret
        .labels()
        .get(&managed_by)
        .is_some_and(|value| value == OPERATOR_NAME);
    if !ours {
        debug!(secret.name = %target.name, %namespace, "Leaving secret not written by the operator");
        return Ok(false);
    }
    store.delete::<Secret>(&namespace, &target.name).await
}
