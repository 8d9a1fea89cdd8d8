//! # Reconciler Tests
//!
//! Drive the reconcile state machine end to end against the in-memory store.

mod common;

use k8s_openapi::api::core::v1::Secret;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use cloud_resource_operator::constants::{DEFAULT_FINALIZER, ERROR_RECONCILE_TIME};
use cloud_resource_operator::controller::reconciler::{
    ObjectKey, ReconcileOutcome, Reconciler, ReconcilerError,
};
use cloud_resource_operator::crd::{
    Phase, Postgres, SecretRef, SmtpCredentialSet, SmtpCredentialSetSpec,
};
use cloud_resource_operator::provider::openshift::InClusterSmtpProvider;
use cloud_resource_operator::provider::Provider;
use cloud_resource_operator::resources::has_finalizer;
use cloud_resource_operator::store::{MemoryStore, ObjectStore};

use common::{
    config_manager, postgres_provider, postgres_reconciler, seed_strategies, seed_test_strategy,
    test_postgres, CreateBehaviour, DeleteBehaviour, ScriptedProvider, TEST,
};

fn key() -> ObjectKey {
    ObjectKey::new(TEST, TEST)
}

async fn stored_postgres(store: &MemoryStore) -> Postgres {
    store.get::<Postgres>(TEST, TEST).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_reconcile_provisions_and_writes_secret() {
    let store = Arc::new(MemoryStore::new());
    seed_test_strategy(&store);
    store.insert(test_postgres()).unwrap();
    let provider = ScriptedProvider::ready();
    let reconciler = postgres_reconciler(&store, vec![postgres_provider(&provider)]);

    let outcome = reconciler
        .reconcile(&key(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ReconcileOutcome {
            requeue: true,
            requeue_after: Duration::from_secs(30),
        }
    );

    let secret = store.get::<Secret>(TEST, TEST).await.unwrap().unwrap();
    let data = secret.data.unwrap();
    assert_eq!(data[TEST].0, TEST.as_bytes().to_vec());

    let pg = stored_postgres(&store).await;
    assert!(has_finalizer(&pg, DEFAULT_FINALIZER));
    let status = pg.status.unwrap();
    assert_eq!(status.phase, Phase::Complete);
    assert_eq!(status.strategy.as_deref(), Some(TEST));
    assert_eq!(status.provider.as_deref(), Some(TEST));
    assert_eq!(
        status.secret_ref,
        Some(SecretRef {
            name: TEST.to_string(),
            namespace: Some(TEST.to_string()),
        })
    );
}

#[tokio::test]
async fn test_reconcile_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    seed_test_strategy(&store);
    store.insert(test_postgres()).unwrap();
    let provider = ScriptedProvider::ready();
    let reconciler = postgres_reconciler(&store, vec![postgres_provider(&provider)]);
    let cancel = CancellationToken::new();

    let first = reconciler.reconcile(&key(), &cancel).await.unwrap();
    let status_before = stored_postgres(&store).await.status;
    let secret_writes = store.write_count::<Secret>();
    let postgres_writes = store.write_count::<Postgres>();

    let second = reconciler.reconcile(&key(), &cancel).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(provider.creates(), 2);
    assert_eq!(store.write_count::<Secret>(), secret_writes);
    assert_eq!(store.write_count::<Postgres>(), postgres_writes);
    assert_eq!(stored_postgres(&store).await.status, status_before);
}

#[tokio::test]
async fn test_finalizer_write_failure_blocks_provisioning() {
    let store = Arc::new(MemoryStore::new());
    seed_test_strategy(&store);
    store.insert(test_postgres()).unwrap();
    store.fail_writes::<Postgres>();
    let provider = ScriptedProvider::ready();
    let reconciler = postgres_reconciler(&store, vec![postgres_provider(&provider)]);

    let err = reconciler
        .reconcile(&key(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcilerError::Persistence { ref context, .. } if context == "finalizer"));
    assert_eq!(provider.creates(), 0);
    assert!(!store.contains::<Secret>(TEST, TEST));

    store.restore_writes::<Postgres>();
    let pg = stored_postgres(&store).await;
    assert!(!has_finalizer(&pg, DEFAULT_FINALIZER));
}

#[tokio::test]
async fn test_missing_object_needs_no_work() {
    let store = Arc::new(MemoryStore::new());
    seed_test_strategy(&store);
    let provider = ScriptedProvider::ready();
    let reconciler = postgres_reconciler(&store, vec![postgres_provider(&provider)]);

    let outcome = reconciler
        .reconcile(&key(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::done());
    assert_eq!(provider.creates(), 0);
}

#[tokio::test]
async fn test_missing_strategy_marks_failed_and_retries() {
    let store = Arc::new(MemoryStore::new());
    store.insert(test_postgres()).unwrap();
    let provider = ScriptedProvider::ready();
    let reconciler = postgres_reconciler(&store, vec![postgres_provider(&provider)]);

    let outcome = reconciler
        .reconcile(&key(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::after(ERROR_RECONCILE_TIME));
    assert_eq!(provider.creates(), 0);

    let pg = stored_postgres(&store).await;
    assert!(has_finalizer(&pg, DEFAULT_FINALIZER));
    let status = pg.status.unwrap();
    assert_eq!(status.phase, Phase::Failed);
    assert!(status.message.unwrap().contains("not defined"));
}

#[tokio::test]
async fn test_malformed_strategy_marks_failed_and_retries() {
    let store = Arc::new(MemoryStore::new());
    seed_strategies(&store, &[(TEST, r#"{"test": "#)]);
    store.insert(test_postgres()).unwrap();
    let provider = ScriptedProvider::ready();
    let reconciler = postgres_reconciler(&store, vec![postgres_provider(&provider)]);

    let outcome = reconciler
        .reconcile(&key(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::retry());
    assert_eq!(provider.creates(), 0);
    let pg = stored_postgres(&store).await;
    assert!(has_finalizer(&pg, DEFAULT_FINALIZER));
    assert_eq!(pg.status.unwrap().phase, Phase::Failed);
}

#[tokio::test]
async fn test_unclaimed_strategy_marks_failed() {
    let store = Arc::new(MemoryStore::new());
    seed_strategies(&store, &[(TEST, r#"{"test": "azure"}"#)]);
    store.insert(test_postgres()).unwrap();
    let provider = ScriptedProvider::ready();
    let reconciler = postgres_reconciler(&store, vec![postgres_provider(&provider)]);

    let outcome = reconciler
        .reconcile(&key(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::retry());
    let status = stored_postgres(&store).await.status.unwrap();
    assert_eq!(status.phase, Phase::Failed);
    assert!(status.message.unwrap().contains("azure"));
}

#[tokio::test]
async fn test_first_claiming_provider_wins() {
    let store = Arc::new(MemoryStore::new());
    seed_test_strategy(&store);
    store.insert(test_postgres()).unwrap();
    let first = ScriptedProvider::ready();
    let second = ScriptedProvider::new("second", TEST, CreateBehaviour::Fail("unused".into()));
    let reconciler = postgres_reconciler(
        &store,
        vec![postgres_provider(&first), postgres_provider(&second)],
    );

    reconciler
        .reconcile(&key(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(first.creates(), 1);
    assert_eq!(second.creates(), 0);
}

#[tokio::test]
async fn test_in_progress_requeues_without_secret() {
    let store = Arc::new(MemoryStore::new());
    seed_test_strategy(&store);
    store.insert(test_postgres()).unwrap();
    let provider = ScriptedProvider::new(
        TEST,
        TEST,
        CreateBehaviour::InProgress("server is Creating".to_string()),
    );
    let reconciler = postgres_reconciler(&store, vec![postgres_provider(&provider)]);

    let outcome = reconciler
        .reconcile(&key(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::after(Duration::from_secs(30)));
    assert!(!store.contains::<Secret>(TEST, TEST));
    let status = stored_postgres(&store).await.status.unwrap();
    assert_eq!(status.phase, Phase::InProgress);
    assert_eq!(status.message.as_deref(), Some("server is Creating"));
}

#[tokio::test]
async fn test_in_progress_then_ready_completes() {
    let store = Arc::new(MemoryStore::new());
    seed_test_strategy(&store);
    store.insert(test_postgres()).unwrap();
    let provider = ScriptedProvider::new(TEST, TEST, CreateBehaviour::InProgress("creating".into()));
    let reconciler = postgres_reconciler(&store, vec![postgres_provider(&provider)]);
    let cancel = CancellationToken::new();

    reconciler.reconcile(&key(), &cancel).await.unwrap();
    provider.set_create(CreateBehaviour::Ready(BTreeMap::from([(
        "host".to_string(),
        b"db.test".to_vec(),
    )])));
    reconciler.reconcile(&key(), &cancel).await.unwrap();

    let status = stored_postgres(&store).await.status.unwrap();
    assert_eq!(status.phase, Phase::Complete);
    assert!(store.contains::<Secret>(TEST, TEST));
}

#[tokio::test]
async fn test_provider_error_marks_failed() {
    let store = Arc::new(MemoryStore::new());
    seed_test_strategy(&store);
    store.insert(test_postgres()).unwrap();
    let provider = ScriptedProvider::new(TEST, TEST, CreateBehaviour::Fail("quota exceeded".into()));
    let reconciler = postgres_reconciler(&store, vec![postgres_provider(&provider)]);

    let err = reconciler
        .reconcile(&key(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcilerError::Provider { ref provider, .. } if provider == TEST));
    let status = stored_postgres(&store).await.status.unwrap();
    assert_eq!(status.phase, Phase::Failed);
    assert!(status.message.unwrap().contains("quota exceeded"));
    assert!(!store.contains::<Secret>(TEST, TEST));
}

#[tokio::test]
async fn test_secret_write_failure_is_persistence_error() {
    let store = Arc::new(MemoryStore::new());
    seed_test_strategy(&store);
    store.insert(test_postgres()).unwrap();
    store.fail_writes::<Secret>();
    let provider = ScriptedProvider::ready();
    let reconciler = postgres_reconciler(&store, vec![postgres_provider(&provider)]);

    let err = reconciler
        .reconcile(&key(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcilerError::Persistence { .. }));
    let status = stored_postgres(&store).await.status.unwrap();
    assert_ne!(status.phase, Phase::Complete);

    // Recovers once writes succeed again
    store.restore_writes::<Secret>();
    reconciler
        .reconcile(&key(), &CancellationToken::new())
        .await
        .unwrap();
    let status = stored_postgres(&store).await.status.unwrap();
    assert_eq!(status.phase, Phase::Complete);
}

#[tokio::test]
async fn test_deletion_releases_finalizer() {
    let store = Arc::new(MemoryStore::new());
    seed_test_strategy(&store);
    store.insert(test_postgres()).unwrap();
    let provider = ScriptedProvider::ready();
    let reconciler = postgres_reconciler(&store, vec![postgres_provider(&provider)]);
    let cancel = CancellationToken::new();

    reconciler.reconcile(&key(), &cancel).await.unwrap();
    store.delete::<Postgres>(TEST, TEST).await.unwrap();
    assert!(store.contains::<Postgres>(TEST, TEST));

    let outcome = reconciler.reconcile(&key(), &cancel).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::done());
    assert_eq!(provider.deletes(), 1);
    assert!(!store.contains::<Postgres>(TEST, TEST));
}

#[tokio::test]
async fn test_deletion_failure_keeps_finalizer() {
    let store = Arc::new(MemoryStore::new());
    seed_test_strategy(&store);
    store.insert(test_postgres()).unwrap();
    let provider = ScriptedProvider::ready();
    let reconciler = postgres_reconciler(&store, vec![postgres_provider(&provider)]);
    let cancel = CancellationToken::new();

    reconciler.reconcile(&key(), &cancel).await.unwrap();
    store.delete::<Postgres>(TEST, TEST).await.unwrap();
    provider.fail_deletes("server locked");

    let err = reconciler.reconcile(&key(), &cancel).await.unwrap_err();

    assert!(matches!(err, ReconcilerError::Provider { .. }));
    let pg = stored_postgres(&store).await;
    assert!(has_finalizer(&pg, DEFAULT_FINALIZER));
    assert_eq!(pg.status.unwrap().phase, Phase::Failed);
}

#[tokio::test]
async fn test_pending_deletion_keeps_finalizer_until_confirmed() {
    let store = Arc::new(MemoryStore::new());
    seed_test_strategy(&store);
    store.insert(test_postgres()).unwrap();
    let provider = ScriptedProvider::ready();
    let reconciler = postgres_reconciler(&store, vec![postgres_provider(&provider)]);
    let cancel = CancellationToken::new();

    reconciler.reconcile(&key(), &cancel).await.unwrap();
    store.delete::<Postgres>(TEST, TEST).await.unwrap();
    provider.set_delete(DeleteBehaviour::InProgress("server is Dropping".to_string()));

    let outcome = reconciler.reconcile(&key(), &cancel).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::after(Duration::from_secs(30)));
    let pg = stored_postgres(&store).await;
    assert!(has_finalizer(&pg, DEFAULT_FINALIZER));
    let status = pg.status.unwrap();
    assert_eq!(status.phase, Phase::InProgress);
    assert_eq!(status.message.as_deref(), Some("server is Dropping"));

    provider.set_delete(DeleteBehaviour::Deleted);
    let outcome = reconciler.reconcile(&key(), &cancel).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::done());
    assert_eq!(provider.deletes(), 2);
    assert!(!store.contains::<Postgres>(TEST, TEST));
}

#[tokio::test]
async fn test_deletion_removes_secret_in_other_namespace() {
    let store = Arc::new(MemoryStore::new());
    seed_test_strategy(&store);
    let mut pg = test_postgres();
    pg.spec.secret_ref = Some(SecretRef {
        name: TEST.to_string(),
        namespace: Some("vault".to_string()),
    });
    store.insert(pg).unwrap();
    let provider = ScriptedProvider::ready();
    let reconciler = postgres_reconciler(&store, vec![postgres_provider(&provider)]);
    let cancel = CancellationToken::new();

    reconciler.reconcile(&key(), &cancel).await.unwrap();
    assert!(store.contains::<Secret>("vault", TEST));

    store.delete::<Postgres>(TEST, TEST).await.unwrap();
    let outcome = reconciler.reconcile(&key(), &cancel).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::done());
    assert!(!store.contains::<Secret>("vault", TEST));
    assert!(!store.contains::<Postgres>(TEST, TEST));
}

#[tokio::test]
async fn test_secret_cleanup_failure_keeps_finalizer() {
    let store = Arc::new(MemoryStore::new());
    seed_test_strategy(&store);
    let mut pg = test_postgres();
    pg.spec.secret_ref = Some(SecretRef {
        name: TEST.to_string(),
        namespace: Some("vault".to_string()),
    });
    store.insert(pg).unwrap();
    let provider = ScriptedProvider::ready();
    let reconciler = postgres_reconciler(&store, vec![postgres_provider(&provider)]);
    let cancel = CancellationToken::new();

    reconciler.reconcile(&key(), &cancel).await.unwrap();
    store.delete::<Postgres>(TEST, TEST).await.unwrap();
    store.fail_writes::<Secret>();

    let err = reconciler.reconcile(&key(), &cancel).await.unwrap_err();

    assert!(matches!(err, ReconcilerError::Persistence { .. }));
    assert!(has_finalizer(&stored_postgres(&store).await, DEFAULT_FINALIZER));
    assert!(store.contains::<Secret>("vault", TEST));
}

#[tokio::test]
async fn test_deletion_without_our_finalizer_is_skipped() {
    let store = Arc::new(MemoryStore::new());
    seed_test_strategy(&store);
    let mut pg = test_postgres();
    pg.metadata.finalizers = Some(vec!["example.com/other".to_string()]);
    store.insert(pg).unwrap();
    store.delete::<Postgres>(TEST, TEST).await.unwrap();
    let provider = ScriptedProvider::ready();
    let reconciler = postgres_reconciler(&store, vec![postgres_provider(&provider)]);

    let outcome = reconciler
        .reconcile(&key(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::done());
    assert_eq!(provider.deletes(), 0);
    assert!(store.contains::<Postgres>(TEST, TEST));
}

#[tokio::test]
async fn test_cancelled_provider_call_returns_cancelled() {
    let store = Arc::new(MemoryStore::new());
    seed_test_strategy(&store);
    store.insert(test_postgres()).unwrap();
    let provider = ScriptedProvider::new(TEST, TEST, CreateBehaviour::Hang);
    let reconciler = postgres_reconciler(&store, vec![postgres_provider(&provider)]);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = tokio::time::timeout(Duration::from_secs(5), reconciler.reconcile(&key(), &cancel))
        .await
        .expect("reconcile should stop once cancelled")
        .unwrap_err();

    assert!(matches!(err, ReconcilerError::Cancelled));
    assert!(!store.contains::<Secret>(TEST, TEST));
}

#[tokio::test]
async fn test_custom_finalizer_name() {
    let store = Arc::new(MemoryStore::new());
    seed_test_strategy(&store);
    store.insert(test_postgres()).unwrap();
    let provider = ScriptedProvider::ready();
    let reconciler = postgres_reconciler(&store, vec![postgres_provider(&provider)])
        .with_finalizer("example.com/cleanup");

    reconciler
        .reconcile(&key(), &CancellationToken::new())
        .await
        .unwrap();

    let pg = stored_postgres(&store).await;
    assert!(has_finalizer(&pg, "example.com/cleanup"));
    assert!(!has_finalizer(&pg, DEFAULT_FINALIZER));
}

#[tokio::test]
async fn test_smtp_credentials_from_strategy_parameters() {
    let store = Arc::new(MemoryStore::new());
    seed_strategies(
        &store,
        &[(
            "openshift",
            r#"{"development": {"strategy": "openshift", "parameters": {
                "host": "smtp.example.com", "username": "mailer", "password": "hunter2"
            }}}"#,
        )],
    );
    let mut request = SmtpCredentialSet::new(
        "mailer",
        SmtpCredentialSetSpec {
            deployment_type: "openshift".to_string(),
            tier: "development".to_string(),
            secret_ref: None,
        },
    );
    request.metadata.namespace = Some("apps".to_string());
    store.insert(request).unwrap();

    let providers: Vec<Arc<dyn Provider<SmtpCredentialSet>>> =
        vec![Arc::new(InClusterSmtpProvider::new())];
    let reconciler: Reconciler<SmtpCredentialSet, MemoryStore> =
        Reconciler::new(Arc::clone(&store), config_manager(&store), providers);

    let outcome = reconciler
        .reconcile(&ObjectKey::new("apps", "mailer"), &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.requeue);
    let secret = store
        .get::<Secret>("apps", "mailer-connection")
        .await
        .unwrap()
        .unwrap();
    let data = secret.data.unwrap();
    assert_eq!(data["host"].0, b"smtp.example.com".to_vec());
    assert_eq!(data["port"].0, b"587".to_vec());

    let stored = store
        .get::<SmtpCredentialSet>("apps", "mailer")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status.unwrap().phase, Phase::Complete);
}
