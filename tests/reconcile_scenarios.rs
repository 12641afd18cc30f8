//! End-to-end reconciliation scenarios against the in-memory stores and the
//! mock PlanetScale API.

use std::sync::Arc;
use std::time::Duration;

use kube_runtime::controller::Action;
use tokio_util::sync::CancellationToken;

use provider_planetscale::controller::connector::{PlanetScaleResource, ProviderConnector};
use provider_planetscale::controller::credentials::{
    CommonCredentialResolver, StaticServiceFactory,
};
use provider_planetscale::controller::publisher::MemoryPublisher;
use provider_planetscale::controller::reconciler::{
    GlobalRateLimiter, ManagedReconciler, RateLimiterConfig, ReconcileError, ReconcilerConfig,
};
use provider_planetscale::controller::store::memory::{
    MemoryProviderConfigStore, MemoryResourceStore, MemorySecretSource,
};
use provider_planetscale::crd::{
    ConditionReason, ConditionStatus, ConditionType, CredentialsSource, Database,
    DatabaseParameters, DatabaseSpec, DeletionPolicy, Managed, Password, PasswordParameters,
    PasswordSpec, ProviderConfig, ProviderConfigSpec, ProviderCredentials, ResourceSpec,
    SecretKeySelector, SecretReference,
};
use provider_planetscale::provider::planetscale::mock::{MockFailure, MockOp, MockPlanetScale};
use provider_planetscale::provider::planetscale::{BranchRef, DatabaseInfo, Region};

const POLL: Duration = Duration::from_secs(60);

struct Harness<K: PlanetScaleResource> {
    store: Arc<MemoryResourceStore<K>>,
    configs: Arc<MemoryProviderConfigStore>,
    api: Arc<MockPlanetScale>,
    publisher: Arc<MemoryPublisher>,
    limiter: Arc<GlobalRateLimiter>,
    shutdown: CancellationToken,
    reconciler: ManagedReconciler<K>,
}

fn harness<K: PlanetScaleResource>(reconcile_timeout: Duration) -> Harness<K> {
    harness_with_limiter(
        reconcile_timeout,
        RateLimiterConfig {
            rate_per_sec: 0.0,
            ..RateLimiterConfig::default()
        },
    )
}

fn harness_with_limiter<K: PlanetScaleResource>(
    reconcile_timeout: Duration,
    limits: RateLimiterConfig,
) -> Harness<K> {
    let store = Arc::new(MemoryResourceStore::<K>::new());
    let configs = Arc::new(MemoryProviderConfigStore::new());
    configs.insert(ProviderConfig::new(
        "default",
        ProviderConfigSpec {
            credentials: ProviderCredentials {
                source: CredentialsSource::Secret,
                secret_ref: Some(SecretKeySelector {
                    name: "planetscale".to_string(),
                    namespace: "crossplane-system".to_string(),
                    key: "token".to_string(),
                }),
                env: None,
                fs: None,
            },
        },
    ));
    let secrets = Arc::new(MemorySecretSource::new());
    secrets.insert("crossplane-system", "planetscale", "token", b"pscale_tkn_test");

    let api = Arc::new(MockPlanetScale::new());
    let publisher = Arc::new(MemoryPublisher::new());
    let limiter = Arc::new(GlobalRateLimiter::new(limits));
    let shutdown = CancellationToken::new();

    let connector = ProviderConnector::<K>::new(
        Arc::clone(&configs) as _,
        Arc::new(CommonCredentialResolver::new(secrets)),
        Arc::new(StaticServiceFactory::new(Arc::clone(&api) as _)),
    );
    let reconciler = ManagedReconciler::new(
        Arc::clone(&store) as _,
        Arc::new(connector),
        Arc::clone(&publisher) as _,
        Arc::clone(&limiter),
        ReconcilerConfig {
            poll_interval: POLL,
            reconcile_timeout,
        },
        shutdown.clone(),
    );

    Harness {
        store,
        configs,
        api,
        publisher,
        limiter,
        shutdown,
        reconciler,
    }
}

fn database(name: &str) -> Database {
    Database::new(
        name,
        DatabaseSpec {
            resource: ResourceSpec::default(),
            for_provider: DatabaseParameters {
                organization: "acme".to_string(),
                region: Some("us-east".to_string()),
                notes: None,
            },
        },
    )
}

fn password(name: &str) -> Password {
    Password::new(
        name,
        PasswordSpec {
            resource: ResourceSpec {
                write_connection_secret_to_ref: Some(SecretReference {
                    name: format!("{name}-conn"),
                    namespace: "apps".to_string(),
                }),
                ..ResourceSpec::default()
            },
            for_provider: PasswordParameters {
                organization: "acme".to_string(),
                database: "orders".to_string(),
                branch: "main".to_string(),
                role: Some("reader".to_string()),
            },
        },
    )
}

fn main_branch() -> BranchRef {
    BranchRef::new("acme", "orders", "main")
}

fn condition<K: Managed>(mg: &K, r#type: ConditionType) -> (ConditionStatus, ConditionReason) {
    let condition = mg
        .managed_status()
        .and_then(|s| s.resource.condition(r#type))
        .cloned()
        .expect("condition is set");
    (condition.status, condition.reason)
}

#[tokio::test]
async fn scenario_a_new_resource_is_created_once_and_bound() {
    let h = harness::<Database>(Duration::from_secs(5));
    h.store.apply(database("orders"));

    let action = h.reconciler.reconcile("orders").await.unwrap();

    assert_eq!(action, Action::requeue(POLL));
    assert_eq!(h.api.calls(MockOp::CreateDatabase), 1);
    let db = h.store.snapshot("orders").unwrap();
    assert_eq!(db.external_name(), Some("orders"));
    assert_eq!(
        condition(&db, ConditionType::Synced),
        (ConditionStatus::True, ConditionReason::ReconcileSuccess)
    );
    assert_eq!(
        condition(&db, ConditionType::Ready),
        (ConditionStatus::False, ConditionReason::Creating)
    );
    assert_eq!(h.configs.usages().len(), 1);
}

#[tokio::test]
async fn scenario_b_bound_but_missing_resource_is_recreated_under_its_name() {
    let h = harness::<Database>(Duration::from_secs(5));
    let mut db = database("orders");
    db.set_external_name("db-123");
    h.store.apply(db);

    h.reconciler.reconcile("orders").await.unwrap();

    assert_eq!(h.api.calls(MockOp::CreateDatabase), 1);
    assert!(h.api.database("acme", "db-123").is_some());
    let db = h.store.snapshot("orders").unwrap();
    assert_eq!(db.external_name(), Some("db-123"));
}

#[tokio::test]
async fn scenario_c_transient_observe_error_is_recorded_without_mutation() {
    let h = harness::<Database>(Duration::from_secs(5));
    h.store.apply(database("orders"));
    h.api.fail_next(MockOp::GetDatabase, MockFailure::Status(503));

    let err = h.reconciler.reconcile("orders").await.unwrap_err();

    assert!(matches!(err, ReconcileError::Observe(_)));
    let db = h.store.snapshot("orders").unwrap();
    assert_eq!(
        condition(&db, ConditionType::Synced),
        (ConditionStatus::False, ConditionReason::ObserveError)
    );
    assert_eq!(h.api.calls(MockOp::CreateDatabase), 0);
    assert_eq!(h.api.calls(MockOp::DeleteDatabase), 0);

    // The failed key backs off until a pass succeeds
    let key = h.reconciler.limiter_key("orders");
    assert!(h.limiter.next_backoff(&key) > Duration::ZERO);
    h.reconciler.reconcile("orders").await.unwrap();
    assert_eq!(h.limiter.failures(&key), 0);
}

#[tokio::test]
async fn scenario_d_deleting_with_external_resource_gone_releases_object() {
    let h = harness::<Database>(Duration::from_secs(5));
    let mut db = database("orders");
    db.set_external_name("orders");
    db.add_managed_finalizer();
    h.store.apply(db);
    h.store.request_delete("orders");

    let action = h.reconciler.reconcile("orders").await.unwrap();

    assert_eq!(action, Action::await_change());
    assert_eq!(h.api.calls(MockOp::DeleteDatabase), 1);
    assert!(h.store.snapshot("orders").is_none());

    // Nothing left to do for a vanished object
    let action = h.reconciler.reconcile("orders").await.unwrap();
    assert_eq!(action, Action::await_change());
    assert_eq!(h.api.calls(MockOp::DeleteDatabase), 1);
}

#[tokio::test]
async fn scenario_e_drift_without_mutable_fields_still_syncs() {
    let h = harness::<Database>(Duration::from_secs(5));
    h.api.insert_database(
        "acme",
        DatabaseInfo {
            id: Some("db-1".to_string()),
            name: "orders".to_string(),
            state: Some("ready".to_string()),
            region: Some(Region {
                slug: "eu-west".to_string(),
                display_name: None,
            }),
            notes: None,
            html_url: None,
            created_at: None,
        },
    );
    let mut db = database("orders");
    db.set_external_name("orders");
    h.store.apply(db);

    h.reconciler.reconcile("orders").await.unwrap();

    let db = h.store.snapshot("orders").unwrap();
    assert_eq!(
        condition(&db, ConditionType::Synced),
        (ConditionStatus::True, ConditionReason::ReconcileSuccess)
    );
    assert_eq!(
        condition(&db, ConditionType::Ready),
        (ConditionStatus::True, ConditionReason::Available)
    );
    assert_eq!(
        h.api.database("acme", "orders").unwrap().region_slug(),
        Some("eu-west")
    );
    assert_eq!(h.api.calls(MockOp::CreateDatabase), 0);
}

#[tokio::test]
async fn converged_resource_passes_are_idempotent() {
    let h = harness::<Database>(Duration::from_secs(5));
    h.api.set_initial_database_state("ready");
    h.store.apply(database("orders"));

    h.reconciler.reconcile("orders").await.unwrap();
    h.reconciler.reconcile("orders").await.unwrap();
    let writes = h.store.writes();
    let status_writes = h.store.status_writes();

    h.reconciler.reconcile("orders").await.unwrap();
    h.reconciler.reconcile("orders").await.unwrap();

    assert_eq!(h.store.writes(), writes);
    assert_eq!(h.store.status_writes(), status_writes);
    assert_eq!(h.api.calls(MockOp::CreateDatabase), 1);
    let db = h.store.snapshot("orders").unwrap();
    assert_eq!(
        condition(&db, ConditionType::Ready),
        (ConditionStatus::True, ConditionReason::Available)
    );
}

#[tokio::test]
async fn database_becomes_ready_after_provisioning() {
    let h = harness::<Database>(Duration::from_secs(5));
    h.store.apply(database("orders"));

    h.reconciler.reconcile("orders").await.unwrap();
    h.reconciler.reconcile("orders").await.unwrap();
    let db = h.store.snapshot("orders").unwrap();
    assert_eq!(
        condition(&db, ConditionType::Ready),
        (ConditionStatus::False, ConditionReason::Unavailable)
    );

    h.api.set_database_state("acme", "orders", "ready");
    h.reconciler.reconcile("orders").await.unwrap();
    let db = h.store.snapshot("orders").unwrap();
    assert_eq!(
        condition(&db, ConditionType::Ready),
        (ConditionStatus::True, ConditionReason::Available)
    );
    let at_provider = db.status.unwrap().at_provider.unwrap();
    assert_eq!(at_provider.state.as_deref(), Some("ready"));
    assert_eq!(at_provider.region.as_deref(), Some("us-east"));
}

#[tokio::test]
async fn password_is_created_and_connection_details_published() {
    let h = harness::<Password>(Duration::from_secs(5));
    h.store.apply(password("orders-app"));

    h.reconciler.reconcile("orders-app").await.unwrap();

    let pw = h.store.snapshot("orders-app").unwrap();
    let id = pw.external_name().unwrap().to_string();
    assert!(id.starts_with("pw-"));
    let details = h.publisher.secret("apps", "orders-app-conn").unwrap();
    let expected = format!("pscale_pw_{id}");
    assert_eq!(details.get("password"), Some(expected.as_bytes()));
    assert_eq!(details.get("database"), Some(b"orders".as_slice()));
    assert!(details.get("host").is_some());
    assert!(details.get("username").is_some());

    // The next pass observes it by id and does not publish again
    h.reconciler.reconcile("orders-app").await.unwrap();
    assert_eq!(h.publisher.publishes(), 1);
    let pw = h.store.snapshot("orders-app").unwrap();
    assert_eq!(
        condition(&pw, ConditionType::Ready),
        (ConditionStatus::True, ConditionReason::Available)
    );
}

#[tokio::test]
async fn lost_create_response_does_not_create_twice() {
    let h = harness::<Password>(Duration::from_secs(5));
    h.store.apply(password("orders-app"));
    h.api
        .fail_next(MockOp::CreatePassword, MockFailure::LostResponse);

    let err = h.reconciler.reconcile("orders-app").await.unwrap_err();
    assert!(matches!(err, ReconcileError::Create(_)));
    let pw = h.store.snapshot("orders-app").unwrap();
    assert_eq!(
        condition(&pw, ConditionType::Synced),
        (ConditionStatus::False, ConditionReason::CreateError)
    );

    // The orphan is found by display name and adopted
    h.reconciler.reconcile("orders-app").await.unwrap();

    assert_eq!(h.api.calls(MockOp::CreatePassword), 1);
    let stored = h.api.passwords(&main_branch());
    assert_eq!(stored.len(), 1);
    let pw = h.store.snapshot("orders-app").unwrap();
    assert_eq!(pw.external_name(), Some(stored[0].id.as_str()));

    // Its plain text is gone, so it never reports ready
    let ready = pw
        .managed_status()
        .and_then(|s| s.resource.condition(ConditionType::Ready))
        .cloned()
        .unwrap();
    assert_eq!(ready.status, ConditionStatus::False);
    assert_eq!(ready.reason, ConditionReason::Unavailable);
    assert!(ready.message.unwrap().contains("password"));
}

#[tokio::test]
async fn password_whose_secret_cannot_be_published_is_recreated() {
    let h = harness::<Password>(Duration::from_secs(5));
    h.store.apply(password("orders-app"));
    h.publisher.set_reject(true);

    let err = h.reconciler.reconcile("orders-app").await.unwrap_err();

    assert!(matches!(err, ReconcileError::Publish(_)));
    let pw = h.store.snapshot("orders-app").unwrap();
    assert_eq!(pw.external_name(), None);
    assert_eq!(
        condition(&pw, ConditionType::Synced),
        (ConditionStatus::False, ConditionReason::PublishConnectionError)
    );
    assert_eq!(h.api.calls(MockOp::DeletePassword), 1);
    assert!(h.api.passwords(&main_branch()).is_empty());

    h.publisher.set_reject(false);
    h.reconciler.reconcile("orders-app").await.unwrap();
    h.reconciler.reconcile("orders-app").await.unwrap();

    assert_eq!(h.api.calls(MockOp::CreatePassword), 2);
    let pw = h.store.snapshot("orders-app").unwrap();
    let id = pw.external_name().unwrap().to_string();
    let details = h.publisher.secret("apps", "orders-app-conn").unwrap();
    let expected = format!("pscale_pw_{id}");
    assert_eq!(details.get("password"), Some(expected.as_bytes()));
    assert_eq!(
        condition(&pw, ConditionType::Ready),
        (ConditionStatus::True, ConditionReason::Available)
    );
}

#[tokio::test(start_paused = true)]
async fn global_rate_limit_defers_pass_without_external_calls() {
    let h = harness_with_limiter::<Database>(
        Duration::from_secs(5),
        RateLimiterConfig {
            rate_per_sec: 1.0,
            burst: 1.0,
            ..RateLimiterConfig::default()
        },
    );
    h.store.apply(database("orders"));

    h.reconciler.reconcile("orders").await.unwrap();
    let gets = h.api.calls(MockOp::GetDatabase);
    let writes = h.store.writes();

    let action = h.reconciler.reconcile("orders").await.unwrap();

    // The clock is paused, so the bucket is exactly one token short
    assert_eq!(action, Action::requeue(Duration::from_secs(1)));
    assert_eq!(h.api.calls(MockOp::GetDatabase), gets);
    assert_eq!(h.api.calls(MockOp::CreateDatabase), 1);
    assert_eq!(h.store.writes(), writes);
    assert_eq!(h.limiter.failures(&h.reconciler.limiter_key("orders")), 0);
}

#[tokio::test]
async fn password_deleted_out_of_band_is_replaced_and_rebound() {
    let h = harness::<Password>(Duration::from_secs(5));
    h.store.apply(password("orders-app"));
    h.reconciler.reconcile("orders-app").await.unwrap();
    let first = h
        .store
        .snapshot("orders-app")
        .unwrap()
        .external_name()
        .unwrap()
        .to_string();

    h.api.remove_password(&main_branch(), &first);
    h.reconciler.reconcile("orders-app").await.unwrap();

    let second = h
        .store
        .snapshot("orders-app")
        .unwrap()
        .external_name()
        .unwrap()
        .to_string();
    assert_ne!(first, second);
    assert_eq!(h.api.calls(MockOp::CreatePassword), 2);
}

#[tokio::test]
async fn bound_external_name_is_never_reassigned() {
    let h = harness::<Database>(Duration::from_secs(5));
    h.api.set_initial_database_state("ready");
    let mut db = database("orders");
    db.set_external_name("orders-prod");
    h.store.apply(db);

    for _ in 0..3 {
        h.reconciler.reconcile("orders").await.unwrap();
    }

    assert_eq!(
        h.store.snapshot("orders").unwrap().external_name(),
        Some("orders-prod")
    );
    assert!(h.api.database("acme", "orders").is_none());
    assert_eq!(h.api.database_count(), 1);
}

#[tokio::test]
async fn deletion_is_idempotent_and_unpublishes() {
    let h = harness::<Password>(Duration::from_secs(5));
    h.store.apply(password("orders-app"));
    h.reconciler.reconcile("orders-app").await.unwrap();
    assert!(h.publisher.secret("apps", "orders-app-conn").is_some());

    h.api
        .fail_next(MockOp::DeletePassword, MockFailure::LostResponse);
    h.store.request_delete("orders-app");

    let err = h.reconciler.reconcile("orders-app").await.unwrap_err();
    assert!(matches!(err, ReconcileError::Delete(_)));
    let pw = h.store.snapshot("orders-app").unwrap();
    assert_eq!(
        condition(&pw, ConditionType::Ready),
        (ConditionStatus::False, ConditionReason::Deleting)
    );
    assert_eq!(
        condition(&pw, ConditionType::Synced),
        (ConditionStatus::False, ConditionReason::DeleteError)
    );

    // The password is already gone; the retry treats that as success
    h.reconciler.reconcile("orders-app").await.unwrap();
    assert!(h.store.snapshot("orders-app").is_none());
    assert!(h.api.passwords(&main_branch()).is_empty());
    assert!(h.publisher.secret("apps", "orders-app-conn").is_none());
}

#[tokio::test]
async fn orphan_policy_keeps_external_resource() {
    let h = harness::<Database>(Duration::from_secs(5));
    let mut db = database("orders");
    db.spec.resource.deletion_policy = DeletionPolicy::Orphan;
    h.store.apply(db);
    h.reconciler.reconcile("orders").await.unwrap();

    h.store.request_delete("orders");
    h.reconciler.reconcile("orders").await.unwrap();

    assert!(h.store.snapshot("orders").is_none());
    assert!(h.api.database("acme", "orders").is_some());
    assert_eq!(h.api.calls(MockOp::DeleteDatabase), 0);
}

#[tokio::test]
async fn unauthorized_token_surfaces_as_observe_error() {
    let h = harness::<Database>(Duration::from_secs(5));
    h.store.apply(database("orders"));
    h.api
        .fail_next(MockOp::GetDatabase, MockFailure::Unauthorized);

    let err = h.reconciler.reconcile("orders").await.unwrap_err();

    assert_eq!(err.reason(), ConditionReason::ObserveError);
    assert_eq!(h.api.calls(MockOp::CreateDatabase), 0);
}

#[tokio::test(start_paused = true)]
async fn slow_external_call_hits_the_pass_deadline() {
    let h = harness::<Database>(Duration::from_millis(100));
    h.store.apply(database("orders"));
    h.api.set_latency(Duration::from_secs(10));

    let err = h.reconciler.reconcile("orders").await.unwrap_err();

    assert!(matches!(err, ReconcileError::Observe(_)));
    let db = h.store.snapshot("orders").unwrap();
    assert_eq!(
        condition(&db, ConditionType::Synced),
        (ConditionStatus::False, ConditionReason::ObserveError)
    );
    assert_eq!(h.api.calls(MockOp::CreateDatabase), 0);
}

#[tokio::test]
async fn shutdown_cancels_the_pass_before_any_external_mutation() {
    let h = harness::<Database>(Duration::from_secs(5));
    h.store.apply(database("orders"));
    h.shutdown.cancel();

    let result = h.reconciler.reconcile("orders").await;

    assert!(result.is_err());
    assert_eq!(h.api.calls(MockOp::CreateDatabase), 0);
    assert_eq!(h.api.database_count(), 0);
}
