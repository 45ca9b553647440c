//! In-memory integration tests for creating and synchronizing databases.

use super::helpers::{Harness, INSTANCE, NAMESPACE, harness, key, orders_spec};
use sqlmi_operator::database::{
    domain::{
        AlterSettings, AuditSchedule, DATABASE_CLEANUP_GUARD, DEFAULT_AUDIT_SCHEDULE,
        DatabasePhase, ResourceKey,
    },
    services::{ErrorClass, ReconcileOutcome},
};
use rstest::rstest;

fn count_containing(statements: &[String], fragment: &str) -> usize {
    statements
        .iter()
        .filter(|statement| statement.contains(fragment))
        .count()
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn fresh_resource_is_created_guarded_and_audited(harness: Harness, key: ResourceKey) {
    harness.store.apply(&key, orders_spec()).expect("apply resource");

    let outcomes = harness
        .reconcile_until_done(&key)
        .await
        .expect("reconcile settles");

    assert_eq!(
        outcomes,
        vec![
            ReconcileOutcome::Requeue,
            ReconcileOutcome::Requeue,
            ReconcileOutcome::Done
        ]
    );
    let stored = harness.stored(&key).await;
    assert_eq!(stored.status().phase(), DatabasePhase::Synced);
    assert!(stored.has_delete_guard(DATABASE_CLEANUP_GUARD));
    let live_identity = harness.server.identity_of("orders").expect("identity lookup");
    assert_eq!(stored.status().identity(), live_identity);

    let statements = harness.server.statements().expect("statement log");
    assert_eq!(count_containing(&statements, "CREATE DATABASE [orders]"), 1);

    let audits = harness.scheduler.all().expect("scheduled audits");
    let audit = audits.first().expect("one audit scheduled");
    assert_eq!(audits.len(), 1);
    assert_eq!(&audit.owner, &key);
    assert_eq!(audit.schedule.as_str(), DEFAULT_AUDIT_SCHEDULE);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn settled_resource_is_left_alone(harness: Harness, key: ResourceKey) {
    harness.store.apply(&key, orders_spec()).expect("apply resource");
    harness
        .reconcile_until_done(&key)
        .await
        .expect("reconcile settles");
    let settled = harness.stored(&key).await;
    harness.server.clear_statements().expect("clear log");

    let outcome = harness
        .reconciler
        .reconcile(&key)
        .await
        .expect("pass succeeds");

    assert_eq!(outcome, ReconcileOutcome::Done);
    assert!(harness.server.statements().expect("statement log").is_empty());
    assert_eq!(
        harness.stored(&key).await.resource_version(),
        settled.resource_version()
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn drift_is_corrected_towards_desired_values(harness: Harness, key: ResourceKey) {
    let spec = orders_spec()
        .with_snapshot_isolation(true)
        .with_compatibility_level(150);
    harness.store.apply(&key, spec).expect("apply resource");
    harness
        .reconcile_until_done(&key)
        .await
        .expect("reconcile settles");
    harness
        .server
        .alter_out_of_band(
            "orders",
            &AlterSettings {
                parameterization: None,
                allow_snapshot_isolation: Some(false),
                compatibility_level: Some(130),
            },
        )
        .expect("manual change");
    harness.server.clear_statements().expect("clear log");

    let outcome = harness
        .reconciler
        .reconcile(&key)
        .await
        .expect("pass succeeds");

    assert_eq!(outcome, ReconcileOutcome::Done);
    let live = harness
        .server
        .live_record("orders")
        .expect("live lookup")
        .expect("database exists");
    assert!(live.allow_snapshot_isolation);
    assert_eq!(live.compatibility_level, 150);
    let statements = harness.server.statements().expect("statement log");
    assert_eq!(
        statements,
        vec![
            "ALTER DATABASE [orders] SET ALLOW_SNAPSHOT_ISOLATION ON".to_owned(),
            "ALTER DATABASE [orders] SET COMPATIBILITY_LEVEL = 150".to_owned(),
        ]
    );
    assert_eq!(
        harness.stored(&key).await.status().phase(),
        DatabasePhase::Synced
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn partially_failed_create_keeps_identity_and_heals(harness: Harness, key: ResourceKey) {
    harness
        .store
        .apply(&key, orders_spec().with_compatibility_level(150))
        .expect("apply resource");
    harness
        .server
        .reject_statements_containing("COMPATIBILITY_LEVEL")
        .expect("reject option");

    let guarded = harness.reconciler.reconcile(&key).await.expect("guard pass");
    let failure = harness
        .reconciler
        .reconcile(&key)
        .await
        .expect_err("option failure surfaces");

    assert_eq!(guarded, ReconcileOutcome::Requeue);
    assert_eq!(failure.class(), ErrorClass::PartialMutationFailure);
    assert!(failure.is_retryable());
    let errored = harness.stored(&key).await;
    assert_eq!(errored.status().phase(), DatabasePhase::Errored);
    let live_identity = harness.server.identity_of("orders").expect("identity lookup");
    assert!(live_identity.is_some());
    assert_eq!(errored.status().identity(), live_identity);

    harness.server.accept_all_statements().expect("accept options");
    harness
        .reconcile_until_done(&key)
        .await
        .expect("reconcile settles");

    let healed = harness.stored(&key).await;
    assert_eq!(healed.status().phase(), DatabasePhase::Synced);
    assert_eq!(healed.status().identity(), live_identity);
    let statements = harness.server.statements().expect("statement log");
    assert_eq!(count_containing(&statements, "CREATE DATABASE"), 1);
    let live = harness
        .server
        .live_record("orders")
        .expect("live lookup")
        .expect("database exists");
    assert_eq!(live.compatibility_level, 150);
}

#[rstest]
#[case::restored_from_backup(true)]
#[case::renamed_by_hand(false)]
#[tokio::test(flavor = "multi_thread")]
async fn replaced_database_is_an_integrity_violation(
    harness: Harness,
    key: ResourceKey,
    #[case] restore: bool,
) {
    harness.store.apply(&key, orders_spec()).expect("apply resource");
    harness
        .reconcile_until_done(&key)
        .await
        .expect("reconcile settles");
    let bound = harness.stored(&key).await.status().identity();
    if restore {
        harness
            .server
            .restore_as_new_identity("orders")
            .expect("restore")
            .expect("database exists");
    } else {
        assert!(
            harness
                .server
                .rename_out_of_band("orders", "orders_archive")
                .expect("rename")
        );
    }
    harness.server.clear_statements().expect("clear log");

    let err = harness
        .reconciler
        .reconcile(&key)
        .await
        .expect_err("identity disagreement surfaces");

    assert_eq!(err.class(), ErrorClass::IntegrityViolation);
    assert!(!err.is_retryable());
    assert!(harness.server.statements().expect("statement log").is_empty());
    assert_eq!(harness.stored(&key).await.status().identity(), bound);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn created_database_without_visible_identity_leaves_status_unbound(
    harness: Harness,
    key: ResourceKey,
) {
    harness.store.apply(&key, orders_spec()).expect("apply resource");
    harness.server.hide_identity_of("orders").expect("hide identity");
    let guarded = harness
        .reconciler
        .reconcile(&key)
        .await
        .expect("guard pass succeeds");
    assert_eq!(guarded, ReconcileOutcome::Requeue);
    let before = harness.stored(&key).await;

    let err = harness
        .reconciler
        .reconcile(&key)
        .await
        .expect_err("identity lookup comes back empty");

    assert_eq!(err.class(), ErrorClass::IntegrityViolation);
    assert!(!err.is_retryable());
    let after = harness.stored(&key).await;
    assert_eq!(after.status().identity(), None);
    assert_eq!(after.status(), before.status());
    assert_eq!(after.resource_version(), before.resource_version());
    assert!(harness.server.identity_of("orders").expect("lookup").is_some());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unready_instance_marks_resource_errored_until_ready(harness: Harness, key: ResourceKey) {
    harness.store.apply(&key, orders_spec()).expect("apply resource");
    assert!(
        harness
            .instances
            .set_state(NAMESPACE, INSTANCE, "Updating")
            .expect("change state")
    );

    let err = harness
        .reconciler
        .reconcile(&key)
        .await
        .expect_err("instance not ready");

    assert_eq!(err.class(), ErrorClass::PreconditionFailed);
    assert_eq!(
        harness.stored(&key).await.status().phase(),
        DatabasePhase::Errored
    );
    assert_eq!(harness.server.sessions_opened().expect("session count"), 0);

    harness
        .instances
        .set_state(NAMESPACE, INSTANCE, "Ready")
        .expect("change state");
    harness
        .reconcile_until_done(&key)
        .await
        .expect("reconcile settles");
    assert_eq!(
        harness.stored(&key).await.status().phase(),
        DatabasePhase::Synced
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn schedule_change_reschedules_audit(harness: Harness, key: ResourceKey) {
    harness.store.apply(&key, orders_spec()).expect("apply resource");
    harness
        .reconcile_until_done(&key)
        .await
        .expect("reconcile settles");
    let hourly = AuditSchedule::new("0 * * * *").expect("valid schedule");
    harness
        .store
        .apply(&key, orders_spec().with_schedule(hourly.clone()))
        .expect("apply schedule");

    let outcomes = harness
        .reconcile_until_done(&key)
        .await
        .expect("reconcile settles");

    assert_eq!(
        outcomes,
        vec![ReconcileOutcome::Requeue, ReconcileOutcome::Done]
    );
    let audits = harness.scheduler.all().expect("scheduled audits");
    assert_eq!(audits.len(), 1);
    let audit = audits.first().expect("one audit scheduled");
    assert_eq!(audit.schedule, hourly);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn missing_login_fails_without_touching_status(harness: Harness, key: ResourceKey) {
    harness.store.apply(&key, orders_spec()).expect("apply resource");
    harness
        .credentials
        .remove("arc", "sql-mi-1-login")
        .expect("remove login");
    let before = harness.stored(&key).await;

    let err = harness
        .reconciler
        .reconcile(&key)
        .await
        .expect_err("login missing");

    assert_eq!(err.class(), ErrorClass::PreconditionFailed);
    assert_eq!(harness.stored(&key).await, before);
}
