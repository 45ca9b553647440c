//! In-memory integration tests for the periodic drift audit.

use super::helpers::{Harness, INSTANCE, NAMESPACE, harness, key, orders_spec};
use rstest::rstest;
use sqlmi_operator::database::{
    domain::{AlterSettings, ResourceKey},
    services::{AuditError, IdentityFinding},
};

async fn settled_with_snapshot_isolation(harness: &Harness, key: &ResourceKey) {
    harness
        .store
        .apply(key, orders_spec().with_snapshot_isolation(true))
        .expect("apply resource");
    harness
        .reconcile_until_done(key)
        .await
        .expect("reconcile settles");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn converged_database_passes_audit(harness: Harness, key: ResourceKey) {
    settled_with_snapshot_isolation(&harness, &key).await;
    let identity = harness
        .stored(&key)
        .await
        .status()
        .identity()
        .expect("identity bound");

    let report = harness
        .audit_service()
        .audit(&key)
        .await
        .expect("audit succeeds");

    assert_eq!(report.finding, IdentityFinding::Consistent(identity));
    assert_eq!(report.drift, None);
    assert!(!report.requires_intervention());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn audit_reports_live_values_without_correcting(harness: Harness, key: ResourceKey) {
    settled_with_snapshot_isolation(&harness, &key).await;
    harness
        .server
        .alter_out_of_band(
            "orders",
            &AlterSettings {
                allow_snapshot_isolation: Some(false),
                ..AlterSettings::default()
            },
        )
        .expect("manual change");
    harness.server.clear_statements().expect("clear log");
    let before = harness.stored(&key).await;

    let report = harness
        .audit_service()
        .audit(&key)
        .await
        .expect("audit succeeds");

    let drift = report.drift.as_ref().expect("drift reported");
    assert_eq!(drift.allow_snapshot_isolation, Some(false));
    assert!(report.requires_intervention());
    assert!(harness.server.statements().expect("statement log").is_empty());
    assert_eq!(harness.stored(&key).await, before);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn audit_flags_restored_database(harness: Harness, key: ResourceKey) {
    settled_with_snapshot_isolation(&harness, &key).await;
    harness
        .server
        .restore_as_new_identity("orders")
        .expect("restore")
        .expect("database exists");

    let report = harness
        .audit_service()
        .audit(&key)
        .await
        .expect("audit succeeds");

    assert!(matches!(report.finding, IdentityFinding::Mismatch(_)));
    assert!(report.requires_intervention());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn audit_of_unknown_resource_fails(harness: Harness, key: ResourceKey) {
    let result = harness.audit_service().audit(&key).await;

    assert!(matches!(result, Err(AuditError::ResourceNotFound(missing)) if missing == key));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn audit_requires_ready_instance(harness: Harness, key: ResourceKey) {
    harness.store.apply(&key, orders_spec()).expect("apply resource");
    harness
        .instances
        .set_state(NAMESPACE, INSTANCE, "Provisioning")
        .expect("change state");

    let result = harness.audit_service().audit(&key).await;

    assert!(matches!(
        result,
        Err(AuditError::InstanceNotReady { ref state, .. }) if state == "Provisioning"
    ));
    assert_eq!(harness.server.sessions_opened().expect("session count"), 0);
}
