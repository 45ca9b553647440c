//! In-memory integration tests for the event-driven reconcile loop.

use std::sync::Arc;

use super::helpers::{Harness, harness, orders_spec};
use rstest::rstest;
use sqlmi_operator::{
    config::OperatorConfig,
    database::{
        domain::{DatabaseName, DatabasePhase, ResourceKey},
        services::ReconcileDriver,
    },
};
use tokio::sync::mpsc;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn driver_converges_every_announced_resource(harness: Harness) {
    let orders = ResourceKey::new("payments", "orders-db").expect("valid key");
    let ledger = ResourceKey::new("payments", "ledger-db").expect("valid key");
    let mut ledger_spec = orders_spec();
    ledger_spec.name = DatabaseName::new("ledger").expect("valid name");
    harness.store.apply(&orders, orders_spec()).expect("apply orders");
    harness.store.apply(&ledger, ledger_spec).expect("apply ledger");

    let driver = ReconcileDriver::new(
        Arc::clone(&harness.reconciler),
        OperatorConfig::default().backoff(),
    );
    let (events, receiver) = mpsc::channel(8);
    events.send(orders.clone()).await.expect("announce orders");
    events.send(ledger.clone()).await.expect("announce ledger");
    events.send(orders.clone()).await.expect("announce orders again");
    drop(events);

    driver.run(receiver).await;

    assert_eq!(
        harness.server.database_names().expect("catalog"),
        vec!["ledger".to_owned(), "orders".to_owned()]
    );
    for key in [&orders, &ledger] {
        let stored = harness.stored(key).await;
        assert_eq!(stored.status().phase(), DatabasePhase::Synced);
        assert!(stored.status().identity().is_some());
    }
    assert_eq!(harness.scheduler.all().expect("scheduled audits").len(), 2);
}
