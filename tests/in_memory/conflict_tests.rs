//! In-memory integration tests for status writes that race spec edits.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mockable::DefaultClock;
use rstest::rstest;
use sqlmi_operator::{
    config::OperatorConfig,
    database::{
        adapters::memory::InMemoryResourceStore,
        domain::{DatabasePhase, DatabaseResource, DesiredConfig, ResourceKey},
        ports::{DatabaseResourceStore, ResourceStoreResult},
        services::{DatabaseReconciler, ReconcileOutcome, ReconcilerPorts},
    },
};

use super::helpers::{Harness, harness, key, orders_spec};

/// Store that applies one pending spec edit just before the next status
/// write, so that write carries a stale version.
struct SpecEditRacingStore {
    inner: InMemoryResourceStore,
    edit: Mutex<Option<DesiredConfig>>,
}

impl SpecEditRacingStore {
    fn new(inner: InMemoryResourceStore, edit: DesiredConfig) -> Self {
        Self {
            inner,
            edit: Mutex::new(Some(edit)),
        }
    }

    fn edit_applied(&self) -> bool {
        self.edit.lock().expect("edit lock").is_none()
    }
}

#[async_trait]
impl DatabaseResourceStore for SpecEditRacingStore {
    async fn get(&self, key: &ResourceKey) -> ResourceStoreResult<Option<DatabaseResource>> {
        self.inner.get(key).await
    }

    async fn list(&self) -> ResourceStoreResult<Vec<DatabaseResource>> {
        self.inner.list().await
    }

    async fn update(&self, resource: &DatabaseResource) -> ResourceStoreResult<DatabaseResource> {
        self.inner.update(resource).await
    }

    async fn update_status(
        &self,
        resource: &DatabaseResource,
    ) -> ResourceStoreResult<DatabaseResource> {
        let pending = self.edit.lock().expect("edit lock").take();
        if let Some(spec) = pending {
            self.inner.apply(resource.key(), spec)?;
        }
        self.inner.update_status(resource).await
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn identity_survives_spec_edit_racing_the_first_status_write(
    harness: Harness,
    key: ResourceKey,
) {
    harness.store.apply(&key, orders_spec()).expect("apply resource");
    let store = Arc::new(SpecEditRacingStore::new(
        harness.store.clone(),
        orders_spec().with_compatibility_level(150),
    ));
    let reconciler = DatabaseReconciler::new(
        ReconcilerPorts {
            store: Arc::clone(&store),
            scheduler: Arc::new(harness.scheduler.clone()),
            credentials: Arc::new(harness.credentials.clone()),
            instances: Arc::new(harness.instances.clone()),
            connector: Arc::new(harness.server.clone()),
        },
        OperatorConfig::default().reconciler_settings(),
        Arc::new(DefaultClock),
    );

    let mut outcomes = Vec::new();
    for _ in 0..4 {
        let outcome = reconciler.reconcile(&key).await.expect("pass succeeds");
        outcomes.push(outcome);
        if outcome == ReconcileOutcome::Done {
            break;
        }
    }

    assert!(store.edit_applied());
    assert_eq!(outcomes.last(), Some(&ReconcileOutcome::Done));
    let stored = harness.stored(&key).await;
    assert_eq!(stored.spec().compatibility_level, Some(150));
    assert_eq!(stored.status().phase(), DatabasePhase::Synced);
    assert_eq!(
        stored.status().identity(),
        harness.server.identity_of("orders").expect("lookup")
    );
    let creates = harness
        .server
        .statements()
        .expect("statement log")
        .iter()
        .filter(|statement| statement.starts_with("CREATE DATABASE"))
        .count();
    assert_eq!(creates, 1);
    let live = harness
        .server
        .live_record("orders")
        .expect("lookup")
        .expect("database exists");
    assert_eq!(live.compatibility_level, 150);
}
