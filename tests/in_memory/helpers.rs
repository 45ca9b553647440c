//! Shared test helpers for in-memory reconciliation integration tests.

use std::sync::Arc;

use mockable::DefaultClock;
use rstest::fixture;
use sqlmi_operator::{
    config::OperatorConfig,
    database::{
        adapters::memory::{
            InMemoryAuditScheduler, InMemoryInstanceDirectory, InMemoryResourceStore,
            InMemorySqlServer, StaticCredentialSource,
        },
        domain::{DatabaseName, DatabaseResource, DesiredConfig, ResourceKey},
        ports::{DatabaseResourceStore, ManagedInstance, SecretRef, SqlCredentials},
        services::{
            AuditService, DatabaseReconciler, DriftAuditor, ReconcileOutcome, ReconcileResult,
            ReconcilerPorts, TargetResolver,
        },
    },
};

/// Namespace every test resource lives in.
pub const NAMESPACE: &str = "payments";

/// Managed instance hosting the test databases.
pub const INSTANCE: &str = "sql-mi-1";

const LOGIN_USER: &str = "sa";
const LOGIN_PASSWORD: &str = "Str0ng!Passw0rd";

/// Upper bound on passes before a resource is expected to settle.
const MAX_PASSES: usize = 8;

/// Reconciler wired to in-memory adapters.
pub type TestReconciler = DatabaseReconciler<
    InMemoryResourceStore,
    InMemoryAuditScheduler,
    StaticCredentialSource,
    InMemoryInstanceDirectory,
    InMemorySqlServer,
    DefaultClock,
>;

/// Audit service wired to in-memory adapters.
pub type TestAuditService = AuditService<
    InMemoryResourceStore,
    StaticCredentialSource,
    InMemoryInstanceDirectory,
    InMemorySqlServer,
    DefaultClock,
>;

/// In-memory collaborators shared by the reconciler and the test.
pub struct Harness {
    pub store: InMemoryResourceStore,
    pub scheduler: InMemoryAuditScheduler,
    pub credentials: StaticCredentialSource,
    pub instances: InMemoryInstanceDirectory,
    pub server: InMemorySqlServer,
    pub reconciler: Arc<TestReconciler>,
}

impl Harness {
    /// Creates a harness with one ready instance and its login.
    ///
    /// # Panics
    ///
    /// Panics if an in-memory adapter cannot be seeded.
    #[must_use]
    pub fn new() -> Self {
        let scheduler = InMemoryAuditScheduler::new();
        let store = InMemoryResourceStore::with_owned_audits(scheduler.clone());
        let credentials = StaticCredentialSource::new();
        credentials
            .insert("arc", "sql-mi-1-login", LOGIN_USER, LOGIN_PASSWORD)
            .expect("seed login");
        let instances = InMemoryInstanceDirectory::new();
        instances
            .insert(NAMESPACE, INSTANCE, ready_instance())
            .expect("seed instance");
        let server = InMemorySqlServer::new();
        server
            .require_login(SqlCredentials::new(LOGIN_USER, LOGIN_PASSWORD))
            .expect("require login");

        let settings = OperatorConfig::default().reconciler_settings();
        let reconciler = Arc::new(DatabaseReconciler::new(
            ReconcilerPorts {
                store: Arc::new(store.clone()),
                scheduler: Arc::new(scheduler.clone()),
                credentials: Arc::new(credentials.clone()),
                instances: Arc::new(instances.clone()),
                connector: Arc::new(server.clone()),
            },
            settings,
            Arc::new(DefaultClock),
        ));
        Self {
            store,
            scheduler,
            credentials,
            instances,
            server,
            reconciler,
        }
    }

    /// Builds an audit service over the same collaborators.
    #[must_use]
    pub fn audit_service(&self) -> TestAuditService {
        let settings = OperatorConfig::default().reconciler_settings();
        AuditService::new(
            Arc::new(self.store.clone()),
            TargetResolver::new(
                Arc::new(self.credentials.clone()),
                Arc::new(self.instances.clone()),
                settings.default_port,
            ),
            DriftAuditor::new(Arc::new(self.server.clone()), Arc::new(DefaultClock)),
        )
    }

    /// Runs passes until one reports [`ReconcileOutcome::Done`] and returns
    /// every outcome.
    ///
    /// # Errors
    ///
    /// Returns the first failing pass.
    ///
    /// # Panics
    ///
    /// Panics if the resource keeps requesting passes.
    pub async fn reconcile_until_done(
        &self,
        key: &ResourceKey,
    ) -> ReconcileResult<Vec<ReconcileOutcome>> {
        let mut outcomes = Vec::new();
        for _ in 0..MAX_PASSES {
            let outcome = self.reconciler.reconcile(key).await?;
            outcomes.push(outcome);
            if outcome == ReconcileOutcome::Done {
                return Ok(outcomes);
            }
        }
        panic!("resource {key} did not settle after {MAX_PASSES} passes: {outcomes:?}");
    }

    /// Returns the stored resource.
    ///
    /// # Panics
    ///
    /// Panics if the store fails or the resource is absent.
    pub async fn stored(&self, key: &ResourceKey) -> DatabaseResource {
        self.store
            .get(key)
            .await
            .expect("store lookup")
            .expect("resource exists")
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Provides a fresh harness for each test.
#[fixture]
pub fn harness() -> Harness {
    Harness::new()
}

/// Provides the key of the orders resource.
#[fixture]
pub fn key() -> ResourceKey {
    ResourceKey::new(NAMESPACE, "orders-db").expect("valid key")
}

/// Returns a spec for the `orders` database with server defaults.
///
/// # Panics
///
/// Panics if the database name is rejected.
#[must_use]
pub fn orders_spec() -> DesiredConfig {
    DesiredConfig::new(DatabaseName::new("orders").expect("valid name"), INSTANCE)
}

/// Returns a ready instance using the seeded login.
#[must_use]
pub fn ready_instance() -> ManagedInstance {
    ManagedInstance {
        state: "Ready".to_owned(),
        primary_endpoint: None,
        login_ref: SecretRef {
            namespace: "arc".to_owned(),
            name: "sql-mi-1-login".to_owned(),
        },
    }
}
