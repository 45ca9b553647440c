//! Shared world state for database reconciliation BDD scenarios.

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
        domain::ResourceKey,
        services::{
            AuditError, AuditReport, AuditService, DatabaseReconciler, DriftAuditor,
            ReconcileOutcome, ReconcileResult, ReconcilerPorts, TargetResolver,
        },
    },
};

/// Namespace every scenario resource lives in.
pub const NAMESPACE: &str = "payments";

/// Secret holding the instance login, in the form `namespace/name`.
pub const LOGIN_SECRET: (&str, &str) = ("arc", "sql-mi-1-login");

/// Login accepted by the in-memory server.
pub const LOGIN: (&str, &str) = ("sa", "Str0ng!Passw0rd");

/// Reconciler type used by the BDD world.
pub type TestReconciler = DatabaseReconciler<
    InMemoryResourceStore,
    InMemoryAuditScheduler,
    StaticCredentialSource,
    InMemoryInstanceDirectory,
    InMemorySqlServer,
    DefaultClock,
>;

/// Audit service type used by the BDD world.
pub type TestAuditService = AuditService<
    InMemoryResourceStore,
    StaticCredentialSource,
    InMemoryInstanceDirectory,
    InMemorySqlServer,
    DefaultClock,
>;

/// Scenario world for database reconciliation behaviour tests.
pub struct ReconcileWorld {
    pub store: InMemoryResourceStore,
    pub scheduler: InMemoryAuditScheduler,
    pub instances: InMemoryInstanceDirectory,
    pub server: InMemorySqlServer,
    pub reconciler: TestReconciler,
    pub audits: TestAuditService,
    pub resource: Option<ResourceKey>,
    pub last_pass: Option<ReconcileResult<ReconcileOutcome>>,
    pub last_audit: Option<Result<AuditReport, AuditError>>,
}

impl ReconcileWorld {
    /// Creates a world with empty adapters apart from the instance login.
    ///
    /// # Panics
    ///
    /// Panics if the login cannot be seeded.
    #[must_use]
    pub fn new() -> Self {
        let scheduler = InMemoryAuditScheduler::new();
        let store = InMemoryResourceStore::with_owned_audits(scheduler.clone());
        let credentials = Arc::new(StaticCredentialSource::new());
        let instances = InMemoryInstanceDirectory::new();
        let server = InMemorySqlServer::new();
        let settings = OperatorConfig::default().reconciler_settings();

        let audits = AuditService::new(
            Arc::new(store.clone()),
            TargetResolver::new(
                Arc::clone(&credentials),
                Arc::new(instances.clone()),
                settings.default_port,
            ),
            DriftAuditor::new(Arc::new(server.clone()), Arc::new(DefaultClock)),
        );
        let reconciler = DatabaseReconciler::new(
            ReconcilerPorts {
                store: Arc::new(store.clone()),
                scheduler: Arc::new(scheduler.clone()),
                credentials: Arc::clone(&credentials),
                instances: Arc::new(instances.clone()),
                connector: Arc::new(server.clone()),
            },
            settings,
            Arc::new(DefaultClock),
        );

        let (namespace, name) = LOGIN_SECRET;
        let (username, password) = LOGIN;
        credentials
            .insert(namespace, name, username, password)
            .expect("fresh credential source accepts secrets");

        Self {
            store,
            scheduler,
            instances,
            server,
            reconciler,
            audits,
            resource: None,
            last_pass: None,
            last_audit: None,
        }
    }

    /// Returns the key of the scenario resource.
    ///
    /// # Errors
    ///
    /// Returns an error when no resource step ran.
    pub fn resource_key(&self) -> Result<ResourceKey, eyre::Report> {
        self.resource
            .clone()
            .ok_or_else(|| eyre::eyre!("missing resource in scenario world"))
    }
}

impl Default for ReconcileWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> ReconcileWorld {
    ReconcileWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
