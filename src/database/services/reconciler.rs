//! Reconciliation control loop for database resources.
//!
//! One pass moves a database toward its desired configuration: resolve the
//! hosting instance and login, honour deletion, keep the delete-guard in
//! place, create or correct the database, record status, and make sure the
//! periodic audit is scheduled. Status only advances after the mutation it
//! describes has succeeded.

use async_trait::async_trait;
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{
    DriftComparator, DriftError, MutationError, MutationExecutor, Reconcile, TargetError,
    TargetResolver,
};
use crate::database::{
    domain::{
        AuditSchedule, AuthorityMode, DATABASE_CLEANUP_GUARD, DatabaseDomainError,
        DatabaseIdentity, DatabasePhase, DatabaseResource, ResourceKey, ScheduledAudit,
    },
    ports::{
        AuditScheduler, AuditSchedulerError, CredentialError, CredentialSource,
        DatabaseResourceStore, InstanceDirectory, InstanceError, ResourceStoreError,
        SqlServerConnector,
    },
};

/// Port used when neither the resource nor the configuration names one.
pub const DEFAULT_SQL_PORT: u16 = 1433;

/// Status writes tried before a version conflict is returned to the driver.
const STATUS_WRITE_ATTEMPTS: u32 = 3;

/// What the driver should do after a successful pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The resource is converged until the next event.
    Done,
    /// Run another pass for the same resource.
    Requeue,
}

/// Failure class of a reconcile error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The resource or a dependency vanished during the pass.
    NotFound,
    /// A dependency is not in a usable state yet.
    PreconditionFailed,
    /// Stored and live identity disagree; needs an operator.
    IntegrityViolation,
    /// Connectivity or backend failure.
    TransientIo,
    /// Some statements failed; the others stay applied.
    PartialMutationFailure,
    /// A write raced another writer.
    Conflict,
    /// Invalid data that no retry will fix.
    Invalid,
}

impl ErrorClass {
    /// Returns whether a later pass may succeed without outside help.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::PreconditionFailed
                | Self::TransientIo
                | Self::PartialMutationFailure
                | Self::Conflict
        )
    }
}

/// Errors returned by a reconcile pass.
#[derive(Debug, Clone, Error)]
pub enum ReconcileError {
    /// A dependency is not ready.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// The resource store failed.
    #[error(transparent)]
    Store(#[from] ResourceStoreError),

    /// The instance or its login could not be resolved.
    #[error(transparent)]
    Target(#[from] TargetError),

    /// A database mutation failed.
    #[error(transparent)]
    Mutation(#[from] MutationError),

    /// Drift inspection failed.
    #[error(transparent)]
    Drift(#[from] DriftError),

    /// The audit scheduler failed.
    #[error(transparent)]
    Scheduler(#[from] AuditSchedulerError),

    /// A domain invariant refused the update.
    #[error(transparent)]
    Domain(#[from] DatabaseDomainError),
}

impl ReconcileError {
    /// Classifies the error.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::PreconditionFailed(_) => ErrorClass::PreconditionFailed,
            Self::Store(err) => match err {
                ResourceStoreError::NotFound(_) => ErrorClass::NotFound,
                ResourceStoreError::Conflict { .. } => ErrorClass::Conflict,
                ResourceStoreError::Rejected(_) => ErrorClass::Invalid,
                ResourceStoreError::Persistence(_) => ErrorClass::TransientIo,
            },
            Self::Target(err) => match err {
                TargetError::Instance(InstanceError::NotFound { .. })
                | TargetError::Credentials(CredentialError::NotFound { .. }) => {
                    ErrorClass::PreconditionFailed
                }
                TargetError::Instance(InstanceError::Backend(_))
                | TargetError::Credentials(CredentialError::Backend(_)) => ErrorClass::TransientIo,
                TargetError::InvalidCredentials { .. } => ErrorClass::Invalid,
            },
            Self::Mutation(err) | Self::Drift(DriftError::Lookup(err)) => mutation_class(err),
            Self::Drift(DriftError::Integrity(_)) => ErrorClass::IntegrityViolation,
            Self::Drift(DriftError::NotCreated(_)) => ErrorClass::PreconditionFailed,
            Self::Scheduler(err) => match err {
                AuditSchedulerError::AlreadyExists(_) | AuditSchedulerError::NotFound(_) => {
                    ErrorClass::Conflict
                }
                AuditSchedulerError::Backend(_) => ErrorClass::TransientIo,
            },
            Self::Domain(DatabaseDomainError::IdentityAlreadyBound { .. }) => {
                ErrorClass::IntegrityViolation
            }
            Self::Domain(_) => ErrorClass::Invalid,
        }
    }

    /// Returns whether the driver should retry after a backoff.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.class().is_retryable()
    }
}

const fn mutation_class(err: &MutationError) -> ErrorClass {
    match err {
        MutationError::Sql(_) => ErrorClass::TransientIo,
        MutationError::PartialFailure { .. } => ErrorClass::PartialMutationFailure,
        MutationError::IdentityUnresolved(_) => ErrorClass::IntegrityViolation,
    }
}

/// Result type for reconcile passes.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Operator-wide reconcile settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerSettings {
    /// Audit schedule for resources that do not set one.
    pub default_schedule: AuditSchedule,
    /// SQL Server port for resources that do not set one.
    pub default_port: u16,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            default_schedule: AuditSchedule::default(),
            default_port: DEFAULT_SQL_PORT,
        }
    }
}

/// Collaborators of the reconciler.
pub struct ReconcilerPorts<S, Q, K, I, C> {
    /// Resource store.
    pub store: Arc<S>,
    /// Recurring-task primitive for the audit.
    pub scheduler: Arc<Q>,
    /// Login lookup.
    pub credentials: Arc<K>,
    /// Managed instance lookup.
    pub instances: Arc<I>,
    /// SQL Server connector.
    pub connector: Arc<C>,
}

/// Event-driven reconciler for database resources.
pub struct DatabaseReconciler<S, Q, K, I, C, Clk>
where
    S: DatabaseResourceStore,
    Q: AuditScheduler,
    K: CredentialSource,
    I: InstanceDirectory,
    C: SqlServerConnector,
    Clk: Clock + Send + Sync,
{
    store: Arc<S>,
    scheduler: Arc<Q>,
    resolver: TargetResolver<K, I>,
    connector: Arc<C>,
    default_schedule: AuditSchedule,
    clock: Arc<Clk>,
}

impl<S, Q, K, I, C, Clk> DatabaseReconciler<S, Q, K, I, C, Clk>
where
    S: DatabaseResourceStore,
    Q: AuditScheduler,
    K: CredentialSource,
    I: InstanceDirectory,
    C: SqlServerConnector,
    Clk: Clock + Send + Sync,
{
    /// Creates a reconciler.
    #[must_use]
    pub fn new(
        ports: ReconcilerPorts<S, Q, K, I, C>,
        settings: ReconcilerSettings,
        clock: Arc<Clk>,
    ) -> Self {
        Self {
            store: ports.store,
            scheduler: ports.scheduler,
            resolver: TargetResolver::new(ports.credentials, ports.instances, settings.default_port),
            connector: ports.connector,
            default_schedule: settings.default_schedule,
            clock,
        }
    }

    /// Runs one reconcile pass for `key`.
    ///
    /// A missing resource is converged. Apart from the errored marker of a
    /// not-ready instance and the identity bound by a partially failed
    /// create, a failing pass leaves the stored status as it was.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError`]; see [`ReconcileError::class`] for how each
    /// failure is classified.
    #[tracing::instrument(skip_all, fields(resource = %key))]
    pub async fn reconcile(&self, key: &ResourceKey) -> ReconcileResult<ReconcileOutcome> {
        let Some(mut resource) = self.store.get(key).await? else {
            debug!("resource not found; nothing to reconcile");
            return Ok(ReconcileOutcome::Done);
        };

        let instance = self.resolver.instance(&resource).await?;
        if !instance.is_ready() {
            let message = format!(
                "managed instance '{}' is not ready (state '{}')",
                resource.spec().instance,
                instance.state
            );
            let previous = resource.status().clone();
            resource
                .status_mut()
                .record_error(message.clone(), &*self.clock);
            if resource.status() != &previous {
                self.persist_status(&resource).await?;
            }
            warn!(%message, "instance not ready");
            return Err(ReconcileError::PreconditionFailed(message));
        }

        let target = self.resolver.target(&resource, &instance).await?;
        let executor = MutationExecutor::new(Arc::clone(&self.connector), target);

        if resource.is_deletion_requested() {
            return self.finalize(&mut resource, &executor).await;
        }
        if resource.add_delete_guard(DATABASE_CLEANUP_GUARD) {
            self.store.update(&resource).await?;
            info!(guard = DATABASE_CLEANUP_GUARD, "delete-guard added");
            return Ok(ReconcileOutcome::Requeue);
        }

        let previous = resource.status().clone();
        self.converge(&mut resource, &executor).await?;
        let persisted = if resource.status() == &previous {
            resource
        } else {
            let stored = self.persist_status(&resource).await?;
            info!(phase = %stored.status().phase(), "status recorded");
            stored
        };
        self.ensure_audit(&persisted).await
    }

    /// Writes the status of `resource`, replaying it onto the latest stored
    /// version when another writer got there first. A bound identity is
    /// never dropped by the replay.
    async fn persist_status(
        &self,
        resource: &DatabaseResource,
    ) -> ReconcileResult<DatabaseResource> {
        let mut pending = resource.clone();
        let mut attempt = 1;
        loop {
            match self.store.update_status(&pending).await {
                Ok(stored) => return Ok(stored),
                Err(ResourceStoreError::Conflict { .. }) if attempt < STATUS_WRITE_ATTEMPTS => {}
                Err(err) => return Err(err.into()),
            }
            attempt += 1;
            let mut latest = self
                .store
                .get(resource.key())
                .await?
                .ok_or_else(|| ResourceStoreError::NotFound(resource.key().clone()))?;
            if let Some(identity) = resource.status().identity() {
                latest.status_mut().bind_identity(identity)?;
            }
            latest.set_status(resource.status().clone());
            debug!(attempt, "status write conflicted; replaying onto latest version");
            pending = latest;
        }
    }

    async fn finalize(
        &self,
        resource: &mut DatabaseResource,
        executor: &MutationExecutor<C>,
    ) -> ReconcileResult<ReconcileOutcome> {
        if !resource.has_delete_guard(DATABASE_CLEANUP_GUARD) {
            debug!("deletion requested without delete-guard");
            return Ok(ReconcileOutcome::Done);
        }
        let dropped = executor.delete(&resource.spec().name).await?;
        resource.remove_delete_guard(DATABASE_CLEANUP_GUARD);
        self.store.update(resource).await?;
        info!(database = %resource.spec().name, dropped, "delete-guard released");
        Ok(ReconcileOutcome::Done)
    }

    async fn converge(
        &self,
        resource: &mut DatabaseResource,
        executor: &MutationExecutor<C>,
    ) -> ReconcileResult<()> {
        let Some(identity) = resource.status().identity() else {
            return self.create(resource, executor).await;
        };
        self.synchronize(resource, identity, executor).await
    }

    async fn create(
        &self,
        resource: &mut DatabaseResource,
        executor: &MutationExecutor<C>,
    ) -> ReconcileResult<()> {
        let name = resource.spec().name.clone();
        match executor.create(&name, &resource.spec().create_settings()).await {
            Ok(identity) => {
                resource.status_mut().bind_identity(identity)?;
                resource
                    .status_mut()
                    .record(DatabasePhase::Created, &*self.clock);
                info!(database = %name, %identity, "database created");
                Ok(())
            }
            Err(err) => {
                if let MutationError::PartialFailure {
                    identity: Some(identity),
                    ..
                } = &err
                {
                    resource.status_mut().bind_identity(*identity)?;
                    resource
                        .status_mut()
                        .record_error(err.to_string(), &*self.clock);
                    self.persist_status(resource).await?;
                    warn!(database = %name, %identity, error = %err, "database created with failed options");
                }
                Err(err.into())
            }
        }
    }

    async fn synchronize(
        &self,
        resource: &mut DatabaseResource,
        identity: DatabaseIdentity,
        executor: &MutationExecutor<C>,
    ) -> ReconcileResult<()> {
        let inspection = DriftComparator::new(executor)
            .inspect(resource.spec(), Some(identity), AuthorityMode::DesiredWins)
            .await?;
        if let Some(patch) = &inspection.patch {
            warn!(database = %resource.spec().name, drift = %patch, "correcting drift");
            executor
                .alter(&resource.spec().name, &patch.corrections())
                .await?;
        }
        resource
            .status_mut()
            .record(DatabasePhase::Synced, &*self.clock);
        Ok(())
    }

    async fn ensure_audit(&self, resource: &DatabaseResource) -> ReconcileResult<ReconcileOutcome> {
        let schedule = resource
            .spec()
            .schedule
            .clone()
            .unwrap_or_else(|| self.default_schedule.clone());
        let desired = ScheduledAudit::new(resource.key().clone(), schedule);
        let Some(existing) = self.scheduler.find(resource.key()).await? else {
            self.scheduler.create(&desired).await?;
            info!(schedule = %desired.schedule, "drift audit scheduled");
            return Ok(ReconcileOutcome::Requeue);
        };
        if existing == desired {
            return Ok(ReconcileOutcome::Done);
        }
        self.scheduler.update(&desired).await?;
        info!(
            from = %existing.schedule,
            to = %desired.schedule,
            "drift audit rescheduled"
        );
        Ok(ReconcileOutcome::Requeue)
    }
}

#[async_trait]
impl<S, Q, K, I, C, Clk> Reconcile for DatabaseReconciler<S, Q, K, I, C, Clk>
where
    S: DatabaseResourceStore + 'static,
    Q: AuditScheduler + 'static,
    K: CredentialSource + 'static,
    I: InstanceDirectory + 'static,
    C: SqlServerConnector + 'static,
    Clk: Clock + Send + Sync + 'static,
{
    async fn reconcile(&self, key: &ResourceKey) -> ReconcileResult<ReconcileOutcome> {
        DatabaseReconciler::reconcile(self, key).await
    }
}
