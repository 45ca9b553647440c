//! Periodic drift audit.
//!
//! The audit re-verifies identity and reports drift with the live values
//! winning. It issues lookups only and never touches the stored status.

use chrono::{DateTime, Utc};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::{
    DriftComparator, DriftError, MutationError, MutationExecutor, TargetError, TargetResolver,
};
use crate::database::{
    domain::{
        AuthorityMode, DatabaseIdentity, DatabaseName, DatabaseResource, DriftPatch,
        IntegrityViolation, ResourceKey,
    },
    ports::{
        CredentialSource, DatabaseResourceStore, InstanceDirectory, ResourceStoreError,
        ServerTarget, SqlServerConnector,
    },
};

/// What the audit found out about the database identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityFinding {
    /// The stored identity resolves to the desired name and back.
    Consistent(DatabaseIdentity),
    /// The database exists but no identity is stored for it.
    Unmanaged(DatabaseIdentity),
    /// Neither a database nor a stored identity exists.
    Missing,
    /// Stored and live identity disagree.
    Mismatch(IntegrityViolation),
}

/// Result of one audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditReport {
    /// Audited resource.
    pub resource: ResourceKey,
    /// Audited database.
    pub database: DatabaseName,
    /// Identity finding.
    pub finding: IdentityFinding,
    /// Live values of the disagreeing fields.
    pub drift: Option<DriftPatch>,
    /// When the audit ran.
    pub audited_at: DateTime<Utc>,
}

impl AuditReport {
    /// Returns whether an operator should look at the database.
    #[must_use]
    pub const fn requires_intervention(&self) -> bool {
        !matches!(self.finding, IdentityFinding::Consistent(_)) || self.drift.is_some()
    }
}

/// Errors returned by the audit.
#[derive(Debug, Clone, Error)]
pub enum AuditError {
    /// The resource does not exist.
    #[error("resource {0} not found")]
    ResourceNotFound(ResourceKey),

    /// The hosting instance is not ready.
    #[error("managed instance '{instance}' is not ready (state '{state}')")]
    InstanceNotReady {
        /// Instance name.
        instance: String,
        /// Reported state.
        state: String,
    },

    /// The resource store failed.
    #[error(transparent)]
    Store(#[from] ResourceStoreError),

    /// The instance or its login could not be resolved.
    #[error(transparent)]
    Target(#[from] TargetError),

    /// A lookup against the server failed.
    #[error(transparent)]
    Lookup(#[from] MutationError),
}

/// Audits a database resource against its server.
pub struct DriftAuditor<C, Clk>
where
    C: SqlServerConnector,
    Clk: Clock + Send + Sync,
{
    connector: Arc<C>,
    clock: Arc<Clk>,
}

impl<C, Clk> DriftAuditor<C, Clk>
where
    C: SqlServerConnector,
    Clk: Clock + Send + Sync,
{
    /// Creates an auditor.
    #[must_use]
    pub const fn new(connector: Arc<C>, clock: Arc<Clk>) -> Self {
        Self { connector, clock }
    }

    /// Audits `resource` on `target`.
    ///
    /// Identity disagreements are reported as findings rather than errors.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Lookup`] when a lookup fails.
    #[tracing::instrument(skip_all, fields(resource = %resource.key(), endpoint = %target.endpoint()))]
    pub async fn audit(
        &self,
        resource: &DatabaseResource,
        target: ServerTarget,
    ) -> Result<AuditReport, AuditError> {
        let executor = MutationExecutor::new(Arc::clone(&self.connector), target);
        let desired = resource.spec();
        let stored = resource.status().identity();
        let inspection = DriftComparator::new(&executor)
            .inspect(desired, stored, AuthorityMode::ObservedWins)
            .await;

        let (finding, drift) = match inspection {
            Ok(found) => {
                let finding = stored.map_or_else(
                    || {
                        found
                            .live_identity
                            .map_or(IdentityFinding::Missing, IdentityFinding::Unmanaged)
                    },
                    IdentityFinding::Consistent,
                );
                (finding, found.patch)
            }
            Err(DriftError::Integrity(violation)) => (IdentityFinding::Mismatch(violation), None),
            Err(DriftError::NotCreated(_)) => (IdentityFinding::Missing, None),
            Err(DriftError::Lookup(err)) => return Err(err.into()),
        };

        let report = AuditReport {
            resource: resource.key().clone(),
            database: desired.name.clone(),
            finding,
            drift,
            audited_at: self.clock.utc(),
        };
        log_report(&report);
        Ok(report)
    }
}

fn log_report(report: &AuditReport) {
    let database = &report.database;
    match &report.finding {
        IdentityFinding::Consistent(identity) => {
            debug!(%database, %identity, "identity verified");
        }
        IdentityFinding::Unmanaged(identity) => {
            warn!(%database, %identity, "database exists on server but is not managed");
        }
        IdentityFinding::Missing => {
            error!(%database, "database does not exist and is not managed");
        }
        IdentityFinding::Mismatch(violation) => {
            error!(%database, %violation, "database identity does not match the stored identity");
        }
    }
    if let Some(patch) = &report.drift {
        warn!(%database, drift = %patch, "database is out of sync");
        return;
    }
    info!(%database, "database sync not needed");
}

/// Audits resources by key, resolving their target from the store.
pub struct AuditService<S, K, I, C, Clk>
where
    S: DatabaseResourceStore,
    K: CredentialSource,
    I: InstanceDirectory,
    C: SqlServerConnector,
    Clk: Clock + Send + Sync,
{
    store: Arc<S>,
    resolver: TargetResolver<K, I>,
    auditor: DriftAuditor<C, Clk>,
}

impl<S, K, I, C, Clk> AuditService<S, K, I, C, Clk>
where
    S: DatabaseResourceStore,
    K: CredentialSource,
    I: InstanceDirectory,
    C: SqlServerConnector,
    Clk: Clock + Send + Sync,
{
    /// Creates an audit service.
    #[must_use]
    pub const fn new(
        store: Arc<S>,
        resolver: TargetResolver<K, I>,
        auditor: DriftAuditor<C, Clk>,
    ) -> Self {
        Self {
            store,
            resolver,
            auditor,
        }
    }

    /// Audits the resource stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::ResourceNotFound`] for an unknown key,
    /// [`AuditError::InstanceNotReady`] when the instance is not ready, and
    /// the store, target and lookup errors otherwise.
    pub async fn audit(&self, key: &ResourceKey) -> Result<AuditReport, AuditError> {
        let resource = self
            .store
            .get(key)
            .await?
            .ok_or_else(|| AuditError::ResourceNotFound(key.clone()))?;
        let instance = self.resolver.instance(&resource).await?;
        if !instance.is_ready() {
            return Err(AuditError::InstanceNotReady {
                instance: resource.spec().instance.clone(),
                state: instance.state,
            });
        }
        let target = self.resolver.target(&resource, &instance).await?;
        self.auditor.audit(&resource, target).await
    }
}
