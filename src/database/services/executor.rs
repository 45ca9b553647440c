//! Mutation executor: issues DDL and resolves database identity.
//!
//! Every operation opens its own session and releases it on return, so
//! concurrent operations never share a connection.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::database::{
    domain::{
        AlterSettings, CreateSettings, DatabaseIdentity, DatabaseName, DdlStatement, LiveRecord,
    },
    ports::{SqlError, SqlServerConnector, SqlSession, ServerTarget},
};

/// Errors returned by the mutation executor.
#[derive(Debug, Clone, Error)]
pub enum MutationError {
    /// Connection, statement or lookup failure that aborted the operation.
    #[error(transparent)]
    Sql(#[from] SqlError),

    /// Some option statements failed; the others stay applied.
    #[error("{} option statement(s) failed for database '{database}'", failures.len())]
    PartialFailure {
        /// Database the statements targeted.
        database: DatabaseName,
        /// Identity of a database created by the same operation.
        identity: Option<DatabaseIdentity>,
        /// Failure of every rejected statement, in issue order.
        failures: Vec<SqlError>,
    },

    /// The identity lookup after `CREATE DATABASE` returned nothing.
    #[error("database '{0}' was created but its identity cannot be resolved")]
    IdentityUnresolved(DatabaseName),
}

/// Result type for mutation executor operations.
pub type MutationResult<T> = Result<T, MutationError>;

/// Issues mutations against one server.
pub struct MutationExecutor<C>
where
    C: SqlServerConnector,
{
    connector: Arc<C>,
    target: ServerTarget,
}

impl<C> MutationExecutor<C>
where
    C: SqlServerConnector,
{
    /// Creates an executor for `target`.
    #[must_use]
    pub const fn new(connector: Arc<C>, target: ServerTarget) -> Self {
        Self { connector, target }
    }

    /// Returns the server this executor talks to.
    #[must_use]
    pub const fn target(&self) -> &ServerTarget {
        &self.target
    }

    async fn session(&self) -> MutationResult<C::Session> {
        Ok(self.connector.connect(&self.target).await?)
    }

    /// Creates `name` and applies the remaining options one statement each,
    /// then resolves the identity of the new database.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::Sql`] when the `CREATE` or the identity
    /// lookup fails, [`MutationError::IdentityUnresolved`] when the lookup
    /// finds nothing, and [`MutationError::PartialFailure`] carrying the
    /// resolved identity when any option statement fails.
    pub async fn create(
        &self,
        name: &DatabaseName,
        settings: &CreateSettings,
    ) -> MutationResult<DatabaseIdentity> {
        let mut session = self.session().await?;
        let create = DdlStatement::Create {
            database: name.clone(),
            collation: settings.collation.clone(),
        };
        session.execute(&create).await?;
        info!(database = %name, statement = %create, "created database");

        let failures = apply_options(&mut session, name, &settings.options).await;

        let identity = session
            .find_identity_by_name(name)
            .await?
            .ok_or_else(|| MutationError::IdentityUnresolved(name.clone()))?;
        debug!(database = %name, %identity, "resolved identity of new database");

        if failures.is_empty() {
            Ok(identity)
        } else {
            Err(MutationError::PartialFailure {
                database: name.clone(),
                identity: Some(identity),
                failures,
            })
        }
    }

    /// Applies the populated options of `settings` to `name`.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::Sql`] when no session can be opened and
    /// [`MutationError::PartialFailure`] when any statement fails.
    pub async fn alter(&self, name: &DatabaseName, settings: &AlterSettings) -> MutationResult<()> {
        if settings.is_empty() {
            return Ok(());
        }
        let mut session = self.session().await?;
        let failures = apply_options(&mut session, name, settings).await;
        if failures.is_empty() {
            Ok(())
        } else {
            Err(MutationError::PartialFailure {
                database: name.clone(),
                identity: None,
                failures,
            })
        }
    }

    /// Drops `name` when it exists.
    ///
    /// Returns whether a `DROP` was issued.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::Sql`] when the existence check or the drop
    /// fails.
    pub async fn delete(&self, name: &DatabaseName) -> MutationResult<bool> {
        let mut session = self.session().await?;
        if !session.database_exists(name).await? {
            debug!(database = %name, "database already absent");
            return Ok(false);
        }
        let drop_statement = DdlStatement::Drop {
            database: name.clone(),
        };
        session.execute(&drop_statement).await?;
        info!(database = %name, "dropped database");
        Ok(true)
    }

    /// Resolves the identity of the database called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::Sql`] when the lookup fails.
    pub async fn find_identity_by_name(
        &self,
        name: &DatabaseName,
    ) -> MutationResult<Option<DatabaseIdentity>> {
        let mut session = self.session().await?;
        Ok(session.find_identity_by_name(name).await?)
    }

    /// Resolves the name of the database carrying `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::Sql`] when the lookup fails.
    pub async fn find_name_by_identity(
        &self,
        identity: DatabaseIdentity,
    ) -> MutationResult<Option<String>> {
        let mut session = self.session().await?;
        Ok(session.find_name_by_identity(identity).await?)
    }

    /// Reads the live configuration of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::Sql`] when the read fails.
    pub async fn fetch_live_record(&self, name: &DatabaseName) -> MutationResult<Option<LiveRecord>> {
        let mut session = self.session().await?;
        Ok(session.fetch_live_record(name).await?)
    }
}

async fn apply_options<S>(session: &mut S, name: &DatabaseName, settings: &AlterSettings) -> Vec<SqlError>
where
    S: SqlSession,
{
    let mut failures = Vec::new();
    for statement in DdlStatement::alters(name, settings) {
        match session.execute(&statement).await {
            Ok(()) => info!(database = %name, %statement, "applied database option"),
            Err(err) => {
                warn!(database = %name, %statement, error = %err, "database option failed");
                failures.push(err);
            }
        }
    }
    failures
}
