//! Drift comparator: verifies identity, reads the live row, and computes the
//! drift patch in the requested authority mode.

use thiserror::Error;
use tracing::debug;

use super::{MutationError, MutationExecutor};
use crate::database::{
    domain::{
        AuthorityMode, DatabaseIdentity, DatabaseName, DesiredConfig, DriftPatch,
        IntegrityViolation, LiveRecord,
    },
    ports::SqlServerConnector,
};

/// Errors returned while inspecting a database.
#[derive(Debug, Clone, Error)]
pub enum DriftError {
    /// Stored and live identity disagree.
    #[error(transparent)]
    Integrity(#[from] IntegrityViolation),

    /// A lookup failed.
    #[error(transparent)]
    Lookup(#[from] MutationError),

    /// No database exists under the desired name and no identity is stored.
    #[error("database '{0}' does not exist")]
    NotCreated(DatabaseName),
}

/// Outcome of one inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inspection {
    /// Identity the server reports for the desired name.
    pub live_identity: Option<DatabaseIdentity>,
    /// Live configuration.
    pub live: LiveRecord,
    /// Disagreeing fields, if any.
    pub patch: Option<DriftPatch>,
}

/// Compares desired configuration with the live database.
pub struct DriftComparator<'a, C>
where
    C: SqlServerConnector,
{
    executor: &'a MutationExecutor<C>,
}

impl<'a, C> DriftComparator<'a, C>
where
    C: SqlServerConnector,
{
    /// Creates a comparator issuing lookups through `executor`.
    #[must_use]
    pub const fn new(executor: &'a MutationExecutor<C>) -> Self {
        Self { executor }
    }

    /// Inspects the database named by `desired`.
    ///
    /// Both identity lookups run concurrently; either failing aborts the
    /// inspection. With a stored identity, the name it resolves to and the
    /// identity the name resolves to must both agree with it.
    ///
    /// # Errors
    ///
    /// Returns [`DriftError::Integrity`] on identity disagreement or when the
    /// row of a verified identity cannot be read, [`DriftError::NotCreated`]
    /// when nothing exists and nothing is stored, and [`DriftError::Lookup`]
    /// when a lookup fails.
    pub async fn inspect(
        &self,
        desired: &DesiredConfig,
        stored: Option<DatabaseIdentity>,
        mode: AuthorityMode,
    ) -> Result<Inspection, DriftError> {
        let name = &desired.name;
        let (live_identity, stored_name) = tokio::try_join!(
            self.executor.find_identity_by_name(name),
            self.name_of(stored),
        )?;
        debug!(database = %name, ?live_identity, ?stored_name, "identity lookups joined");

        if let Some(identity) = stored {
            verify_identity(name, identity, live_identity, stored_name)?;
        }

        let Some(live) = self.executor.fetch_live_record(name).await? else {
            return Err(match stored {
                Some(identity) => IntegrityViolation::RowMissing {
                    database: name.clone(),
                    identity,
                }
                .into(),
                None => DriftError::NotCreated(name.clone()),
            });
        };

        let patch = DriftPatch::compare(desired, &live, mode);
        Ok(Inspection {
            live_identity,
            live,
            patch,
        })
    }

    async fn name_of(&self, stored: Option<DatabaseIdentity>) -> Result<Option<String>, MutationError> {
        match stored {
            Some(identity) => self.executor.find_name_by_identity(identity).await,
            None => Ok(None),
        }
    }
}

fn verify_identity(
    name: &DatabaseName,
    stored: DatabaseIdentity,
    live_identity: Option<DatabaseIdentity>,
    stored_name: Option<String>,
) -> Result<(), IntegrityViolation> {
    let Some(found) = stored_name else {
        return Err(IntegrityViolation::IdentityUnresolved { identity: stored });
    };
    if found != name.as_str() {
        return Err(IntegrityViolation::NameMismatch {
            identity: stored,
            expected: name.clone(),
            found,
        });
    }
    if let Some(live) = live_identity
        && live != stored
    {
        return Err(IntegrityViolation::IdentityMismatch {
            database: name.clone(),
            stored,
            live,
        });
    }
    Ok(())
}
