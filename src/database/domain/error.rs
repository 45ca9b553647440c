//! Error types for database domain validation, parsing, and integrity checks.

use super::{DatabaseIdentity, DatabaseName};
use thiserror::Error;

/// Errors returned while constructing or mutating database domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DatabaseDomainError {
    /// The database name is empty after trimming.
    #[error("database name must not be empty")]
    EmptyDatabaseName,

    /// The database name contains characters outside the identifier allow-list.
    #[error(
        "database name '{0}' is invalid (letters, digits, '_' and '-' only, starting with a letter or '_')"
    )]
    InvalidDatabaseName(String),

    /// The database name exceeds the `sysname` length limit.
    #[error("database name exceeds 128 character limit: {0}")]
    DatabaseNameTooLong(String),

    /// The collation name is not a plain collation token.
    #[error("collation '{0}' is invalid (letters, digits and '_' only, at most 128 characters)")]
    InvalidCollation(String),

    /// The audit schedule is not a five-field cron expression.
    #[error("audit schedule '{0}' is not a five-field cron expression")]
    InvalidSchedule(String),

    /// A resource key component is empty.
    #[error("resource key requires a non-empty namespace and name")]
    EmptyResourceKey,

    /// An immutable desired-config field was changed on update.
    #[error("cannot change {field} of an existing database from '{from}' to '{to}'")]
    ImmutableFieldChanged {
        /// Field path in the desired configuration.
        field: &'static str,
        /// Value currently stored.
        from: String,
        /// Value proposed by the update.
        to: String,
    },

    /// A different identity is already bound to the resource.
    #[error("database identity {bound} is already bound; refusing to rebind to {attempted}")]
    IdentityAlreadyBound {
        /// Identity currently stored in status.
        bound: DatabaseIdentity,
        /// Identity that was offered.
        attempted: DatabaseIdentity,
    },

    /// A live catalog column could not be interpreted.
    #[error("unexpected value '{value}' in live column {column}")]
    InvalidLiveColumn {
        /// Column name.
        column: &'static str,
        /// Raw column value.
        value: String,
    },
}

/// Integrity violations between stored identity and the live server.
///
/// These are never repaired automatically.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IntegrityViolation {
    /// The stored identity no longer resolves to any database.
    #[error("stored database identity {identity} does not resolve to a database")]
    IdentityUnresolved {
        /// Stored identity.
        identity: DatabaseIdentity,
    },

    /// The stored identity resolves to a database with another name.
    #[error("database identity {identity} belongs to '{found}', expected '{expected}'")]
    NameMismatch {
        /// Stored identity.
        identity: DatabaseIdentity,
        /// Name from the desired configuration.
        expected: DatabaseName,
        /// Name reported by the server.
        found: String,
    },

    /// The database found by name carries a different identity.
    #[error("database '{database}' has identity {live}, but {stored} is stored")]
    IdentityMismatch {
        /// Database name.
        database: DatabaseName,
        /// Identity stored in status.
        stored: DatabaseIdentity,
        /// Identity reported by the server.
        live: DatabaseIdentity,
    },

    /// The row cannot be located although the identity validated.
    #[error("database '{database}' (identity {identity}) cannot be read from the catalog")]
    RowMissing {
        /// Database name.
        database: DatabaseName,
        /// Stored identity.
        identity: DatabaseIdentity,
    },
}

/// Error returned while parsing a parameterization mode.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown parameterization mode: {0}")]
pub struct ParseParameterizationError(pub String);

/// Error returned while parsing a database lifecycle phase.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown database phase: {0}")]
pub struct ParseDatabasePhaseError(pub String);

/// Error returned while parsing a database identity.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid database identity: {0}")]
pub struct ParseDatabaseIdentityError(pub String);
