//! Identifier and validated-name types for managed databases.

use super::{DatabaseDomainError, ParseDatabaseIdentityError};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Maximum identifier length, matching `sysname`.
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Namespaced key of a managed database resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    namespace: String,
    name: String,
}

impl ResourceKey {
    /// Creates a resource key.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseDomainError::EmptyResourceKey`] when either part is
    /// empty after trimming.
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self, DatabaseDomainError> {
        let trimmed_namespace = namespace.into().trim().to_owned();
        let trimmed_name = name.into().trim().to_owned();
        if trimmed_namespace.is_empty() || trimmed_name.is_empty() {
            return Err(DatabaseDomainError::EmptyResourceKey);
        }
        Ok(Self {
            namespace: trimmed_namespace,
            name: trimmed_name,
        })
    }

    /// Returns the namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the resource name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}/{}", self.namespace, self.name)
    }
}

/// Validated SQL Server database name.
///
/// Names are restricted to an identifier allow-list so they can be quoted
/// safely into DDL, which cannot take bound parameters for object names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DatabaseName(String);

impl DatabaseName {
    /// Creates a validated database name.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseDomainError`] when the name is empty, too long, or
    /// contains characters outside `[A-Za-z0-9_-]`.
    pub fn new(value: impl Into<String>) -> Result<Self, DatabaseDomainError> {
        let trimmed = value.into().trim().to_owned();
        if trimmed.is_empty() {
            return Err(DatabaseDomainError::EmptyDatabaseName);
        }
        if trimmed.chars().count() > MAX_IDENTIFIER_LENGTH {
            return Err(DatabaseDomainError::DatabaseNameTooLong(trimmed));
        }

        let mut characters = trimmed.chars();
        let starts_well = characters
            .next()
            .is_some_and(|first| first.is_ascii_alphabetic() || first == '_');
        let rest_valid =
            characters.all(|character| character.is_ascii_alphanumeric() || matches!(character, '_' | '-'));
        if !(starts_well && rest_valid) {
            return Err(DatabaseDomainError::InvalidDatabaseName(trimmed));
        }

        Ok(Self(trimmed))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DatabaseName {
    type Error = DatabaseDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DatabaseName> for String {
    fn from(value: DatabaseName) -> Self {
        value.0
    }
}

impl AsRef<str> for DatabaseName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for DatabaseName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Validated collation name such as `SQL_Latin1_General_CP1_CI_AS`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Collation(String);

impl Collation {
    /// Creates a validated collation name.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseDomainError::InvalidCollation`] when the value is not
    /// a plain `[A-Za-z0-9_]` token.
    pub fn new(value: impl Into<String>) -> Result<Self, DatabaseDomainError> {
        let trimmed = value.into().trim().to_owned();
        let valid = !trimmed.is_empty()
            && trimmed.len() <= MAX_IDENTIFIER_LENGTH
            && trimmed
                .chars()
                .all(|character| character.is_ascii_alphanumeric() || character == '_');
        if !valid {
            return Err(DatabaseDomainError::InvalidCollation(trimmed));
        }
        Ok(Self(trimmed))
    }

    /// Returns the collation as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns whether `other` names the same collation.
    ///
    /// Collation names are case-insensitive on the server.
    #[must_use]
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other.trim())
    }
}

impl TryFrom<String> for Collation {
    type Error = DatabaseDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Collation> for String {
    fn from(value: Collation) -> Self {
        value.0
    }
}

impl fmt::Display for Collation {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Stable database identity derived from the server's recovery fork GUID.
///
/// The controller never generates identities; it only reads them back from
/// the server after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatabaseIdentity(Uuid);

impl DatabaseIdentity {
    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parses the textual GUID form returned by the server.
    ///
    /// # Errors
    ///
    /// Returns [`ParseDatabaseIdentityError`] when the value is not a GUID.
    pub fn parse(value: &str) -> Result<Self, ParseDatabaseIdentityError> {
        Uuid::parse_str(value.trim())
            .map(Self)
            .map_err(|_| ParseDatabaseIdentityError(value.to_owned()))
    }

    /// Returns the wrapped UUID.
    #[must_use]
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl fmt::Display for DatabaseIdentity {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}
