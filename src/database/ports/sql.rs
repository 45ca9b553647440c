//! SQL Server connection port.
//!
//! A [`SqlServerConnector`] opens one [`SqlSession`] per operation; the session
//! is released when dropped, on every exit path.

use crate::database::domain::{DatabaseIdentity, DatabaseName, DdlStatement, LiveRecord};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Result type for SQL Server operations.
pub type SqlResult<T> = Result<T, SqlError>;

/// SQL login used to open a session.
#[derive(Clone, PartialEq, Eq)]
pub struct SqlCredentials {
    username: String,
    password: String,
}

impl SqlCredentials {
    /// Creates a login.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Returns the login name.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for SqlCredentials {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SqlCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Server endpoint and login for one managed instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerTarget {
    /// Host name or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// SQL login.
    pub credentials: SqlCredentials,
}

impl ServerTarget {
    /// Creates a target.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, credentials: SqlCredentials) -> Self {
        Self {
            host: host.into(),
            port,
            credentials,
        }
    }

    /// Returns `host:port`.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// One open connection to the server.
#[async_trait]
pub trait SqlSession: Send {
    /// Executes a DDL statement.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::Statement`] when the server rejects the statement.
    async fn execute(&mut self, statement: &DdlStatement) -> SqlResult<()>;

    /// Returns whether a database with `name` exists.
    async fn database_exists(&mut self, name: &DatabaseName) -> SqlResult<bool>;

    /// Resolves the stable identity of the database called `name`.
    ///
    /// Returns `None` when no such database exists.
    async fn find_identity_by_name(
        &mut self,
        name: &DatabaseName,
    ) -> SqlResult<Option<DatabaseIdentity>>;

    /// Resolves the current name of the database carrying `identity`.
    ///
    /// Returns `None` when no database carries the identity.
    async fn find_name_by_identity(
        &mut self,
        identity: DatabaseIdentity,
    ) -> SqlResult<Option<String>>;

    /// Reads the live configuration of the database called `name`.
    ///
    /// Returns `None` when no such database exists.
    async fn fetch_live_record(&mut self, name: &DatabaseName) -> SqlResult<Option<LiveRecord>>;
}

/// Factory for [`SqlSession`]s.
#[async_trait]
pub trait SqlServerConnector: Send + Sync {
    /// Session type produced by this connector.
    type Session: SqlSession;

    /// Opens a session to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::Connection`] when the server cannot be reached or
    /// rejects the login.
    async fn connect(&self, target: &ServerTarget) -> SqlResult<Self::Session>;
}

/// Errors returned by SQL Server adapters.
#[derive(Debug, Clone, Error)]
pub enum SqlError {
    /// The connection could not be established.
    #[error("cannot connect to {endpoint}: {cause}")]
    Connection {
        /// `host:port` of the server.
        endpoint: String,
        /// Underlying failure.
        cause: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// A DDL statement failed.
    #[error("statement `{sql}` failed: {cause}")]
    Statement {
        /// Statement text.
        sql: String,
        /// Underlying failure.
        cause: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// A catalog query failed.
    #[error("catalog query failed: {0}")]
    Query(Arc<dyn std::error::Error + Send + Sync>),

    /// A catalog row could not be decoded.
    #[error("unexpected catalog value: {0}")]
    Decode(String),
}

impl SqlError {
    /// Wraps a connection failure.
    pub fn connection(
        endpoint: impl Into<String>,
        err: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            endpoint: endpoint.into(),
            cause: Arc::new(err),
        }
    }

    /// Wraps a statement failure.
    pub fn statement(
        statement: &DdlStatement,
        err: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Statement {
            sql: statement.to_sql(),
            cause: Arc::new(err),
        }
    }

    /// Wraps a query failure.
    pub fn query(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Query(Arc::new(err))
    }
}
