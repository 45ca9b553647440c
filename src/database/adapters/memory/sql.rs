//! In-memory SQL Server used by tests and local runs.
//!
//! The server keeps a catalog of databases keyed by name, records every
//! statement it is asked to execute, and can simulate out-of-band changes
//! such as a restore under a new identity or a manual `ALTER DATABASE`.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::database::{
    domain::{
        AlterOption, AlterSettings, Collation, DatabaseIdentity, DatabaseName, DdlStatement, LiveRecord,
        Parameterization,
    },
    ports::{SqlCredentials, SqlError, SqlResult, SqlServerConnector, SqlSession, ServerTarget},
};

/// Collation given to databases created without an explicit one.
pub const DEFAULT_SERVER_COLLATION: &str = "SQL_Latin1_General_CP1_CI_AS";

/// Compatibility level given to new databases.
pub const DEFAULT_COMPATIBILITY_LEVEL: u16 = 160;

/// Thread-safe in-memory SQL Server.
#[derive(Debug, Clone, Default)]
pub struct InMemorySqlServer {
    state: Arc<RwLock<ServerState>>,
}

#[derive(Debug, Default)]
struct ServerState {
    databases: BTreeMap<String, CatalogEntry>,
    statements: Vec<String>,
    rejected_fragments: Vec<String>,
    hidden_identities: BTreeSet<String>,
    required_login: Option<SqlCredentials>,
    unreachable: bool,
    sessions_opened: usize,
    open_sessions: usize,
}

#[derive(Debug, Clone)]
struct CatalogEntry {
    identity: DatabaseIdentity,
    collation: String,
    compatibility_level: u16,
    allow_snapshot_isolation: bool,
    allow_read_committed_snapshot: bool,
    parameterization: Parameterization,
    create_date: String,
}

impl CatalogEntry {
    fn new(collation: Option<&str>) -> Self {
        Self {
            identity: DatabaseIdentity::from_uuid(Uuid::new_v4()),
            collation: collation.unwrap_or(DEFAULT_SERVER_COLLATION).to_owned(),
            compatibility_level: DEFAULT_COMPATIBILITY_LEVEL,
            allow_snapshot_isolation: false,
            allow_read_committed_snapshot: false,
            parameterization: Parameterization::Simple,
            create_date: Utc::now().format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
        }
    }

    const fn apply(&mut self, option: AlterOption) {
        match option {
            AlterOption::Parameterization(mode) => self.parameterization = mode,
            AlterOption::AllowSnapshotIsolation(flag) => self.allow_snapshot_isolation = flag,
            AlterOption::CompatibilityLevel(level) => self.compatibility_level = level,
        }
    }

    fn live_record(&self, name: &str) -> LiveRecord {
        LiveRecord {
            name: name.to_owned(),
            state: 0,
            is_read_only: false,
            user_access: 0,
            create_date: self.create_date.clone(),
            compatibility_level: self.compatibility_level,
            collation: Some(self.collation.clone()),
            allow_snapshot_isolation: self.allow_snapshot_isolation,
            allow_read_committed_snapshot: self.allow_read_committed_snapshot,
            parameterization: self.parameterization,
        }
    }
}

fn lock_error(err: &impl std::fmt::Display) -> SqlError {
    SqlError::query(std::io::Error::other(err.to_string()))
}

impl InMemorySqlServer {
    /// Creates an empty server.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, view: impl FnOnce(&ServerState) -> T) -> SqlResult<T> {
        let state = self.state.read().map_err(|err| lock_error(&err))?;
        Ok(view(&state))
    }

    fn write<T>(&self, change: impl FnOnce(&mut ServerState) -> T) -> SqlResult<T> {
        let mut state = self.state.write().map_err(|err| lock_error(&err))?;
        Ok(change(&mut state))
    }

    /// Creates a database directly in the catalog, bypassing the statement
    /// log, and returns its identity.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::Query`] if the catalog lock is poisoned.
    pub fn seed_database(&self, name: &DatabaseName) -> SqlResult<DatabaseIdentity> {
        self.write(|state| {
            let entry = CatalogEntry::new(None);
            let identity = entry.identity;
            state.databases.insert(name.as_str().to_owned(), entry);
            identity
        })
    }

    /// Applies `settings` without going through a session, as an operator
    /// editing the database by hand would. Returns whether the database
    /// exists.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::Query`] if the catalog lock is poisoned.
    pub fn alter_out_of_band(&self, name: &str, settings: &AlterSettings) -> SqlResult<bool> {
        let Ok(database) = DatabaseName::new(name) else {
            return Ok(false);
        };
        self.write(|state| {
            let Some(entry) = state.databases.get_mut(name) else {
                return false;
            };
            for statement in DdlStatement::alters(&database, settings) {
                if let DdlStatement::Alter { option, .. } = statement {
                    entry.apply(option);
                }
            }
            true
        })
    }

    /// Drops and restores `name` from a backup, giving it a fresh identity.
    ///
    /// Returns the new identity, or `None` when the database does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::Query`] if the catalog lock is poisoned.
    pub fn restore_as_new_identity(&self, name: &str) -> SqlResult<Option<DatabaseIdentity>> {
        self.write(|state| {
            state.databases.get_mut(name).map(|entry| {
                entry.identity = DatabaseIdentity::from_uuid(Uuid::new_v4());
                entry.identity
            })
        })
    }

    /// Renames a database, keeping its identity. Returns whether `from`
    /// existed.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::Query`] if the catalog lock is poisoned.
    pub fn rename_out_of_band(&self, from: &str, to: &str) -> SqlResult<bool> {
        self.write(|state| {
            let Some(entry) = state.databases.remove(from) else {
                return false;
            };
            state.databases.insert(to.to_owned(), entry);
            true
        })
    }

    /// Drops a database without going through a session.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::Query`] if the catalog lock is poisoned.
    pub fn drop_out_of_band(&self, name: &str) -> SqlResult<bool> {
        self.write(|state| state.databases.remove(name).is_some())
    }

    /// Makes every statement whose text contains `fragment` fail.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::Query`] if the catalog lock is poisoned.
    pub fn reject_statements_containing(&self, fragment: impl Into<String>) -> SqlResult<()> {
        let rejected = fragment.into();
        self.write(|state| state.rejected_fragments.push(rejected))
    }

    /// Clears every rejection added by
    /// [`reject_statements_containing`](Self::reject_statements_containing).
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::Query`] if the catalog lock is poisoned.
    pub fn accept_all_statements(&self) -> SqlResult<()> {
        self.write(|state| state.rejected_fragments.clear())
    }

    /// Makes session identity lookups for `name` come back empty even though
    /// the database exists, as happens when the login cannot see the
    /// catalog row.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::Query`] if the catalog lock is poisoned.
    pub fn hide_identity_of(&self, name: &str) -> SqlResult<()> {
        let hidden = name.to_owned();
        self.write(|state| {
            state.hidden_identities.insert(hidden);
        })
    }

    /// Requires sessions to present `credentials`.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::Query`] if the catalog lock is poisoned.
    pub fn require_login(&self, credentials: SqlCredentials) -> SqlResult<()> {
        self.write(|state| state.required_login = Some(credentials))
    }

    /// Makes new connections fail while `unreachable` is set.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::Query`] if the catalog lock is poisoned.
    pub fn set_unreachable(&self, unreachable: bool) -> SqlResult<()> {
        self.write(|state| state.unreachable = unreachable)
    }

    /// Returns the live record of `name`, if it exists.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::Query`] if the catalog lock is poisoned.
    pub fn live_record(&self, name: &str) -> SqlResult<Option<LiveRecord>> {
        self.read(|state| state.databases.get(name).map(|entry| entry.live_record(name)))
    }

    /// Returns the identity of `name`, if it exists.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::Query`] if the catalog lock is poisoned.
    pub fn identity_of(&self, name: &str) -> SqlResult<Option<DatabaseIdentity>> {
        self.read(|state| state.databases.get(name).map(|entry| entry.identity))
    }

    /// Returns the names of every database.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::Query`] if the catalog lock is poisoned.
    pub fn database_names(&self) -> SqlResult<Vec<String>> {
        self.read(|state| state.databases.keys().cloned().collect())
    }

    /// Returns the text of every statement issued so far, including failed
    /// ones.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::Query`] if the catalog lock is poisoned.
    pub fn statements(&self) -> SqlResult<Vec<String>> {
        self.read(|state| state.statements.clone())
    }

    /// Forgets the statement log.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::Query`] if the catalog lock is poisoned.
    pub fn clear_statements(&self) -> SqlResult<()> {
        self.write(|state| state.statements.clear())
    }

    /// Returns how many sessions were opened so far.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::Query`] if the catalog lock is poisoned.
    pub fn sessions_opened(&self) -> SqlResult<usize> {
        self.read(|state| state.sessions_opened)
    }

    /// Returns how many sessions are currently open.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::Query`] if the catalog lock is poisoned.
    pub fn open_sessions(&self) -> SqlResult<usize> {
        self.read(|state| state.open_sessions)
    }
}

fn execute_in(state: &mut ServerState, statement: &DdlStatement) -> SqlResult<()> {
    let sql = statement.to_sql();
    state.statements.push(sql.clone());
    if state
        .rejected_fragments
        .iter()
        .any(|fragment| sql.contains(fragment.as_str()))
    {
        return Err(SqlError::statement(
            statement,
            std::io::Error::other("statement rejected by server"),
        ));
    }

    let name = statement.database().as_str();
    match statement {
        DdlStatement::Create { collation, .. } => {
            if state.databases.contains_key(name) {
                return Err(SqlError::statement(
                    statement,
                    std::io::Error::other(format!("database '{name}' already exists")),
                ));
            }
            let entry = CatalogEntry::new(collation.as_ref().map(Collation::as_str));
            state.databases.insert(name.to_owned(), entry);
        }
        DdlStatement::Alter { option, .. } => {
            let Some(entry) = state.databases.get_mut(name) else {
                return Err(SqlError::statement(
                    statement,
                    std::io::Error::other(format!("database '{name}' does not exist")),
                ));
            };
            entry.apply(*option);
        }
        DdlStatement::Drop { .. } => {
            if state.databases.remove(name).is_none() {
                return Err(SqlError::statement(
                    statement,
                    std::io::Error::other(format!("database '{name}' does not exist")),
                ));
            }
        }
    }
    Ok(())
}

/// Session opened against an [`InMemorySqlServer`].
#[derive(Debug)]
pub struct InMemorySqlSession {
    server: InMemorySqlServer,
}

impl Drop for InMemorySqlSession {
    fn drop(&mut self) {
        if let Ok(mut state) = self.server.state.write() {
            state.open_sessions = state.open_sessions.saturating_sub(1);
        }
    }
}

#[async_trait]
impl SqlSession for InMemorySqlSession {
    async fn execute(&mut self, statement: &DdlStatement) -> SqlResult<()> {
        let mut state = self.server.state.write().map_err(|err| lock_error(&err))?;
        execute_in(&mut state, statement)
    }

    async fn database_exists(&mut self, name: &DatabaseName) -> SqlResult<bool> {
        self.server
            .read(|state| state.databases.contains_key(name.as_str()))
    }

    async fn find_identity_by_name(
        &mut self,
        name: &DatabaseName,
    ) -> SqlResult<Option<DatabaseIdentity>> {
        self.server.read(|state| {
            if state.hidden_identities.contains(name.as_str()) {
                return None;
            }
            state.databases.get(name.as_str()).map(|entry| entry.identity)
        })
    }

    async fn find_name_by_identity(
        &mut self,
        identity: DatabaseIdentity,
    ) -> SqlResult<Option<String>> {
        self.server.read(|state| {
            state
                .databases
                .iter()
                .find(|(_, entry)| entry.identity == identity)
                .map(|(name, _)| name.clone())
        })
    }

    async fn fetch_live_record(&mut self, name: &DatabaseName) -> SqlResult<Option<LiveRecord>> {
        self.server.live_record(name.as_str())
    }
}

#[async_trait]
impl SqlServerConnector for InMemorySqlServer {
    type Session = InMemorySqlSession;

    async fn connect(&self, target: &ServerTarget) -> SqlResult<Self::Session> {
        let mut state = self.state.write().map_err(|err| lock_error(&err))?;
        if state.unreachable {
            return Err(SqlError::connection(
                target.endpoint(),
                std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "server unreachable"),
            ));
        }
        if let Some(required) = &state.required_login
            && *required != target.credentials
        {
            return Err(SqlError::connection(
                target.endpoint(),
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "login failed"),
            ));
        }
        state.sessions_opened += 1;
        state.open_sessions += 1;
        drop(state);
        Ok(InMemorySqlSession {
            server: self.clone(),
        })
    }
}
