//! Catalog queries and row decoding.
//!
//! Every value reaching these queries is bound as `@P1`; none is formatted
//! into the query text.

use tiberius::Row;

use crate::database::{
    domain::{DatabaseIdentity, LiveColumns, LiveRecord},
    ports::{SqlError, SqlResult},
};

/// Reads the live configuration of one database.
pub const LIVE_RECORD: &str = "\
SELECT [name], \
CAST([state] AS int) AS [state], \
[is_read_only] AS [is_read_only], \
CAST([user_access] AS int) AS [user_access], \
CONVERT(varchar(23), [create_date], 126) AS [create_date], \
CAST([compatibility_level] AS int) AS [compatibility_level], \
[collation_name] AS [collation], \
IIF([snapshot_isolation_state] IN (1, 3), 'true', 'false') AS [allow_snapshot_isolation], \
IIF([is_read_committed_snapshot_on] = 1, 'true', 'false') AS [allow_read_committed_snapshot], \
IIF([is_parameterization_forced] = 0, 'simple', 'forced') AS [parameterization] \
FROM sys.databases WHERE [name] = @P1";

/// Returns a row when the database exists.
pub const DATABASE_EXISTS: &str = "SELECT CAST(DB_ID(@P1) AS int) AS [id]";

/// Resolves the recovery fork GUID of a database by name.
pub const IDENTITY_BY_NAME: &str = "\
SELECT CAST(drs.[recovery_fork_guid] AS char(36)) AS [identity] \
FROM sys.database_recovery_status drs \
JOIN sys.databases dbs ON drs.[database_id] = dbs.[database_id] \
WHERE dbs.[name] = @P1";

/// Resolves the database name carrying a recovery fork GUID.
pub const NAME_BY_IDENTITY: &str = "\
SELECT dbs.[name] \
FROM sys.database_recovery_status drs \
JOIN sys.databases dbs ON drs.[database_id] = dbs.[database_id] \
WHERE drs.[recovery_fork_guid] = CAST(@P1 AS uniqueidentifier)";

fn optional_str(row: &Row, column: &'static str) -> SqlResult<Option<String>> {
    Ok(row
        .try_get::<&str, _>(column)
        .map_err(SqlError::query)?
        .map(str::to_owned))
}

fn required<T>(value: Option<T>, column: &'static str) -> SqlResult<T> {
    value.ok_or_else(|| SqlError::Decode(format!("column {column} is null")))
}

fn required_str(row: &Row, column: &'static str) -> SqlResult<String> {
    required(optional_str(row, column)?, column)
}

fn required_int(row: &Row, column: &'static str) -> SqlResult<i32> {
    required(
        row.try_get::<i32, _>(column).map_err(SqlError::query)?,
        column,
    )
}

/// Decodes a [`LIVE_RECORD`] row.
///
/// # Errors
///
/// Returns [`SqlError::Decode`] when a column is missing or carries an
/// unexpected value.
pub fn live_record(row: &Row) -> SqlResult<LiveRecord> {
    let columns = LiveColumns {
        name: required_str(row, "name")?,
        state: required_int(row, "state")?,
        is_read_only: required(
            row.try_get::<bool, _>("is_read_only")
                .map_err(SqlError::query)?,
            "is_read_only",
        )?,
        user_access: required_int(row, "user_access")?,
        create_date: required_str(row, "create_date")?,
        compatibility_level: required_int(row, "compatibility_level")?,
        collation: optional_str(row, "collation")?,
        allow_snapshot_isolation: required_str(row, "allow_snapshot_isolation")?,
        allow_read_committed_snapshot: required_str(row, "allow_read_committed_snapshot")?,
        parameterization: required_str(row, "parameterization")?,
    };
    LiveRecord::try_from(columns).map_err(|err| SqlError::Decode(err.to_string()))
}

/// Decodes an [`IDENTITY_BY_NAME`] row.
///
/// # Errors
///
/// Returns [`SqlError::Decode`] when the GUID column is null or malformed.
pub fn identity(row: &Row) -> SqlResult<DatabaseIdentity> {
    let raw = required_str(row, "identity")?;
    DatabaseIdentity::parse(raw.trim()).map_err(|err| SqlError::Decode(err.to_string()))
}

/// Decodes a [`NAME_BY_IDENTITY`] row.
///
/// # Errors
///
/// Returns [`SqlError::Decode`] when the name column is null.
pub fn name(row: &Row) -> SqlResult<String> {
    required_str(row, "name")
}

/// Decodes a [`DATABASE_EXISTS`] row.
///
/// # Errors
///
/// Returns [`SqlError::Query`] when the column cannot be read.
pub fn exists(row: &Row) -> SqlResult<bool> {
    Ok(row
        .try_get::<i32, _>("id")
        .map_err(SqlError::query)?
        .is_some())
}
