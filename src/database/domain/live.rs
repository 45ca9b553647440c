//! Live catalog row of a database as read from the server on every sync.

use super::{DatabaseDomainError, Parameterization};
use serde::Serialize;

/// Raw catalog columns as returned by the server.
///
/// Flags and enum-like options arrive in textual form (`"true"`, `"forced"`)
/// and are interpreted by [`LiveRecord::try_from`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveColumns {
    /// Database name.
    pub name: String,
    /// Numeric database state (`0` is online).
    pub state: i32,
    /// Whether the database is read-only.
    pub is_read_only: bool,
    /// Numeric user-access mode.
    pub user_access: i32,
    /// Creation timestamp in ISO 8601 form.
    pub create_date: String,
    /// Compatibility level.
    pub compatibility_level: i32,
    /// Collation, absent while the database is offline.
    pub collation: Option<String>,
    /// Snapshot isolation flag text.
    pub allow_snapshot_isolation: String,
    /// Read-committed snapshot flag text.
    pub allow_read_committed_snapshot: String,
    /// Parameterization mode text.
    pub parameterization: String,
}

/// Interpreted live configuration of a database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveRecord {
    /// Database name.
    pub name: String,
    /// Numeric database state.
    pub state: i32,
    /// Whether the database is read-only.
    pub is_read_only: bool,
    /// Numeric user-access mode.
    pub user_access: i32,
    /// Creation timestamp in ISO 8601 form.
    pub create_date: String,
    /// Compatibility level.
    pub compatibility_level: u16,
    /// Collation, absent while the database is offline.
    pub collation: Option<String>,
    /// Whether snapshot isolation is allowed.
    pub allow_snapshot_isolation: bool,
    /// Whether read-committed snapshot is on.
    pub allow_read_committed_snapshot: bool,
    /// Query parameterization mode.
    pub parameterization: Parameterization,
}

impl TryFrom<LiveColumns> for LiveRecord {
    type Error = DatabaseDomainError;

    fn try_from(columns: LiveColumns) -> Result<Self, Self::Error> {
        let compatibility_level = u16::try_from(columns.compatibility_level).map_err(|_| {
            DatabaseDomainError::InvalidLiveColumn {
                column: "compatibility_level",
                value: columns.compatibility_level.to_string(),
            }
        })?;
        let parameterization =
            Parameterization::try_from(columns.parameterization.as_str()).map_err(|err| {
                DatabaseDomainError::InvalidLiveColumn {
                    column: "parameterization",
                    value: err.0,
                }
            })?;

        Ok(Self {
            allow_snapshot_isolation: parse_flag(
                "allow_snapshot_isolation",
                &columns.allow_snapshot_isolation,
            )?,
            allow_read_committed_snapshot: parse_flag(
                "allow_read_committed_snapshot",
                &columns.allow_read_committed_snapshot,
            )?,
            name: columns.name,
            state: columns.state,
            is_read_only: columns.is_read_only,
            user_access: columns.user_access,
            create_date: columns.create_date,
            compatibility_level,
            collation: columns.collation,
            parameterization,
        })
    }
}

fn parse_flag(column: &'static str, value: &str) -> Result<bool, DatabaseDomainError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "on" => Ok(true),
        "false" | "0" | "off" => Ok(false),
        _ => Err(DatabaseDomainError::InvalidLiveColumn {
            column,
            value: value.to_owned(),
        }),
    }
}
