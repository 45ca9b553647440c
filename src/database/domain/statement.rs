//! Typed DDL statements and their T-SQL rendering.
//!
//! Object names cannot be bound as statement parameters, so every identifier
//! reaching this module is already allow-listed by [`DatabaseName`] and is
//! additionally bracket-quoted. Option values are typed and never carry free
//! text.

use super::{AlterSettings, Collation, DatabaseName, Parameterization};
use std::fmt;

/// One database option changed by an `ALTER DATABASE ... SET` statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlterOption {
    /// `SET PARAMETERIZATION`.
    Parameterization(Parameterization),
    /// `SET ALLOW_SNAPSHOT_ISOLATION`.
    AllowSnapshotIsolation(bool),
    /// `SET COMPATIBILITY_LEVEL`.
    CompatibilityLevel(u16),
}

/// Mutating statement issued against the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DdlStatement {
    /// `CREATE DATABASE` with an optional collation clause.
    Create {
        /// Database to create.
        database: DatabaseName,
        /// Collation clause.
        collation: Option<Collation>,
    },
    /// `ALTER DATABASE ... SET` for a single option.
    Alter {
        /// Database to alter.
        database: DatabaseName,
        /// Option to set.
        option: AlterOption,
    },
    /// `DROP DATABASE`.
    Drop {
        /// Database to drop.
        database: DatabaseName,
    },
}

impl DdlStatement {
    /// Expands `settings` into one `ALTER` statement per populated option.
    ///
    /// Statements are ordered parameterization, snapshot isolation,
    /// compatibility level.
    #[must_use]
    pub fn alters(database: &DatabaseName, settings: &AlterSettings) -> Vec<Self> {
        let options = [
            settings.parameterization.map(AlterOption::Parameterization),
            settings
                .allow_snapshot_isolation
                .map(AlterOption::AllowSnapshotIsolation),
            settings
                .compatibility_level
                .map(AlterOption::CompatibilityLevel),
        ];
        options
            .into_iter()
            .flatten()
            .map(|option| Self::Alter {
                database: database.clone(),
                option,
            })
            .collect()
    }

    /// Returns the database the statement targets.
    #[must_use]
    pub const fn database(&self) -> &DatabaseName {
        match self {
            Self::Create { database, .. } | Self::Alter { database, .. } | Self::Drop { database } => {
                database
            }
        }
    }

    /// Renders the statement as T-SQL.
    #[must_use]
    pub fn to_sql(&self) -> String {
        match self {
            Self::Create {
                database,
                collation,
            } => {
                let mut sql = format!("CREATE DATABASE {}", quote_identifier(database.as_str()));
                if let Some(collation) = collation {
                    sql.push_str(" COLLATE ");
                    sql.push_str(collation.as_str());
                }
                sql
            }
            Self::Alter { database, option } => {
                let target = quote_identifier(database.as_str());
                match option {
                    AlterOption::Parameterization(mode) => {
                        format!("ALTER DATABASE {target} SET PARAMETERIZATION {}", mode.keyword())
                    }
                    AlterOption::AllowSnapshotIsolation(flag) => {
                        format!(
                            "ALTER DATABASE {target} SET ALLOW_SNAPSHOT_ISOLATION {}",
                            on_off(*flag)
                        )
                    }
                    AlterOption::CompatibilityLevel(level) => {
                        format!("ALTER DATABASE {target} SET COMPATIBILITY_LEVEL = {level}")
                    }
                }
            }
            Self::Drop { database } => {
                format!("DROP DATABASE {}", quote_identifier(database.as_str()))
            }
        }
    }
}

impl fmt::Display for DdlStatement {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.to_sql())
    }
}

/// Bracket-quotes an identifier, doubling any closing bracket.
#[must_use]
pub fn quote_identifier(identifier: &str) -> String {
    format!("[{}]", identifier.replace(']', "]]"))
}

const fn on_off(flag: bool) -> &'static str {
    if flag { "ON" } else { "OFF" }
}
