//! Database option values applied through `CREATE` and `ALTER DATABASE`.

use super::{Collation, ParseParameterizationError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Query parameterization mode of a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parameterization {
    /// Server parameterizes only trivial queries.
    Simple,
    /// Server parameterizes every eligible query.
    Forced,
}

impl Parameterization {
    /// Returns the canonical lower-case representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Forced => "forced",
        }
    }

    /// Returns the T-SQL keyword for `SET PARAMETERIZATION`.
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Simple => "SIMPLE",
            Self::Forced => "FORCED",
        }
    }
}

impl fmt::Display for Parameterization {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Parameterization {
    type Error = ParseParameterizationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "simple" => Ok(Self::Simple),
            "forced" => Ok(Self::Forced),
            _ => Err(ParseParameterizationError(value.to_owned())),
        }
    }
}

/// Options that can be changed on an existing database.
///
/// Only populated fields produce statements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlterSettings {
    /// Target parameterization mode.
    pub parameterization: Option<Parameterization>,
    /// Target `ALLOW_SNAPSHOT_ISOLATION` flag.
    pub allow_snapshot_isolation: Option<bool>,
    /// Target compatibility level.
    pub compatibility_level: Option<u16>,
}

impl AlterSettings {
    /// Returns whether no option is populated.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.parameterization.is_none()
            && self.allow_snapshot_isolation.is_none()
            && self.compatibility_level.is_none()
    }
}

/// Options applied when a database is first created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateSettings {
    /// Collation clause for the `CREATE DATABASE` statement.
    pub collation: Option<Collation>,
    /// Options applied afterwards, one statement each.
    pub options: AlterSettings,
}
