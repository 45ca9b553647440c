//! Audit schedule values and the scheduled-audit record owned by a resource.

use super::{DatabaseDomainError, ResourceKey};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Schedule used when a resource does not specify one.
pub const DEFAULT_AUDIT_SCHEDULE: &str = "0 */12 * * *";

/// Five-field cron expression for the periodic drift audit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AuditSchedule(String);

impl AuditSchedule {
    /// Creates a validated schedule.
    ///
    /// Whitespace between fields is normalized to single spaces.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseDomainError::InvalidSchedule`] unless the value has
    /// exactly five fields drawn from `[0-9*/,-]`.
    pub fn new(value: impl Into<String>) -> Result<Self, DatabaseDomainError> {
        let raw = value.into();
        let fields: Vec<&str> = raw.split_whitespace().collect();
        let valid = fields.len() == 5
            && fields.iter().all(|field| {
                field
                    .chars()
                    .all(|character| character.is_ascii_digit() || matches!(character, '*' | '/' | ',' | '-'))
            });
        if !valid {
            return Err(DatabaseDomainError::InvalidSchedule(raw));
        }
        Ok(Self(fields.join(" ")))
    }

    /// Returns the cron expression.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for AuditSchedule {
    fn default() -> Self {
        Self(DEFAULT_AUDIT_SCHEDULE.to_owned())
    }
}

impl TryFrom<String> for AuditSchedule {
    type Error = DatabaseDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AuditSchedule> for String {
    fn from(value: AuditSchedule) -> Self {
        value.0
    }
}

impl fmt::Display for AuditSchedule {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Recurring audit task owned by a database resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledAudit {
    /// Owning resource; the task is collected when the owner is removed.
    pub owner: ResourceKey,
    /// Cron schedule of the task.
    pub schedule: AuditSchedule,
}

impl ScheduledAudit {
    /// Creates a scheduled audit for `owner`.
    #[must_use]
    pub const fn new(owner: ResourceKey, schedule: AuditSchedule) -> Self {
        Self { owner, schedule }
    }
}
