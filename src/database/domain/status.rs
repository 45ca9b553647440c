//! Observed status of a managed database: lifecycle tag, bound identity and
//! type-keyed conditions.

use super::{DatabaseDomainError, DatabaseIdentity, ParseDatabasePhaseError};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle tag persisted in the resource status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatabasePhase {
    /// Nothing has been done yet.
    #[default]
    Pending,
    /// Creation is in progress.
    Creating,
    /// The database was created.
    Created,
    /// The database matches its desired configuration.
    Synced,
    /// An update is in progress.
    Updating,
    /// The database was updated.
    Updated,
    /// The last pass failed.
    Errored,
}

impl DatabasePhase {
    /// Returns the canonical representation, also used as condition type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Creating => "Creating",
            Self::Created => "Created",
            Self::Synced => "Synced",
            Self::Updating => "Updating",
            Self::Updated => "Updated",
            Self::Errored => "Errored",
        }
    }

    /// Returns the condition reason recorded for this phase.
    #[must_use]
    pub const fn reason(self) -> &'static str {
        match self {
            Self::Pending => "PendingDatabase",
            Self::Creating => "CreatingDatabase",
            Self::Created => "CreatedDatabase",
            Self::Synced => "SyncedDatabase",
            Self::Updating => "UpdatingDatabase",
            Self::Updated => "UpdatedDatabase",
            Self::Errored => "ErroredDatabase",
        }
    }

    /// Returns the default condition message for this phase.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Pending => "Database is pending",
            Self::Creating => "Database is creating",
            Self::Created => "Database successfully created",
            Self::Synced => "Database successfully synced",
            Self::Updating => "Database is updating",
            Self::Updated => "Database successfully updated",
            Self::Errored => "Database is erroring",
        }
    }
}

impl fmt::Display for DatabasePhase {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for DatabasePhase {
    type Error = ParseDatabasePhaseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "pending" => Ok(Self::Pending),
            "creating" => Ok(Self::Creating),
            "created" => Ok(Self::Created),
            "synced" => Ok(Self::Synced),
            "updating" => Ok(Self::Updating),
            "updated" => Ok(Self::Updated),
            "errored" => Ok(Self::Errored),
            _ => Err(ParseDatabasePhaseError(value.to_owned())),
        }
    }
}

/// Truth value of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionStatus {
    /// The condition holds.
    True,
    /// The condition does not hold.
    False,
    /// The condition cannot be determined.
    Unknown,
}

/// Timestamped, type-keyed status flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type; unique within [`Conditions`].
    #[serde(rename = "type")]
    pub condition_type: String,
    /// Truth value.
    pub status: ConditionStatus,
    /// Machine-readable reason.
    pub reason: String,
    /// Human-readable message.
    pub message: String,
    /// Time of the last status change.
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Creates the true condition describing `phase`.
    #[must_use]
    pub fn for_phase(phase: DatabasePhase, now: DateTime<Utc>) -> Self {
        Self {
            condition_type: phase.as_str().to_owned(),
            status: ConditionStatus::True,
            reason: phase.reason().to_owned(),
            message: phase.message().to_owned(),
            last_transition_time: now,
        }
    }

    /// Replaces the message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

/// Ordered set of conditions, unique by type.
///
/// Iteration follows first-seen order. Serialized as a plain list; a list
/// with repeated types deserializes to the last value at the first position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Condition>", into = "Vec<Condition>")]
pub struct Conditions(Vec<Condition>);

impl Conditions {
    /// Inserts or replaces the condition with the same type.
    ///
    /// The stored transition time is kept when the status is unchanged.
    /// Returns whether anything other than that timestamp changed.
    pub fn upsert(&mut self, condition: Condition) -> bool {
        let Some(existing) = self
            .0
            .iter_mut()
            .find(|current| current.condition_type == condition.condition_type)
        else {
            self.0.push(condition);
            return true;
        };

        let transition_time = if existing.status == condition.status {
            existing.last_transition_time
        } else {
            condition.last_transition_time
        };
        let updated = Condition {
            last_transition_time: transition_time,
            ..condition
        };
        if *existing == updated {
            return false;
        }
        *existing = updated;
        true
    }

    /// Returns the condition of the given type.
    #[must_use]
    pub fn get(&self, condition_type: &str) -> Option<&Condition> {
        self.0
            .iter()
            .find(|condition| condition.condition_type == condition_type)
    }

    /// Iterates conditions in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.iter()
    }

    /// Returns the number of conditions.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether no condition is recorded.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Condition>> for Conditions {
    fn from(list: Vec<Condition>) -> Self {
        let mut conditions = Self::default();
        for condition in list {
            if let Some(existing) = conditions
                .0
                .iter_mut()
                .find(|current| current.condition_type == condition.condition_type)
            {
                *existing = condition;
                continue;
            }
            conditions.0.push(condition);
        }
        conditions
    }
}

impl From<Conditions> for Vec<Condition> {
    fn from(conditions: Conditions) -> Self {
        conditions.0
    }
}

/// Status block of a database resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservedStatus {
    #[serde(rename = "status", default)]
    phase: DatabasePhase,
    #[serde(rename = "databaseID", default, skip_serializing_if = "Option::is_none")]
    identity: Option<DatabaseIdentity>,
    #[serde(default, skip_serializing_if = "Conditions::is_empty")]
    conditions: Conditions,
}

impl ObservedStatus {
    /// Returns the lifecycle tag.
    #[must_use]
    pub const fn phase(&self) -> DatabasePhase {
        self.phase
    }

    /// Returns the bound identity, if any.
    #[must_use]
    pub const fn identity(&self) -> Option<DatabaseIdentity> {
        self.identity
    }

    /// Returns the recorded conditions.
    #[must_use]
    pub const fn conditions(&self) -> &Conditions {
        &self.conditions
    }

    /// Binds the database identity.
    ///
    /// Binding the identity that is already stored is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseDomainError::IdentityAlreadyBound`] when a different
    /// identity is already stored.
    pub fn bind_identity(&mut self, identity: DatabaseIdentity) -> Result<(), DatabaseDomainError> {
        match self.identity {
            Some(bound) if bound != identity => Err(DatabaseDomainError::IdentityAlreadyBound {
                bound,
                attempted: identity,
            }),
            _ => {
                self.identity = Some(identity);
                Ok(())
            }
        }
    }

    /// Sets the lifecycle tag and upserts the matching condition.
    pub fn record(&mut self, phase: DatabasePhase, clock: &impl Clock) {
        self.record_condition(phase, Condition::for_phase(phase, clock.utc()));
    }

    /// Records the errored tag with a failure description as message.
    pub fn record_error(&mut self, message: impl Into<String>, clock: &impl Clock) {
        let condition = Condition::for_phase(DatabasePhase::Errored, clock.utc()).with_message(message);
        self.record_condition(DatabasePhase::Errored, condition);
    }

    fn record_condition(&mut self, phase: DatabasePhase, condition: Condition) {
        self.phase = phase;
        self.conditions.upsert(condition);
    }
}
