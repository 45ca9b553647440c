//! Desired database configuration authored on the managed resource.

use super::{
    AlterSettings, AuditSchedule, Collation, CreateSettings, DatabaseDomainError, DatabaseName,
    Parameterization,
};
use serde::{Deserialize, Serialize};

/// Reference to the secret holding SQL login credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialsRef {
    /// Secret namespace; defaults to the resource namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Secret name.
    pub name: String,
}

/// Externally authored target configuration for one database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesiredConfig {
    /// Database name; immutable once created.
    pub name: DatabaseName,
    /// Server host override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    /// Server port override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Login secret override; the instance login is used otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<CredentialsRef>,
    /// Collation; immutable once created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collation: Option<Collation>,
    /// Whether snapshot isolation is allowed.
    #[serde(default)]
    pub allow_snapshot_isolation: bool,
    /// Read-committed snapshot flag.
    ///
    /// Accepted and stored, but neither compared nor applied.
    #[serde(default)]
    pub allow_read_committed_snapshot: bool,
    /// Query parameterization mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameterization: Option<Parameterization>,
    /// Compatibility level, for example `150`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compatibility_level: Option<u16>,
    /// Managed instance hosting the database.
    #[serde(rename = "sqlManagedInstance")]
    pub instance: String,
    /// Audit schedule; the operator default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<AuditSchedule>,
}

impl DesiredConfig {
    /// Creates a configuration with server defaults for every option.
    #[must_use]
    pub fn new(name: DatabaseName, instance: impl Into<String>) -> Self {
        Self {
            name,
            server: None,
            port: None,
            credentials: None,
            collation: None,
            allow_snapshot_isolation: false,
            allow_read_committed_snapshot: false,
            parameterization: None,
            compatibility_level: None,
            instance: instance.into(),
            schedule: None,
        }
    }

    /// Sets the collation.
    #[must_use]
    pub fn with_collation(mut self, collation: Collation) -> Self {
        self.collation = Some(collation);
        self
    }

    /// Sets the snapshot isolation flag.
    #[must_use]
    pub fn with_snapshot_isolation(mut self, allowed: bool) -> Self {
        self.allow_snapshot_isolation = allowed;
        self
    }

    /// Sets the compatibility level.
    #[must_use]
    pub fn with_compatibility_level(mut self, level: u16) -> Self {
        self.compatibility_level = Some(level);
        self
    }

    /// Sets the parameterization mode.
    #[must_use]
    pub fn with_parameterization(mut self, mode: Parameterization) -> Self {
        self.parameterization = Some(mode);
        self
    }

    /// Sets the audit schedule.
    #[must_use]
    pub fn with_schedule(mut self, schedule: AuditSchedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    /// Sets an explicit server endpoint.
    #[must_use]
    pub fn with_server(mut self, server: impl Into<String>, port: Option<u16>) -> Self {
        self.server = Some(server.into());
        self.port = port;
        self
    }

    /// Returns every option that a freshly created database should receive.
    #[must_use]
    pub fn create_settings(&self) -> CreateSettings {
        CreateSettings {
            collation: self.collation.clone(),
            options: AlterSettings {
                parameterization: self.parameterization,
                allow_snapshot_isolation: Some(self.allow_snapshot_isolation),
                compatibility_level: self.compatibility_level,
            },
        }
    }

    /// Validates an update of this configuration to `proposed`.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseDomainError::ImmutableFieldChanged`] when the name or
    /// the collation differs.
    pub fn validate_update(&self, proposed: &Self) -> Result<(), DatabaseDomainError> {
        if self.name != proposed.name {
            return Err(DatabaseDomainError::ImmutableFieldChanged {
                field: "spec.name",
                from: self.name.to_string(),
                to: proposed.name.to_string(),
            });
        }
        if self.collation != proposed.collation {
            return Err(DatabaseDomainError::ImmutableFieldChanged {
                field: "spec.collation",
                from: collation_text(self.collation.as_ref()),
                to: collation_text(proposed.collation.as_ref()),
            });
        }
        Ok(())
    }
}

fn collation_text(collation: Option<&Collation>) -> String {
    collation.map(ToString::to_string).unwrap_or_default()
}
