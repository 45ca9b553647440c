//! Operator and audit-job settings read from the environment.
//!
//! Both loaders take a lookup function so callers can supply a fixed map
//! instead of the process environment.

use camino::Utf8PathBuf;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::database::{
    domain::{AuditSchedule, DatabaseResource, ResourceKey},
    ports::{ServerTarget, SqlCredentials},
    services::{BackoffPolicy, DEFAULT_SQL_PORT, ReconcilerSettings},
};

/// Default audit schedule override.
pub const DEFAULT_SCHEDULE_ENV: &str = "SQLMI_DEFAULT_SCHEDULE";
/// Default SQL Server port override.
pub const DEFAULT_PORT_ENV: &str = "SQLMI_DEFAULT_PORT";
/// Connect timeout in seconds.
pub const CONNECT_TIMEOUT_ENV: &str = "SQLMI_CONNECT_TIMEOUT_SECS";
/// First retry delay in milliseconds.
pub const RETRY_BASE_ENV: &str = "SQLMI_RETRY_BASE_MS";
/// Retry delay cap in seconds.
pub const RETRY_MAX_ENV: &str = "SQLMI_RETRY_MAX_SECS";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_RETRY_BASE: Duration = Duration::from_millis(500);
const DEFAULT_RETRY_MAX: Duration = Duration::from_secs(300);

/// Errors returned while loading configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required variable is unset or empty.
    #[error("required environment variable {0} is not set")]
    Missing(String),

    /// A variable holds a value that cannot be used.
    #[error("environment variable {key} has invalid value '{value}': {reason}")]
    Invalid {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
        /// Parse failure.
        reason: String,
    },
}

fn lookup_nonempty(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn required(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Result<String, ConfigError> {
    lookup_nonempty(lookup, key).ok_or_else(|| ConfigError::Missing(key.to_owned()))
}

fn parsed<T>(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    lookup_nonempty(lookup, key)
        .map(|value| {
            value.parse::<T>().map_err(|err| ConfigError::Invalid {
                key: key.to_owned(),
                reason: err.to_string(),
                value,
            })
        })
        .transpose()
}

fn connect_timeout(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Duration, ConfigError> {
    Ok(parsed(lookup, CONNECT_TIMEOUT_ENV)?
        .map_or(DEFAULT_CONNECT_TIMEOUT, Duration::from_secs))
}

fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Settings of the reconciling operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Audit schedule for resources that do not set one.
    pub default_schedule: AuditSchedule,
    /// SQL Server port for resources that do not set one.
    pub default_port: u16,
    /// TCP connect timeout for SQL Server sessions.
    pub connect_timeout: Duration,
    /// Delay before the first retry of a failed pass.
    pub retry_base: Duration,
    /// Upper bound of the retry delay.
    pub retry_max: Duration,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            default_schedule: AuditSchedule::default(),
            default_port: DEFAULT_SQL_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            retry_base: DEFAULT_RETRY_BASE,
            retry_max: DEFAULT_RETRY_MAX,
        }
    }
}

impl OperatorConfig {
    /// Loads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(process_env)
    }

    /// Loads the configuration through `lookup`; unset variables keep their
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a variable cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let default_schedule = lookup_nonempty(&lookup, DEFAULT_SCHEDULE_ENV)
            .map(|value| {
                AuditSchedule::new(value.clone()).map_err(|err| ConfigError::Invalid {
                    key: DEFAULT_SCHEDULE_ENV.to_owned(),
                    reason: err.to_string(),
                    value,
                })
            })
            .transpose()?
            .unwrap_or(defaults.default_schedule);
        let retry_base = parsed(&lookup, RETRY_BASE_ENV)?
            .map_or(defaults.retry_base, Duration::from_millis);
        let retry_max = parsed(&lookup, RETRY_MAX_ENV)?
            .map_or(defaults.retry_max, Duration::from_secs);
        if retry_max < retry_base {
            return Err(ConfigError::Invalid {
                key: RETRY_MAX_ENV.to_owned(),
                value: retry_max.as_secs().to_string(),
                reason: "must not be shorter than the first retry delay".to_owned(),
            });
        }

        Ok(Self {
            default_schedule,
            default_port: parsed(&lookup, DEFAULT_PORT_ENV)?.unwrap_or(defaults.default_port),
            connect_timeout: connect_timeout(&lookup)?,
            retry_base,
            retry_max,
        })
    }

    /// Returns the retry policy for the driver.
    #[must_use]
    pub const fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.retry_base, self.retry_max)
    }

    /// Returns the reconciler settings.
    #[must_use]
    pub fn reconciler_settings(&self) -> ReconcilerSettings {
        ReconcilerSettings {
            default_schedule: self.default_schedule.clone(),
            default_port: self.default_port,
        }
    }
}

/// Namespace of the audited resource.
pub const NAMESPACE_ENV: &str = "NAMESPACE";
/// Name of the audited resource.
pub const RESOURCE_NAME_ENV: &str = "DATABASE_CRD";
/// SQL login name.
pub const USER_ENV: &str = "DATABASE_USER";
/// SQL login password.
pub const PASSWORD_ENV: &str = "DATABASE_PASSWORD";
/// SQL Server port.
pub const PORT_ENV: &str = "DATABASE_PORT";
/// SQL Server host override.
pub const SERVER_ENV: &str = "MS_SERVER";
/// Path of the JSON resource manifest.
pub const MANIFEST_ENV: &str = "DATABASE_MANIFEST";

/// Builds the audited resource key, naming the variable that failed.
fn resource_key(namespace: String, name: String) -> Result<ResourceKey, ConfigError> {
    ResourceKey::new(namespace.clone(), name.clone()).map_err(|err| {
        let (key, value) = if namespace.trim().is_empty() {
            (NAMESPACE_ENV, namespace)
        } else {
            (RESOURCE_NAME_ENV, name)
        };
        ConfigError::Invalid {
            key: key.to_owned(),
            value,
            reason: err.to_string(),
        }
    })
}

/// Settings of one audit-job run.
///
/// The login is redacted from `Debug` output.
#[derive(Debug, Clone)]
pub struct AuditJobConfig {
    /// Audited resource.
    pub resource: ResourceKey,
    /// SQL login.
    pub credentials: SqlCredentials,
    /// SQL Server port.
    pub port: u16,
    /// SQL Server host override.
    pub server: Option<String>,
    /// Path of the JSON resource manifest.
    pub manifest: Utf8PathBuf,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
}

impl AuditJobConfig {
    /// Loads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when a required variable is unset and
    /// [`ConfigError::Invalid`] when a variable cannot be used.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(process_env)
    }

    /// Loads the configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when a required variable is unset and
    /// [`ConfigError::Invalid`] when a variable cannot be used.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let resource = resource_key(
            required(&lookup, NAMESPACE_ENV)?,
            required(&lookup, RESOURCE_NAME_ENV)?,
        )?;
        let credentials = SqlCredentials::new(
            required(&lookup, USER_ENV)?,
            required(&lookup, PASSWORD_ENV)?,
        );
        let port = parsed(&lookup, PORT_ENV)?.ok_or_else(|| ConfigError::Missing(PORT_ENV.to_owned()))?;

        Ok(Self {
            resource,
            credentials,
            port,
            server: lookup_nonempty(&lookup, SERVER_ENV),
            manifest: Utf8PathBuf::from(required(&lookup, MANIFEST_ENV)?),
            connect_timeout: connect_timeout(&lookup)?,
        })
    }

    /// Returns the server to audit `resource` on.
    ///
    /// The host is the configured override, else the server named by the
    /// resource, else the `<instance>-p-svc` service of the resource's
    /// managed instance.
    #[must_use]
    pub fn target(&self, resource: &DatabaseResource) -> ServerTarget {
        let host = self
            .server
            .clone()
            .or_else(|| resource.spec().server.clone())
            .unwrap_or_else(|| format!("{}-p-svc", resource.spec().instance));
        ServerTarget::new(host, self.port, self.credentials.clone())
    }
}
