//! Audits one database resource against its SQL Server.
//!
//! Usage:
//!
//! ```text
//! database_audit
//! ```
//!
//! The job is configured through the environment: `NAMESPACE` and
//! `DATABASE_CRD` name the resource, `DATABASE_USER`, `DATABASE_PASSWORD` and
//! `DATABASE_PORT` describe the login, `MS_SERVER` optionally overrides the
//! host, and `DATABASE_MANIFEST` points at the JSON-serialized resource. A
//! representative manifest is:
//!
//! ```json
//! {
//!   "key": { "namespace": "payments", "name": "orders-db" },
//!   "spec": {
//!     "name": "orders",
//!     "sqlManagedInstance": "sql-mi-1",
//!     "compatibilityLevel": 150,
//!     "allowSnapshotIsolation": true
//!   },
//!   "status": {
//!     "status": "Synced",
//!     "databaseID": "5d0f6a59-6f1e-4e4c-9a4b-1d9b8f1f2a10"
//!   }
//! }
//! ```
//!
//! The job exits with status 2 when the database needs an operator's
//! attention, and never writes to the resource.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use mockable::DefaultClock;
use sqlmi_operator::{
    config::AuditJobConfig,
    database::{
        adapters::mssql::TiberiusConnector,
        domain::{DatabaseResource, ResourceKey},
        services::DriftAuditor,
    },
};
use std::io;
use std::process::ExitCode;
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Builder;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const INTERVENTION_EXIT_CODE: u8 = 2;

/// Boxed error type for the main result.
type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
enum AuditJobError {
    #[error("failed to read manifest {path}: {source}")]
    ManifestRead {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse manifest {path}: {source}")]
    ManifestParse {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("manifest describes {found}, expected {expected}")]
    ManifestMismatch {
        expected: ResourceKey,
        found: ResourceKey,
    },
    #[error("runtime init failed: {0}")]
    RuntimeInit(#[source] io::Error),
}

fn main() -> Result<ExitCode, BoxError> {
    init_tracing();
    let config = AuditJobConfig::from_env()?;
    let contents = read_manifest(&config.manifest).map_err(|source| {
        AuditJobError::ManifestRead {
            path: config.manifest.clone(),
            source,
        }
    })?;
    let resource = parse_manifest(&config.manifest, &contents, &config.resource)?;

    let connector = TiberiusConnector::new(config.connect_timeout).trusting_server_certificate();
    let auditor = DriftAuditor::new(Arc::new(connector), Arc::new(DefaultClock));
    let runtime = build_runtime()?;
    let report = runtime.block_on(auditor.audit(&resource, config.target(&resource)))?;

    if report.requires_intervention() {
        warn!(resource = %report.resource, finding = ?report.finding, "database needs attention");
        return Ok(ExitCode::from(INTERVENTION_EXIT_CODE));
    }
    info!(resource = %report.resource, "database audit passed");
    Ok(ExitCode::SUCCESS)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_runtime() -> Result<tokio::runtime::Runtime, AuditJobError> {
    Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(AuditJobError::RuntimeInit)
}

fn read_manifest(path: &Utf8Path) -> io::Result<String> {
    let parent = path
        .parent()
        .filter(|dir| !dir.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "manifest path has no file name"))?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority())?;
    dir.read_to_string(file_name)
}

fn parse_manifest(
    path: &Utf8Path,
    contents: &str,
    expected: &ResourceKey,
) -> Result<DatabaseResource, AuditJobError> {
    let resource: DatabaseResource =
        serde_json::from_str(contents).map_err(|source| AuditJobError::ManifestParse {
            path: path.to_owned(),
            source,
        })?;
    if resource.key() != expected {
        return Err(AuditJobError::ManifestMismatch {
            expected: expected.clone(),
            found: resource.key().clone(),
        });
    }
    Ok(resource)
}
