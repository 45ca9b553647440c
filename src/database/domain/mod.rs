//! Domain model for managed SQL Server databases.
//!
//! The domain covers desired and live configuration, drift detection, typed
//! DDL statements, lifecycle status and the resource envelope. It performs no
//! I/O; connections, stores and schedulers sit behind the ports in
//! [`crate::database::ports`].

mod config;
mod drift;
mod error;
mod ids;
mod live;
mod resource;
mod schedule;
mod settings;
mod statement;
mod status;

pub use config::{CredentialsRef, DesiredConfig};
pub use drift::{AuthorityMode, DriftPatch};
pub use error::{
    DatabaseDomainError, IntegrityViolation, ParseDatabaseIdentityError, ParseDatabasePhaseError,
    ParseParameterizationError,
};
pub use ids::{Collation, DatabaseIdentity, DatabaseName, ResourceKey};
pub use live::{LiveColumns, LiveRecord};
pub use resource::{DATABASE_CLEANUP_GUARD, DatabaseResource};
pub use schedule::{AuditSchedule, DEFAULT_AUDIT_SCHEDULE, ScheduledAudit};
pub use settings::{AlterSettings, CreateSettings, Parameterization};
pub use statement::{AlterOption, DdlStatement, quote_identifier};
pub use status::{Condition, ConditionStatus, Conditions, DatabasePhase, ObservedStatus};
