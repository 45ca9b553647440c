//! Application services for database reconciliation and audit.

mod audit;
mod comparator;
mod driver;
mod executor;
mod reconciler;
mod target;

pub use audit::{AuditError, AuditReport, AuditService, DriftAuditor, IdentityFinding};
pub use comparator::{DriftComparator, DriftError, Inspection};
pub use driver::{BackoffPolicy, Reconcile, ReconcileDriver};
pub use executor::{MutationError, MutationExecutor, MutationResult};
pub use reconciler::{
    DEFAULT_SQL_PORT, DatabaseReconciler, ErrorClass, ReconcileError, ReconcileOutcome,
    ReconcileResult, ReconcilerPorts, ReconcilerSettings,
};
pub use target::{TargetError, TargetResolver};
