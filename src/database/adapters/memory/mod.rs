//! In-memory adapter implementations.
//!
//! These adapters provide simple, thread-safe implementations of every port
//! so the reconciler and the audit can be exercised without a cluster or a
//! SQL Server.

mod credentials;
mod instance;
mod scheduler;
mod sql;
mod store;

pub use credentials::StaticCredentialSource;
pub use instance::InMemoryInstanceDirectory;
pub use scheduler::InMemoryAuditScheduler;
pub use sql::{
    DEFAULT_COMPATIBILITY_LEVEL, DEFAULT_SERVER_COLLATION, InMemorySqlServer, InMemorySqlSession,
};
pub use store::InMemoryResourceStore;
