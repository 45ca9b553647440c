//! Port contracts for database reconciliation.
//!
//! Ports define infrastructure-agnostic interfaces for the resource store,
//! the recurring-task primitive, credential and instance lookups, and the SQL
//! Server connection.

pub mod credentials;
pub mod instance;
pub mod schedule;
pub mod sql;
pub mod store;

pub use credentials::{CredentialError, CredentialResult, CredentialSource, Credentials};
pub use instance::{InstanceDirectory, InstanceError, InstanceResult, ManagedInstance, SecretRef};
pub use schedule::{AuditScheduler, AuditSchedulerError, AuditSchedulerResult};
pub use sql::{SqlCredentials, SqlError, SqlResult, SqlServerConnector, SqlSession, ServerTarget};
pub use store::{DatabaseResourceStore, ResourceStoreError, ResourceStoreResult};
