//! Reconciles SQL Server databases on managed instances against declarative
//! resources.
//!
//! A resource describes one database and its options. The operator creates
//! the database, binds its stable identity, corrects drift, drops it when the
//! resource is deleted, and schedules a periodic audit that reports drift
//! without correcting it.
//!
//! # Architecture
//!
//! The crate follows hexagonal architecture principles:
//!
//! - **Domain**: Pure configuration, drift and status logic
//! - **Ports**: Trait interfaces for the resource store, scheduler, secrets,
//!   instances and SQL Server
//! - **Adapters**: In-memory implementations of every port and a `tiberius`
//!   SQL Server connector
//!
//! # Modules
//!
//! - [`database`]: Reconciliation, drift detection and audit
//! - [`config`]: Operator and audit-job settings

pub mod config;
pub mod database;
