//! Reconciliation of SQL Server databases against declarative resources.
//!
//! A resource names one database on a managed instance together with its
//! desired options. The reconciler creates the database, binds its stable
//! identity, corrects configuration drift and drops the database when the
//! resource is deleted. A periodic audit reuses the same comparison to report
//! drift without correcting it.
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;
