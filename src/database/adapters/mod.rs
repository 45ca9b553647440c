//! Adapters for the database reconciliation ports.
//!
//! # Available Adapters
//!
//! - [`memory`]: thread-safe in-memory implementations of every port, used by
//!   tests
//! - [`mssql::TiberiusConnector`]: SQL Server sessions over TDS using the
//!   `tiberius` driver

pub mod memory;
pub mod mssql;
