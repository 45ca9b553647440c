//! SQL Server adapter over TDS.
//!
//! Sessions are plain TCP connections wrapped for `tiberius` with
//! `tokio-util`'s compatibility layer. Each session is opened for a single
//! executor operation and closed when dropped.

mod connector;
mod queries;

pub use connector::{TiberiusConnector, TiberiusSession};
