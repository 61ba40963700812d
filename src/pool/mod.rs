//! Connection pooling toward SAP hosts
//!
//! A single [`ConnectionPoolManager`] controls TCP/TLS connection reuse for
//! both schemes and exposes health and utilization telemetry.

pub mod manager;
pub mod stats;

pub use manager::{ConnectionLease, ConnectionPoolManager, Scheme};
pub use stats::{PoolConfigUpdate, PoolStats};
