//! Pool telemetry and partial configuration updates

use crate::config::PoolSettings;
use serde::{Deserialize, Serialize};

/// Pool telemetry: cumulative counters plus point-in-time gauges
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Requests that asked for an agent or a lease
    pub total_requests: u64,
    /// Leases that had to open a new connection
    pub total_connections_created: u64,
    /// Leases served from an idle connection
    pub total_connections_reused: u64,
    /// Connections currently in use, both schemes
    pub active_sockets: usize,
    /// Idle keep-alive connections, both schemes
    pub free_sockets: usize,
    /// Callers waiting for a connection slot
    pub pending_requests: usize,
    /// Configured per-scheme ceiling
    pub max_sockets: usize,
}

impl PoolStats {
    /// Share of the socket ceiling in use, 0.0..=1.0 per scheme pair
    pub fn utilization(&self) -> f64 {
        if self.max_sockets == 0 {
            return 0.0;
        }
        self.active_sockets as f64 / (self.max_sockets * 2) as f64
    }
}

/// Partial pool configuration; `None` keeps the current value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolConfigUpdate {
    pub keep_alive: Option<bool>,
    pub keep_alive_msecs: Option<u64>,
    pub max_sockets: Option<usize>,
    pub max_free_sockets: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub free_socket_timeout_ms: Option<u64>,
    pub reject_unauthorized: Option<bool>,
}

impl PoolConfigUpdate {
    /// Merge onto `current`
    pub fn apply(&self, current: &PoolSettings) -> PoolSettings {
        PoolSettings {
            keep_alive: self.keep_alive.unwrap_or(current.keep_alive),
            keep_alive_msecs: self.keep_alive_msecs.unwrap_or(current.keep_alive_msecs),
            max_sockets: self.max_sockets.unwrap_or(current.max_sockets).max(1),
            max_free_sockets: self.max_free_sockets.unwrap_or(current.max_free_sockets),
            timeout_ms: self.timeout_ms.unwrap_or(current.timeout_ms),
            free_socket_timeout_ms: self
                .free_socket_timeout_ms
                .unwrap_or(current.free_socket_timeout_ms),
            reject_unauthorized: self
                .reject_unauthorized
                .unwrap_or(current.reject_unauthorized),
        }
    }
}
