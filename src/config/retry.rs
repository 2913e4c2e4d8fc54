use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_READY_ATTEMPTS;
use crate::constants::DEFAULT_READY_INTERVAL_MS;

/// Bounded fixed-interval polling used for every readiness wait
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Maximum number of readiness checks before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Sleep before each readiness check (unit: milliseconds)
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            interval_ms: default_interval_ms(),
        }
    }
}

impl ReadinessPolicy {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Fixed waits inserted before verification
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct SettleConfig {
    /// Wait before a consistency check (unit: seconds)
    #[serde(default = "default_replication_secs")]
    pub replication_secs: u64,

    /// Wait after shutting a node down for the IST test (unit: seconds)
    #[serde(default = "default_ist_shutdown_secs")]
    pub ist_shutdown_secs: u64,

    /// Upper bound of the table lock held to provoke flow control
    /// (unit: seconds)
    #[serde(default = "default_flow_control_lock_secs")]
    pub flow_control_lock_secs: u64,
}

impl Default for SettleConfig {
    fn default() -> Self {
        Self {
            replication_secs: default_replication_secs(),
            ist_shutdown_secs: default_ist_shutdown_secs(),
            flow_control_lock_secs: default_flow_control_lock_secs(),
        }
    }
}

impl SettleConfig {
    pub fn replication(&self) -> Duration {
        Duration::from_secs(self.replication_secs)
    }

    pub fn ist_shutdown(&self) -> Duration {
        Duration::from_secs(self.ist_shutdown_secs)
    }
}

fn default_max_attempts() -> usize {
    DEFAULT_READY_ATTEMPTS
}
fn default_interval_ms() -> u64 {
    DEFAULT_READY_INTERVAL_MS
}
fn default_replication_secs() -> u64 {
    5
}
fn default_ist_shutdown_secs() -> u64 {
    15
}
fn default_flow_control_lock_secs() -> u64 {
    120
}
