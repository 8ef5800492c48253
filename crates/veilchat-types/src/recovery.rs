//! Recovery controller types: attempt records, status, and tuning.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;

/// Diagnostic record of one recovery attempt.
///
/// Append-only, bounded history (last [`RecoveryConfig::HISTORY_LIMIT`]).
/// Never consulted for correctness decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryAttempt {
    /// 1-based attempt number within the current retry run.
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
    /// None while the attempt is still in flight.
    pub succeeded: Option<bool>,
    pub duration_ms: Option<u64>,
    pub error_text: Option<String>,
}

/// Observable state of the recovery controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryStatus {
    Idle,
    Recovering,
    Connected,
    Connecting,
    Disconnected,
    Error,
}

impl fmt::Display for RecoveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryStatus::Idle => write!(f, "idle"),
            RecoveryStatus::Recovering => write!(f, "recovering"),
            RecoveryStatus::Connected => write!(f, "connected"),
            RecoveryStatus::Connecting => write!(f, "connecting"),
            RecoveryStatus::Disconnected => write!(f, "disconnected"),
            RecoveryStatus::Error => write!(f, "error"),
        }
    }
}

/// Tuning knobs for retry backoff and health probing.
///
/// These are configuration, not behavior contracts: deployments may
/// adjust them freely. Jitter is always additive, uniform over
/// `[0, 1000)` ms, and not configurable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Retry budget before the controller stops retrying on its own.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First retry delay in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Exponential growth factor applied per attempt.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Upper bound on the computed delay, before jitter.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Passive health probe period while connected.
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,
    /// Hard bound on a single health probe.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Whether exhausting retries degrades to connected-with-fallback
    /// instead of a hard error.
    #[serde(default)]
    pub fallback_enabled: bool,
}

impl RecoveryConfig {
    /// Number of attempts kept in the diagnostic history.
    pub const HISTORY_LIMIT: usize = 10;
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_health_check_interval_ms() -> u64 {
    30_000
}

fn default_probe_timeout_ms() -> u64 {
    5000
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            health_check_interval_ms: default_health_check_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            fallback_enabled: false,
        }
    }
}
