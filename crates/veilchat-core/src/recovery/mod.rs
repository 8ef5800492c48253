//! Failure detection and recovery.
//!
//! The controller wraps a health probe and a recovery procedure,
//! retrying with bounded exponential backoff plus jitter. Above the
//! retry threshold it either flips to a degraded fallback mode or
//! parks in an error state for the user to resolve.

pub mod backoff;
pub mod controller;
pub mod probe;

pub use controller::RecoveryController;
pub use probe::{GatewayProbe, HealthProbe, RecoverAction, TransportRecovery};
