//! Push transport port and frame decoding.
//!
//! The concrete client lives in veilchat-infra; this module defines the
//! object-safe trait the orchestrator programs against, plus the pure
//! frame decoder it shares.

pub mod frame;

use veilchat_types::error::StreamError;
use veilchat_types::transport::{ServerEvent, TransportState, TurnRequest};

use crate::observer::Subscription;

/// One push-style server connection plus a companion send endpoint.
///
/// Implementations own the connection lifecycle and notify observers;
/// no method returns a transport failure directly. `connect` and
/// `disconnect` are idempotent. `disconnect` suppresses the close
/// notification that the closure would otherwise fire, so observers can
/// distinguish voluntary from involuntary closure.
pub trait PushTransport: Send + Sync {
    /// Establish the push connection. No-op if already open or
    /// connecting. Success notifies open subscribers; failure notifies
    /// error subscribers and leaves the transport closed.
    fn connect(&self);

    /// Close any open connection and cancel pending work. Safe to call
    /// repeatedly. Never emits a close notification.
    fn disconnect(&self);

    /// Transmit a turn to the companion endpoint. Fire-and-forget: a
    /// transport-level failure is reported through the error
    /// notification path, not as a return value. A new send supersedes
    /// (aborts) any outstanding one.
    fn send(&self, request: TurnRequest);

    /// Current raw connection status.
    fn state(&self) -> TransportState;

    /// Register for decoded server events. Delivery to one subscriber
    /// follows arrival order.
    fn on_message(&self, callback: Box<dyn Fn(&ServerEvent) + Send + Sync>) -> Subscription;

    /// Register for transport and parse errors.
    fn on_error(&self, callback: Box<dyn Fn(&StreamError) + Send + Sync>) -> Subscription;

    /// Register for successful connection establishment.
    fn on_open(&self, callback: Box<dyn Fn() + Send + Sync>) -> Subscription;

    /// Register for involuntary closure. Emitted exactly once per
    /// actual closure, never for a `disconnect()` the caller requested.
    fn on_close(&self, callback: Box<dyn Fn() + Send + Sync>) -> Subscription;
}
