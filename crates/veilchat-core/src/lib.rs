//! Streaming session engine for Veilchat.
//!
//! This crate holds the protocol and state-machine core: the pure
//! session reducer, the recovery controller, the stream frame decoder,
//! and the orchestrator that composes them. It defines the "ports"
//! (transport and gateway traits) that the infrastructure layer
//! implements. It depends only on `veilchat-types` -- never on
//! `veilchat-infra` or any HTTP crate.

pub mod gateway;
pub mod observer;
pub mod recovery;
pub mod schedule;
pub mod session;
pub mod transport;
