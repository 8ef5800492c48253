//! Infrastructure adapters for Veilchat.
//!
//! Concrete implementations of the veilchat-core ports: the
//! reqwest-backed privacy gateway and the server-push stream transport,
//! plus the client configuration loader.

pub mod config;
pub mod http;
pub mod sse;
