//! Observability setup for Veilchat.

pub mod tracing_setup;
