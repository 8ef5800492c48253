//! Server-push stream transport.

pub mod client;

pub use client::SseTransport;
