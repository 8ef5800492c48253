//! Shared domain types for Veilchat.
//!
//! Pure data definitions used across the workspace: chat messages and
//! session snapshots, stream frames and server events, recovery tracking,
//! gateway request/response DTOs, error enums, and client configuration.
//! This crate has no IO dependencies.

pub mod api;
pub mod chat;
pub mod config;
pub mod error;
pub mod recovery;
pub mod transport;
