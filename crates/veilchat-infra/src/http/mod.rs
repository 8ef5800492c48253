//! HTTP gateway adapter.

pub mod gateway;

pub use gateway::HttpPrivacyGateway;
