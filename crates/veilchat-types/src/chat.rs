//! Chat message and session snapshot types for Veilchat.
//!
//! These types model one logical conversation as seen by the client:
//! an ordered message log, the identity of the in-flight streaming
//! message, and the externally observable connection status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Author of a message in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    Human,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::Human => write!(f, "human"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(MessageRole::Human),
            "assistant" => Ok(MessageRole::Assistant),
            other => Err(format!("invalid message role: '{other}'")),
        }
    }
}

/// A single message in the conversation log.
///
/// Identity is immutable; `content` is append-only while `streaming` is
/// true. A message makes exactly one terminal transition: either
/// `complete = true` or `error_text = Some(..)`. After that it never
/// mutates again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: MessageRole,
    pub content: String,
    /// True while deltas may still be appended.
    pub streaming: bool,
    /// True once the message reached its successful terminal state.
    pub complete: bool,
    pub created_at: DateTime<Utc>,
    /// Correlation id of the conversation this message belongs to.
    pub session_id: Option<String>,
    /// Terminal error for this message, if delivery failed.
    pub error_text: Option<String>,
}

impl ChatMessage {
    /// Create a completed (non-streaming) message.
    pub fn completed(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            role,
            content: content.into(),
            streaming: false,
            complete: true,
            created_at: Utc::now(),
            session_id: None,
            error_text: None,
        }
    }

    /// Create an empty streaming placeholder message.
    pub fn streaming_placeholder(role: MessageRole) -> Self {
        Self {
            id: Uuid::now_v7(),
            role,
            content: String::new(),
            streaming: true,
            complete: false,
            created_at: Utc::now(),
            session_id: None,
            error_text: None,
        }
    }

    /// Whether the message has made its terminal transition.
    pub fn is_terminal(&self) -> bool {
        self.complete || self.error_text.is_some()
    }
}

/// Externally observable connection status of a session.
///
/// A single authoritative value, written only by the orchestrator in
/// reaction to recovery controller transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connected,
    Connecting,
    Disconnected,
    Recovering,
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Recovering => write!(f, "recovering"),
            ConnectionState::Error => write!(f, "error"),
        }
    }
}

impl FromStr for ConnectionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "connected" => Ok(ConnectionState::Connected),
            "connecting" => Ok(ConnectionState::Connecting),
            "disconnected" => Ok(ConnectionState::Disconnected),
            "recovering" => Ok(ConnectionState::Recovering),
            "error" => Ok(ConnectionState::Error),
            other => Err(format!("invalid connection state: '{other}'")),
        }
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Disconnected
    }
}

/// Attestation record for one anonymize/deanonymize exchange.
///
/// The gateway signs its transformations inside the enclave; each
/// response may carry a quote, signature, signing key, and method. The
/// orchestrator keeps a bounded log of these so a consumer can display
/// or re-verify attestation per message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationEntry {
    /// Id of the message this attestation covers.
    pub message_id: Uuid,
    /// The plaintext the signature covers.
    pub content: String,
    pub quote: Option<String>,
    pub signature: Option<String>,
    pub public_key: Option<String>,
    pub signing_method: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl VerificationEntry {
    /// Whether enough material is present to attempt verification.
    pub fn is_verifiable(&self) -> bool {
        self.quote.is_some() && self.signature.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_role_roundtrip() {
        for role in [MessageRole::Human, MessageRole::Assistant] {
            let s = role.to_string();
            let parsed: MessageRole = s.parse().unwrap();
            assert_eq!(role, parsed);
        }
    }

    #[test]
    fn test_connection_state_roundtrip() {
        for state in [
            ConnectionState::Connected,
            ConnectionState::Connecting,
            ConnectionState::Disconnected,
            ConnectionState::Recovering,
            ConnectionState::Error,
        ] {
            let s = state.to_string();
            let parsed: ConnectionState = s.parse().unwrap();
            assert_eq!(state, parsed);
        }
    }

    #[test]
    fn test_connection_state_default_is_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_completed_message_is_terminal() {
        let msg = ChatMessage::completed(MessageRole::Human, "hello");
        assert!(msg.complete);
        assert!(!msg.streaming);
        assert!(msg.is_terminal());
    }

    #[test]
    fn test_streaming_placeholder_is_not_terminal() {
        let msg = ChatMessage::streaming_placeholder(MessageRole::Assistant);
        assert!(msg.streaming);
        assert!(!msg.complete);
        assert!(msg.content.is_empty());
        assert!(!msg.is_terminal());
    }

    #[test]
    fn test_errored_message_is_terminal() {
        let mut msg = ChatMessage::streaming_placeholder(MessageRole::Assistant);
        msg.streaming = false;
        msg.error_text = Some("upstream error".to_string());
        assert!(msg.is_terminal());
        assert!(!msg.complete);
    }

    #[test]
    fn test_verification_entry_needs_quote_and_signature() {
        let entry = VerificationEntry {
            message_id: Uuid::now_v7(),
            content: "hi".to_string(),
            quote: Some("0xabc".to_string()),
            signature: None,
            public_key: None,
            signing_method: None,
            recorded_at: Utc::now(),
        };
        assert!(!entry.is_verifiable());
    }

    #[test]
    fn test_chat_message_serde() {
        let msg = ChatMessage::completed(MessageRole::Assistant, "done");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"role\":\"assistant\""));
        let parsed: ChatMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.content, "done");
    }
}
