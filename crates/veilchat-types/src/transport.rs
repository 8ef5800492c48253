//! Stream frame and server event types for the push transport.
//!
//! A raw frame is a newline-delimited field set (`id`, `event`, `data`,
//! `retry`); its `data` payload is JSON with a `type` discriminator. The
//! decoder in veilchat-core produces [`StreamFrame`]s; the transport
//! client deserializes their payloads into [`ServerEvent`]s.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;

/// One decoded unit of server-pushed data.
///
/// `data` lines concatenate with `\n`. Unknown fields in the raw frame
/// are ignored by the decoder and never reach this type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamFrame {
    /// Frame identifier, replayed as a resume hint on reconnect.
    pub id: Option<String>,
    /// Event name; absent means the default message event.
    pub event: Option<String>,
    /// Concatenated data payload.
    pub data: String,
    /// Server-suggested reconnect delay in milliseconds.
    pub retry: Option<u64>,
}

impl StreamFrame {
    /// Whether the frame carries anything worth dispatching.
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.event.is_none() && self.data.is_empty() && self.retry.is_none()
    }
}

/// Logical payload of a stream frame.
///
/// The wire format uses a `type` discriminator in kebab-case, e.g.
/// `{"type":"content-delta","message_id":"..","delta":"Hi"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// An incremental fragment of an in-progress assistant message.
    ContentDelta { message_id: Uuid, delta: String },

    /// The message finished; `content` is the server's authoritative
    /// final text when present.
    MessageComplete {
        message_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },

    /// The server reported an error, scoped to one message when
    /// `message_id` is present, otherwise session-wide.
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        message_id: Option<Uuid>,
        message: String,
    },

    /// The server assigned the session correlation id.
    SessionCreated { session_id: String },

    /// Keepalive.
    Ping,
}

/// Connection status of the push transport itself.
///
/// Distinct from the session-level `ConnectionState`: this reflects the
/// raw socket, not what the orchestrator tells observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Closed,
    Connecting,
    Open,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportState::Closed => write!(f, "closed"),
            TransportState::Connecting => write!(f, "connecting"),
            TransportState::Open => write!(f, "open"),
        }
    }
}

/// Client->server payload for the companion send endpoint.
///
/// The push channel is receive-only; requests travel over a separate
/// endpoint carrying the anonymized text and correlation id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRequest {
    /// Id of the streaming assistant message the reply should target.
    pub message_id: Uuid,
    /// Anonymized user text.
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}
