//! Pure state-transition function for the conversation.
//!
//! All conversation mutation flows through [`apply`]: a total function
//! of (state, action) -> state. No transition panics; malformed input
//! (unknown id, terminal message, duplicate stream) degrades to a no-op
//! on the log plus an observable error field.

use uuid::Uuid;

use veilchat_types::chat::{ChatMessage, ConnectionState, MessageRole};

/// Snapshot of one logical conversation.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    /// Ordered message log. Messages are only ever removed by `Reset`.
    pub messages: Vec<ChatMessage>,
    /// The at-most-one in-flight streaming message.
    pub active_stream_id: Option<Uuid>,
    /// Correlation id binding all gateway calls of this conversation.
    /// Write-once; see [`SessionAction::RenewSessionId`] for the
    /// expiry-recovery exception.
    pub session_id: Option<String>,
    pub connection_state: ConnectionState,
    pub fallback_active: bool,
    pub last_error: Option<String>,
}

impl SessionState {
    /// Look up a message by id.
    pub fn message(&self, id: Uuid) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }
}

/// The only legal mutations of a [`SessionState`].
#[derive(Debug, Clone)]
pub enum SessionAction {
    /// Append an already-complete message.
    AddMessage { role: MessageRole, content: String },
    /// Open a streaming placeholder. The caller supplies the id so it
    /// can address later deltas. Precondition: no stream is active --
    /// the caller completes or errors the previous one first.
    StartStreaming { id: Uuid, role: MessageRole },
    /// Append a delta to the message matching `id`. Appending to an
    /// unknown or already-terminal message is a silent no-op: completion
    /// frames may race deltas arriving from a lagging network buffer.
    AppendContent { id: Uuid, delta: String },
    /// Terminal success. When `final_content` is present it replaces
    /// the accumulated deltas outright (the server's authoritative
    /// final text wins).
    CompleteMessage {
        id: Uuid,
        final_content: Option<String>,
    },
    /// Terminal failure for one message, or a session-level error when
    /// `id` is `None`.
    SetError { id: Option<Uuid>, text: String },
    ClearError,
    /// Adopt the correlation id assigned by the gateway. Immutable once
    /// set: a conflicting assignment is a no-op plus an error.
    SetSessionId { session_id: String },
    /// Replace the correlation id after the gateway reported the old
    /// session expired. Used only on the expiry-recovery path.
    RenewSessionId { session_id: String },
    SetConnectionState { state: ConnectionState },
    SetFallbackMode { active: bool },
    /// Destroy the conversation: empties the log and returns every
    /// field to its default.
    Reset,
}

/// Apply one action. Total: never panics, never fails.
pub fn apply(mut state: SessionState, action: SessionAction) -> SessionState {
    match action {
        SessionAction::AddMessage { role, content } => {
            let mut message = ChatMessage::completed(role, content);
            message.session_id = state.session_id.clone();
            state.messages.push(message);
        }

        SessionAction::StartStreaming { id, role } => {
            if state.active_stream_id.is_some() {
                state.last_error =
                    Some("cannot start a stream while another is active".to_string());
                return state;
            }
            let mut message = ChatMessage::streaming_placeholder(role);
            message.id = id;
            message.session_id = state.session_id.clone();
            state.messages.push(message);
            state.active_stream_id = Some(id);
        }

        SessionAction::AppendContent { id, delta } => {
            if let Some(message) = state.messages.iter_mut().find(|m| m.id == id) {
                if !message.is_terminal() {
                    message.content.push_str(&delta);
                }
            }
        }

        SessionAction::CompleteMessage { id, final_content } => {
            match state.messages.iter_mut().find(|m| m.id == id) {
                Some(message) if !message.is_terminal() => {
                    if let Some(content) = final_content {
                        message.content = content;
                    }
                    message.streaming = false;
                    message.complete = true;
                }
                Some(_) => {} // already terminal; late duplicate
                None => {
                    state.last_error = Some(format!("completion for unknown message {id}"));
                }
            }
            if state.active_stream_id == Some(id) {
                state.active_stream_id = None;
            }
        }

        SessionAction::SetError { id, text } => match id {
            Some(id) => {
                match state.messages.iter_mut().find(|m| m.id == id) {
                    Some(message) if !message.is_terminal() => {
                        message.streaming = false;
                        message.error_text = Some(text);
                    }
                    Some(_) => {}
                    None => {
                        state.last_error = Some(format!("error for unknown message {id}: {text}"));
                    }
                }
                if state.active_stream_id == Some(id) {
                    state.active_stream_id = None;
                }
            }
            None => {
                state.last_error = Some(text);
            }
        },

        SessionAction::ClearError => {
            state.last_error = None;
        }

        SessionAction::SetSessionId { session_id } => match &state.session_id {
            None => state.session_id = Some(session_id),
            Some(current) if *current == session_id => {}
            Some(current) => {
                state.last_error = Some(format!(
                    "refusing to replace session id '{current}' with '{session_id}'"
                ));
            }
        },

        SessionAction::RenewSessionId { session_id } => {
            state.session_id = Some(session_id);
        }

        SessionAction::SetConnectionState { state: connection } => {
            state.connection_state = connection;
        }

        SessionAction::SetFallbackMode { active } => {
            state.fallback_active = active;
        }

        SessionAction::Reset => {
            state = SessionState::default();
        }
    }
    state
}
