//! Error types for the streaming engine and the privacy gateway.
//!
//! Transport and connection failures never cross the orchestrator
//! boundary as panics; they surface as state transitions. These enums
//! are the typed payloads those transitions carry.

use thiserror::Error;
use uuid::Uuid;

/// Errors from the push transport and the streaming session engine.
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    /// Connection refused, dropped, or otherwise failed. Retryable.
    #[error("transport error: {0}")]
    Transport(String),

    /// A malformed frame was dropped. The connection stays open.
    #[error("frame parse error: {0}")]
    Parse(String),

    /// A bounded operation exceeded its deadline. Treated as a
    /// transport error by the recovery controller.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The server explicitly reported an error frame. Terminal for the
    /// named message only, not for the session.
    #[error("server error{}: {message}", .message_id.map(|id| format!(" for message {id}")).unwrap_or_default())]
    Application {
        message_id: Option<Uuid>,
        message: String,
    },

    /// The retry budget ran out.
    #[error("recovery exhausted after {attempts} attempts")]
    Exhausted { attempts: u32 },

    /// The connection is closed and no operation can proceed.
    #[error("transport closed")]
    Closed,
}

impl StreamError {
    /// Whether the recovery controller should treat this as retryable.
    ///
    /// Application errors are scoped to one message; parse errors drop
    /// a frame without closing the connection. Neither warrants a
    /// reconnect cycle.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StreamError::Transport(..) | StreamError::Timeout(..) | StreamError::Closed
        )
    }
}

/// Errors from the anonymize/deanonymize/verify gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Non-success HTTP status other than the session-expiry case.
    #[error("gateway returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The correlation session is gone (HTTP 404 on a session-scoped
    /// call). The caller may re-establish by anonymizing without a
    /// session id.
    #[error("session expired or unknown")]
    SessionExpired,

    /// The request never produced a response.
    #[error("request failed: {0}")]
    Request(String),

    /// The response body did not match the expected shape.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// The health probe failed or timed out.
    #[error("gateway unhealthy: {0}")]
    Unhealthy(String),
}

impl GatewayError {
    /// Map an HTTP status to the matching error, with 404 reserved for
    /// session expiry on session-scoped endpoints.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        match status {
            404 => GatewayError::SessionExpired,
            _ => GatewayError::Http {
                status,
                message: message.into(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_error_display_with_message_id() {
        let id = Uuid::now_v7();
        let err = StreamError::Application {
            message_id: Some(id),
            message: "model refused".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains(&id.to_string()));
        assert!(text.contains("model refused"));
    }

    #[test]
    fn test_stream_error_display_session_level() {
        let err = StreamError::Application {
            message_id: None,
            message: "backend down".to_string(),
        };
        assert_eq!(err.to_string(), "server error: backend down");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(StreamError::Transport("refused".to_string()).is_retryable());
        assert!(StreamError::Timeout("probe".to_string()).is_retryable());
        assert!(StreamError::Closed.is_retryable());
        assert!(!StreamError::Parse("bad frame".to_string()).is_retryable());
        assert!(
            !StreamError::Application {
                message_id: None,
                message: "x".to_string()
            }
            .is_retryable()
        );
        assert!(!StreamError::Exhausted { attempts: 3 }.is_retryable());
    }

    #[test]
    fn test_gateway_404_maps_to_session_expired() {
        assert!(matches!(
            GatewayError::from_status(404, "not found"),
            GatewayError::SessionExpired
        ));
        assert!(matches!(
            GatewayError::from_status(500, "boom"),
            GatewayError::Http { status: 500, .. }
        ));
    }
}
