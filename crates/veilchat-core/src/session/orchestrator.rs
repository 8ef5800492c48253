//! Session orchestrator: wires transport, recovery, gateway, and store.
//!
//! A user turn flows: append the human message, anonymize through the
//! gateway, open one streaming assistant placeholder, ensure the
//! transport is connected, and send the anonymized text with the
//! correlation id. Transport notifications dispatch reducer actions
//! keyed by the message id embedded in each frame. Transport failures
//! feed the recovery controller; recovery status transitions feed back
//! into the observable connection state.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use chrono::Utc;
use uuid::Uuid;

use veilchat_types::api::{AnonymizeRequest, BatchChatRequest, DeanonymizeRequest};
use veilchat_types::chat::{ConnectionState, MessageRole, VerificationEntry};
use veilchat_types::error::{GatewayError, StreamError};
use veilchat_types::recovery::RecoveryStatus;
use veilchat_types::transport::{ServerEvent, TurnRequest};

use crate::gateway::BoxPrivacyGateway;
use crate::observer::Subscription;
use crate::recovery::RecoveryController;
use crate::transport::PushTransport;

use super::state::SessionAction;
use super::store::SessionStore;

/// Bound on the attestation log.
const VERIFICATION_LOG_LIMIT: usize = 100;

/// Composes the streaming session engine.
pub struct ChatOrchestrator {
    transport: Arc<dyn PushTransport>,
    gateway: Arc<BoxPrivacyGateway>,
    store: Arc<SessionStore>,
    recovery: Arc<RecoveryController>,
    language: String,
    verification_log: Mutex<VecDeque<VerificationEntry>>,
    subscriptions: Mutex<Vec<Subscription>>,
    status_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    /// Whether the current fallback state was entered automatically
    /// (retry exhaustion) as opposed to a manual switch. Automatic
    /// fallback clears itself when recovery later succeeds; manual
    /// fallback only clears via [`Self::resume_streaming`].
    auto_fallback: AtomicBool,
}

impl ChatOrchestrator {
    pub fn new(
        transport: Arc<dyn PushTransport>,
        gateway: Arc<BoxPrivacyGateway>,
        store: Arc<SessionStore>,
        recovery: Arc<RecoveryController>,
        language: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            transport,
            gateway,
            store,
            recovery,
            language: language.into(),
            verification_log: Mutex::new(VecDeque::new()),
            subscriptions: Mutex::new(Vec::new()),
            status_task: Mutex::new(None),
            auto_fallback: AtomicBool::new(false),
        })
    }

    /// Register transport observers and start mirroring recovery status
    /// into the session. Call once after construction.
    pub fn start(self: &Arc<Self>) {
        let mut subscriptions = self.subscriptions.lock().unwrap_or_else(|e| e.into_inner());

        let weak = Arc::downgrade(self);
        subscriptions.push(self.transport.on_message(Box::new(move |event| {
            if let Some(this) = Weak::upgrade(&weak) {
                this.handle_server_event(event);
            }
        })));

        let weak = Arc::downgrade(self);
        subscriptions.push(self.transport.on_error(Box::new(move |error| {
            if let Some(this) = Weak::upgrade(&weak) {
                this.handle_transport_error(error);
            }
        })));

        let weak = Arc::downgrade(self);
        subscriptions.push(self.transport.on_open(Box::new(move || {
            if let Some(this) = Weak::upgrade(&weak) {
                this.store.dispatch(SessionAction::SetConnectionState {
                    state: ConnectionState::Connected,
                });
                this.store.dispatch(SessionAction::ClearError);
            }
        })));

        let weak = Arc::downgrade(self);
        subscriptions.push(self.transport.on_close(Box::new(move || {
            if let Some(this) = Weak::upgrade(&weak) {
                tracing::warn!("push connection closed involuntarily");
                this.store.dispatch(SessionAction::SetConnectionState {
                    state: ConnectionState::Disconnected,
                });
                this.spawn_recovery();
            }
        })));
        drop(subscriptions);

        let weak = Arc::downgrade(self);
        let mut status_rx = self.recovery.subscribe();
        let task = tokio::spawn(async move {
            while status_rx.changed().await.is_ok() {
                let status = *status_rx.borrow_and_update();
                let Some(this) = Weak::upgrade(&weak) else { break };
                this.apply_recovery_status(status);
            }
        });
        *self.status_task.lock().unwrap_or_else(|e| e.into_inner()) = Some(task);
    }

    // --- Turn handling ---

    /// Submit one user turn. Returns the id of the assistant message
    /// that will carry the reply.
    ///
    /// The human message is appended before anything that can fail, so
    /// a gateway or transport failure never drops user-authored text --
    /// it only fails the paired assistant response.
    pub async fn send_turn(&self, text: &str) -> Result<Uuid, GatewayError> {
        let human_id = self.store.add_message(MessageRole::Human, text);

        let anonymized = match self.anonymize_with_expiry_retry(text).await {
            Ok(response) => response,
            Err(err) => {
                self.store.dispatch(SessionAction::SetError {
                    id: None,
                    text: format!("anonymization failed: {err}"),
                });
                return Err(err);
            }
        };
        self.record_verification(VerificationEntry {
            message_id: human_id,
            content: text.to_string(),
            quote: anonymized.quote.clone(),
            signature: anonymized.signature.clone(),
            public_key: anonymized.public_key.clone(),
            signing_method: anonymized.signing_method.clone(),
            recorded_at: Utc::now(),
        });

        let session_id = anonymized.session_id.clone();
        if self.store.fallback_active() {
            self.run_fallback_turn(&anonymized.text, &session_id).await
        } else {
            self.run_streaming_turn(&anonymized.text, &session_id)
        }
    }

    /// Streaming path: placeholder message, connect, send.
    fn run_streaming_turn(
        &self,
        anonymized_text: &str,
        session_id: &str,
    ) -> Result<Uuid, GatewayError> {
        // A still-active stream would violate the one-stream invariant;
        // terminate it before opening the next.
        if let Some(prior) = self.store.active_stream_id() {
            tracing::warn!(%prior, "erroring still-active stream before new turn");
            self.store.dispatch(SessionAction::SetError {
                id: Some(prior),
                text: "superseded by a new turn".to_string(),
            });
        }

        let Some(assistant_id) = self.store.start_streaming(MessageRole::Assistant) else {
            return Err(GatewayError::Request(
                "could not open a streaming message slot".to_string(),
            ));
        };

        self.transport.connect();
        self.transport.send(TurnRequest {
            message_id: assistant_id,
            text: anonymized_text.to_string(),
            session_id: Some(session_id.to_string()),
        });
        Ok(assistant_id)
    }

    /// Fallback path: one synchronous batch exchange, de-anonymized and
    /// appended through the same completion contract as streamed turns.
    async fn run_fallback_turn(
        &self,
        anonymized_text: &str,
        session_id: &str,
    ) -> Result<Uuid, GatewayError> {
        let batch = self
            .gateway
            .batch_chat(BatchChatRequest {
                message: anonymized_text.to_string(),
                session_id: session_id.to_string(),
            })
            .await
            .map_err(|err| {
                self.store.dispatch(SessionAction::SetError {
                    id: None,
                    text: format!("fallback request failed: {err}"),
                });
                err
            })?;

        let reply = self
            .gateway
            .deanonymize(DeanonymizeRequest {
                text: batch.response,
                session_id: session_id.to_string(),
            })
            .await
            .map_err(|err| {
                let text = match &err {
                    GatewayError::SessionExpired => {
                        "session expired; please reset the conversation".to_string()
                    }
                    other => format!("de-anonymization failed: {other}"),
                };
                self.store.dispatch(SessionAction::SetError { id: None, text });
                err
            })?;

        let assistant_id = self.store.add_message(MessageRole::Assistant, reply.text.clone());
        self.record_verification(VerificationEntry {
            message_id: assistant_id,
            content: reply.text,
            quote: reply.quote,
            signature: reply.signature,
            public_key: reply.public_key,
            signing_method: reply.signing_method,
            recorded_at: Utc::now(),
        });
        Ok(assistant_id)
    }

    /// Anonymize, re-establishing the correlation session once if the
    /// gateway reports it expired. The adopted id lands in the store
    /// either way.
    async fn anonymize_with_expiry_retry(
        &self,
        text: &str,
    ) -> Result<veilchat_types::api::AnonymizeResponse, GatewayError> {
        let session_id = self.store.session_id();
        let had_session = session_id.is_some();

        let request = AnonymizeRequest {
            text: text.to_string(),
            session_id,
            language: Some(self.language.clone()),
        };

        let response = match self.gateway.anonymize(request).await {
            Err(GatewayError::SessionExpired) if had_session => {
                tracing::warn!("correlation session expired; establishing a new one");
                let retry = AnonymizeRequest {
                    text: text.to_string(),
                    session_id: None,
                    language: Some(self.language.clone()),
                };
                let response = self.gateway.anonymize(retry).await?;
                self.store.dispatch(SessionAction::RenewSessionId {
                    session_id: response.session_id.clone(),
                });
                return Ok(response);
            }
            other => other?,
        };

        self.store.dispatch(SessionAction::SetSessionId {
            session_id: response.session_id.clone(),
        });
        Ok(response)
    }

    // --- Transport notifications ---

    fn handle_server_event(&self, event: &ServerEvent) {
        match event {
            ServerEvent::ContentDelta { message_id, delta } => {
                self.store.dispatch(SessionAction::AppendContent {
                    id: *message_id,
                    delta: delta.clone(),
                });
            }
            ServerEvent::MessageComplete {
                message_id,
                content,
            } => {
                self.store.dispatch(SessionAction::CompleteMessage {
                    id: *message_id,
                    final_content: content.clone(),
                });
            }
            ServerEvent::Error {
                message_id,
                message,
            } => {
                self.store.dispatch(SessionAction::SetError {
                    id: *message_id,
                    text: message.clone(),
                });
            }
            ServerEvent::SessionCreated { session_id } => {
                self.store.dispatch(SessionAction::SetSessionId {
                    session_id: session_id.clone(),
                });
            }
            ServerEvent::Ping => {
                tracing::trace!("keepalive");
            }
        }
    }

    fn handle_transport_error(&self, error: &StreamError) {
        match error {
            StreamError::Parse(reason) => {
                // Dropped frame; the connection stays open.
                tracing::warn!(%reason, "malformed frame dropped");
            }
            retryable if retryable.is_retryable() => {
                self.store.dispatch(SessionAction::SetError {
                    id: None,
                    text: error.to_string(),
                });
                self.spawn_recovery();
            }
            other => {
                self.store.dispatch(SessionAction::SetError {
                    id: None,
                    text: other.to_string(),
                });
            }
        }
    }

    fn spawn_recovery(&self) {
        let recovery = self.recovery.clone();
        tokio::spawn(async move {
            recovery.trigger_recovery().await;
        });
    }

    fn apply_recovery_status(&self, status: RecoveryStatus) {
        let state = match status {
            RecoveryStatus::Idle => ConnectionState::Disconnected,
            RecoveryStatus::Connecting => ConnectionState::Connecting,
            RecoveryStatus::Recovering => ConnectionState::Recovering,
            // Waiting out a scheduled retry is still "recovering" to
            // an outside observer.
            RecoveryStatus::Disconnected => ConnectionState::Recovering,
            RecoveryStatus::Connected => ConnectionState::Connected,
            RecoveryStatus::Error => ConnectionState::Error,
        };
        self.store
            .dispatch(SessionAction::SetConnectionState { state });

        if status == RecoveryStatus::Connected {
            if self.recovery.is_degraded() {
                self.auto_fallback.store(true, Ordering::SeqCst);
                self.store
                    .dispatch(SessionAction::SetFallbackMode { active: true });
            } else if self.auto_fallback.swap(false, Ordering::SeqCst) {
                // Real connectivity returned after automatic fallback.
                self.store
                    .dispatch(SessionAction::SetFallbackMode { active: false });
            }
        }
    }

    // --- Mode switches and lifecycle ---

    /// Manually route subsequent turns through the synchronous batch
    /// path. The push transport is shut down voluntarily.
    pub fn switch_to_fallback(&self) {
        tracing::info!("switching to fallback mode");
        self.transport.disconnect();
        self.recovery.enable_fallback();
        self.store
            .dispatch(SessionAction::SetFallbackMode { active: true });
        self.store.dispatch(SessionAction::SetConnectionState {
            state: ConnectionState::Connected,
        });
    }

    /// Leave fallback mode and force a reconnect attempt.
    pub fn resume_streaming(&self) {
        tracing::info!("leaving fallback mode");
        self.auto_fallback.store(false, Ordering::SeqCst);
        self.recovery.disable_fallback();
        self.store
            .dispatch(SessionAction::SetFallbackMode { active: false });
        self.recovery.force_reconnect();
    }

    /// Destroy the conversation and all recovery state.
    pub fn reset(&self) {
        self.transport.disconnect();
        self.recovery.reset();
        self.store.dispatch(SessionAction::Reset);
        self.verification_log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.auto_fallback.store(false, Ordering::SeqCst);
    }

    /// Detach observers and stop background work. The store survives.
    pub fn shutdown(&self) {
        for subscription in self
            .subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
        {
            subscription.dispose();
        }
        if let Some(task) = self
            .status_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }
        self.transport.disconnect();
    }

    /// Attestation entries recorded for this conversation, oldest first.
    pub fn verification_log(&self) -> Vec<VerificationEntry> {
        self.verification_log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    fn record_verification(&self, entry: VerificationEntry) {
        let mut log = self
            .verification_log
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if log.len() >= VERIFICATION_LOG_LIMIT {
            log.pop_front();
        }
        log.push_back(entry);
    }
}
