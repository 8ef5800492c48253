//! SseTransport -- concrete [`PushTransport`] over an HTTP event stream.
//!
//! Owns one receive-only push connection and a companion send endpoint.
//! The response body is pumped through the core [`FrameDecoder`]; each
//! decoded frame's JSON payload becomes a [`ServerEvent`] delivered to
//! message observers in arrival order. There is exactly one error
//! handling path: every failure -- connect, read, frame parse, payload
//! parse, send -- reaches observers through the error registry.
//!
//! Closure semantics: a close notification fires exactly once per
//! involuntary closure. `disconnect()` cancels the reader before it can
//! observe the closure, which suppresses the notification and lets
//! observers distinguish voluntary shutdown.
//!
//! On reconnect the identifier of the last decoded frame is replayed in
//! a `Last-Event-ID` header to reduce (not eliminate) duplicate or
//! missed delivery.

use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use veilchat_core::observer::{ObserverRegistry, Subscription};
use veilchat_core::transport::frame::FrameDecoder;
use veilchat_core::transport::PushTransport;
use veilchat_types::config::ClientConfig;
use veilchat_types::error::StreamError;
use veilchat_types::transport::{ServerEvent, StreamFrame, TransportState, TurnRequest};

struct ConnState {
    status: TransportState,
    /// Bumped on every connect/disconnect; state changes from a stale
    /// reader generation are discarded.
    generation: u64,
    reader_cancel: Option<CancellationToken>,
    send_cancel: Option<CancellationToken>,
}

struct SseInner {
    http: reqwest::Client,
    stream_url: String,
    send_url: String,
    conn: Mutex<ConnState>,
    last_event_id: Mutex<Option<String>>,
    /// Server-suggested reconnect delay from the most recent `retry`
    /// field, surfaced for diagnostics.
    retry_hint: Mutex<Option<u64>>,
    messages: ObserverRegistry<ServerEvent>,
    errors: ObserverRegistry<StreamError>,
    opens: ObserverRegistry<()>,
    closes: ObserverRegistry<()>,
}

/// Push transport client over an HTTP event stream.
pub struct SseTransport {
    inner: Arc<SseInner>,
}

impl SseTransport {
    pub fn new(stream_url: impl Into<String>, send_url: impl Into<String>) -> Self {
        // No overall timeout: the push stream is long-lived by design.
        let http = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("failed to create reqwest client");
        Self {
            inner: Arc::new(SseInner {
                http,
                stream_url: stream_url.into(),
                send_url: send_url.into(),
                conn: Mutex::new(ConnState {
                    status: TransportState::Closed,
                    generation: 0,
                    reader_cancel: None,
                    send_cancel: None,
                }),
                last_event_id: Mutex::new(None),
                retry_hint: Mutex::new(None),
                messages: ObserverRegistry::new(),
                errors: ObserverRegistry::new(),
                opens: ObserverRegistry::new(),
                closes: ObserverRegistry::new(),
            }),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.stream_url(), config.send_url())
    }

    /// Most recent server-suggested reconnect delay, in milliseconds.
    pub fn retry_hint(&self) -> Option<u64> {
        *self
            .inner
            .retry_hint
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Resume hint that will be replayed on the next connect.
    pub fn last_event_id(&self) -> Option<String> {
        self.inner
            .last_event_id
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl SseInner {
    fn lock_conn(&self) -> std::sync::MutexGuard<'_, ConnState> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Transition to open if this reader generation is still current.
    fn mark_open(&self, generation: u64) -> bool {
        let mut conn = self.lock_conn();
        if conn.generation != generation {
            return false;
        }
        conn.status = TransportState::Open;
        true
    }

    /// Transition to closed if this reader generation is still current.
    /// Returns false for stale readers so a superseded connection can
    /// never emit notifications for the one that replaced it.
    fn mark_closed(&self, generation: u64) -> bool {
        let mut conn = self.lock_conn();
        if conn.generation != generation {
            return false;
        }
        conn.status = TransportState::Closed;
        conn.reader_cancel = None;
        true
    }

    fn dispatch_frame(&self, frame: StreamFrame) {
        if let Some(id) = &frame.id {
            *self
                .last_event_id
                .lock()
                .unwrap_or_else(|e| e.into_inner()) = Some(id.clone());
        }
        if let Some(ms) = frame.retry {
            *self.retry_hint.lock().unwrap_or_else(|e| e.into_inner()) = Some(ms);
        }
        if frame.data.is_empty() {
            return; // id-only or retry-only frame
        }
        match parse_event(&frame) {
            Ok(event) => self.messages.notify(&event),
            Err(err) => {
                tracing::warn!(error = %err, "dropping undecodable frame payload");
                self.errors.notify(&err);
            }
        }
    }
}

/// Decode a frame's data payload into a [`ServerEvent`].
///
/// The JSON `type` discriminator is authoritative; the frame's `event`
/// name is informational only, so transport-level and named error
/// frames share this single path.
fn parse_event(frame: &StreamFrame) -> Result<ServerEvent, StreamError> {
    serde_json::from_str(&frame.data).map_err(|err| {
        StreamError::Parse(format!(
            "undecodable event payload (event={:?}): {err}",
            frame.event
        ))
    })
}

async fn run_reader(inner: Arc<SseInner>, cancel: CancellationToken, generation: u64) {
    let mut request = inner
        .http
        .get(&inner.stream_url)
        .header(reqwest::header::ACCEPT, "text/event-stream");
    let resume = inner
        .last_event_id
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .clone();
    if let Some(id) = resume {
        request = request.header("Last-Event-ID", id);
    }

    let response = tokio::select! {
        _ = cancel.cancelled() => return,
        response = request.send() => response,
    };

    let response = match response.and_then(|r| r.error_for_status()) {
        Ok(response) => response,
        Err(err) => {
            // Never opened: error only, no close notification.
            if inner.mark_closed(generation) {
                inner
                    .errors
                    .notify(&StreamError::Transport(format!("connect failed: {err}")));
            }
            return;
        }
    };

    if !inner.mark_open(generation) {
        return; // superseded while connecting
    }
    tracing::info!(url = %inner.stream_url, "push stream open");
    inner.opens.notify(&());

    let mut decoder = FrameDecoder::new();
    let mut body = response.bytes_stream();
    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => return, // voluntary; close suppressed
            chunk = body.next() => chunk,
        };
        match chunk {
            Some(Ok(bytes)) => {
                for item in decoder.feed(&bytes) {
                    match item {
                        Ok(frame) => inner.dispatch_frame(frame),
                        Err(err) => {
                            // Malformed frame: dropped and reported,
                            // the connection stays open.
                            tracing::warn!(error = %err, "dropping malformed frame");
                            inner.errors.notify(&err);
                        }
                    }
                }
            }
            Some(Err(err)) => {
                if inner.mark_closed(generation) {
                    inner
                        .errors
                        .notify(&StreamError::Transport(format!("stream read failed: {err}")));
                    inner.closes.notify(&());
                }
                return;
            }
            None => {
                // Server ended the stream cleanly.
                if inner.mark_closed(generation) {
                    inner.closes.notify(&());
                }
                return;
            }
        }
    }
}

impl PushTransport for SseTransport {
    fn connect(&self) {
        let mut conn = self.inner.lock_conn();
        match conn.status {
            TransportState::Open | TransportState::Connecting => return,
            TransportState::Closed => {}
        }
        conn.generation += 1;
        let generation = conn.generation;
        conn.status = TransportState::Connecting;
        let cancel = CancellationToken::new();
        conn.reader_cancel = Some(cancel.clone());
        drop(conn);

        tokio::spawn(run_reader(self.inner.clone(), cancel, generation));
    }

    fn disconnect(&self) {
        let mut conn = self.inner.lock_conn();
        if let Some(cancel) = conn.reader_cancel.take() {
            cancel.cancel();
        }
        if let Some(cancel) = conn.send_cancel.take() {
            cancel.cancel();
        }
        conn.generation += 1;
        conn.status = TransportState::Closed;
    }

    fn send(&self, request: TurnRequest) {
        let cancel = CancellationToken::new();
        {
            let mut conn = self.inner.lock_conn();
            // Last request wins: abort any outstanding send so a stale
            // response can never land after a newer request started.
            if let Some(previous) = conn.send_cancel.replace(cancel.clone()) {
                previous.cancel();
            }
        }

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("send superseded by a newer request");
                    return;
                }
                result = inner.http.post(&inner.send_url).json(&request).send() => result,
            };
            if let Err(err) = result.and_then(|r| r.error_for_status()) {
                inner
                    .errors
                    .notify(&StreamError::Transport(format!("send failed: {err}")));
            }
        });
    }

    fn state(&self) -> TransportState {
        self.inner.lock_conn().status
    }

    fn on_message(&self, callback: Box<dyn Fn(&ServerEvent) + Send + Sync>) -> Subscription {
        self.inner.messages.subscribe(move |event| callback(event))
    }

    fn on_error(&self, callback: Box<dyn Fn(&StreamError) + Send + Sync>) -> Subscription {
        self.inner.errors.subscribe(move |error| callback(error))
    }

    fn on_open(&self, callback: Box<dyn Fn() + Send + Sync>) -> Subscription {
        self.inner.opens.subscribe(move |_| callback())
    }

    fn on_close(&self, callback: Box<dyn Fn() + Send + Sync>) -> Subscription {
        self.inner.closes.subscribe(move |_| callback())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn frame(data: &str) -> StreamFrame {
        StreamFrame {
            id: None,
            event: None,
            data: data.to_string(),
            retry: None,
        }
    }

    #[test]
    fn test_parse_event_valid_payload() {
        let id = uuid::Uuid::now_v7();
        let data = format!(r#"{{"type":"content-delta","message_id":"{id}","delta":"Hi"}}"#);
        let event = parse_event(&frame(&data)).unwrap();
        assert!(matches!(event, ServerEvent::ContentDelta { delta, .. } if delta == "Hi"));
    }

    #[test]
    fn test_parse_event_invalid_payload_is_parse_error() {
        let result = parse_event(&frame("not json"));
        assert!(matches!(result, Err(StreamError::Parse(_))));
    }

    #[test]
    fn test_parse_event_unknown_type_is_parse_error() {
        let result = parse_event(&frame(r#"{"type":"mystery"}"#));
        assert!(matches!(result, Err(StreamError::Parse(_))));
    }

    #[tokio::test]
    async fn test_dispatch_frame_updates_resume_and_retry_hints() {
        let transport = SseTransport::new("http://unused/stream", "http://unused/send");
        transport.inner.dispatch_frame(StreamFrame {
            id: Some("41".to_string()),
            event: None,
            data: String::new(),
            retry: Some(2500),
        });

        assert_eq!(transport.last_event_id().as_deref(), Some("41"));
        assert_eq!(transport.retry_hint(), Some(2500));
    }

    #[tokio::test]
    async fn test_connect_failure_notifies_error_without_close() {
        // Bind-then-drop yields a port with nothing listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = SseTransport::new(
            format!("http://{addr}/stream"),
            format!("http://{addr}/send"),
        );
        let errors = Arc::new(AtomicU32::new(0));
        let closes = Arc::new(AtomicU32::new(0));
        let e2 = errors.clone();
        let _err_sub = transport.on_error(Box::new(move |_| {
            e2.fetch_add(1, Ordering::SeqCst);
        }));
        let c2 = closes.clone();
        let _close_sub = transport.on_close(Box::new(move || {
            c2.fetch_add(1, Ordering::SeqCst);
        }));

        transport.connect();
        let mut waited = 0;
        while errors.load(Ordering::SeqCst) == 0 && waited < 500 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            waited += 1;
        }

        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(closes.load(Ordering::SeqCst), 0, "failed connect never opened");
        assert_eq!(transport.state(), TransportState::Closed);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let transport = SseTransport::new("http://unused/stream", "http://unused/send");
        transport.disconnect();
        transport.disconnect();
        assert_eq!(transport.state(), TransportState::Closed);
    }

    #[tokio::test]
    async fn test_send_failure_reports_through_error_path() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = SseTransport::new(
            format!("http://{addr}/stream"),
            format!("http://{addr}/send"),
        );
        let errors = Arc::new(AtomicU32::new(0));
        let e2 = errors.clone();
        let _sub = transport.on_error(Box::new(move |err| {
            assert!(matches!(err, StreamError::Transport(_)));
            e2.fetch_add(1, Ordering::SeqCst);
        }));

        transport.send(TurnRequest {
            message_id: uuid::Uuid::now_v7(),
            text: "hi".to_string(),
            session_id: None,
        });

        let mut waited = 0;
        while errors.load(Ordering::SeqCst) == 0 && waited < 500 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            waited += 1;
        }
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }
}
