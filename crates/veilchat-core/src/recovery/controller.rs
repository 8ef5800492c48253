//! Recovery controller: bounded retry with backoff, health polling, and
//! fallback promotion.
//!
//! State machine: `idle -> recovering -> {connected | disconnected
//! (scheduled retry) | error (exhausted)}`. Exactly one recovery attempt
//! may be outstanding at a time, guarded by an in-flight flag checked at
//! the top of [`RecoveryController::trigger_recovery`]. Backoff-scheduled
//! retries are strictly serialized: the next attempt is scheduled only
//! after the current one concludes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use veilchat_types::error::StreamError;
use veilchat_types::recovery::{RecoveryAttempt, RecoveryConfig, RecoveryStatus};

use super::backoff;
use super::probe::{HealthProbe, HealthProbeDyn, RecoverAction, RecoverActionDyn};
use crate::schedule::ScheduledTask;

struct ControllerInner {
    retry_count: u32,
    last_error: Option<String>,
    history: VecDeque<RecoveryAttempt>,
    pending_retry: Option<ScheduledTask>,
    health_loop: Option<ScheduledTask>,
    fallback_enabled: bool,
    /// True when exhaustion was promoted to connected via fallback.
    degraded: bool,
    /// Cancels in-flight probe/recovery work; regenerated on reset.
    cancel: CancellationToken,
}

/// Drives reconnection after transport or health failures.
pub struct RecoveryController {
    config: RecoveryConfig,
    probe: Box<dyn HealthProbeDyn>,
    action: Box<dyn RecoverActionDyn>,
    in_flight: AtomicBool,
    inner: Mutex<ControllerInner>,
    status_tx: watch::Sender<RecoveryStatus>,
}

impl RecoveryController {
    pub fn new<P, A>(config: RecoveryConfig, probe: P, action: A) -> Arc<Self>
    where
        P: HealthProbe + 'static,
        A: RecoverAction + 'static,
    {
        let (status_tx, _) = watch::channel(RecoveryStatus::Idle);
        let fallback_enabled = config.fallback_enabled;
        Arc::new(Self {
            config,
            probe: Box::new(probe),
            action: Box::new(action),
            in_flight: AtomicBool::new(false),
            inner: Mutex::new(ControllerInner {
                retry_count: 0,
                last_error: None,
                history: VecDeque::new(),
                pending_retry: None,
                health_loop: None,
                fallback_enabled,
                degraded: false,
                cancel: CancellationToken::new(),
            }),
            status_tx,
        })
    }

    // --- Observation ---

    pub fn status(&self) -> RecoveryStatus {
        *self.status_tx.borrow()
    }

    /// Watch status transitions. The receiver sees the current value
    /// immediately and every change afterwards.
    pub fn subscribe(&self) -> watch::Receiver<RecoveryStatus> {
        self.status_tx.subscribe()
    }

    /// Diagnostic history of the most recent attempts (bounded).
    pub fn history(&self) -> Vec<RecoveryAttempt> {
        self.lock().history.iter().cloned().collect()
    }

    pub fn retry_count(&self) -> u32 {
        self.lock().retry_count
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    /// Whether the controller is connected only by virtue of fallback.
    pub fn is_degraded(&self) -> bool {
        self.lock().degraded
    }

    pub fn fallback_enabled(&self) -> bool {
        self.lock().fallback_enabled
    }

    // --- Control ---

    /// Run one probe-and-recover attempt.
    ///
    /// No-op if an attempt is already in flight. On failure, schedules
    /// the next attempt after `min(base * multiplier^n, max) + jitter`
    /// until the retry budget is spent; exhaustion degrades to
    /// connected when fallback is enabled, otherwise lands in `error`.
    pub async fn trigger_recovery(self: Arc<Self>) {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            tracing::debug!("recovery already in flight; ignoring trigger");
            return;
        }

        self.set_status(RecoveryStatus::Recovering);
        let cancel = self.lock().cancel.clone();
        let attempt_number = self.lock().retry_count + 1;
        let started = tokio::time::Instant::now();

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                self.in_flight.store(false, Ordering::SeqCst);
                return;
            }
            result = self.probe_and_recover() => result,
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(()) => {
                {
                    let mut inner = self.lock();
                    inner.retry_count = 0;
                    inner.last_error = None;
                    inner.degraded = false;
                    Self::record(
                        &mut inner,
                        RecoveryAttempt {
                            attempt: attempt_number,
                            timestamp: Utc::now(),
                            succeeded: Some(true),
                            duration_ms: Some(duration_ms),
                            error_text: None,
                        },
                    );
                }
                self.in_flight.store(false, Ordering::SeqCst);
                self.set_status(RecoveryStatus::Connected);
            }
            Err(err) => {
                tracing::warn!(attempt = attempt_number, error = %err, "recovery attempt failed");
                let (retry_count, fallback_enabled) = {
                    let mut inner = self.lock();
                    inner.retry_count += 1;
                    inner.last_error = Some(err.to_string());
                    Self::record(
                        &mut inner,
                        RecoveryAttempt {
                            attempt: attempt_number,
                            timestamp: Utc::now(),
                            succeeded: Some(false),
                            duration_ms: Some(duration_ms),
                            error_text: Some(err.to_string()),
                        },
                    );
                    (inner.retry_count, inner.fallback_enabled)
                };

                if retry_count < self.config.max_retries {
                    self.set_status(RecoveryStatus::Disconnected);
                    self.in_flight.store(false, Ordering::SeqCst);
                    self.schedule_retry(retry_count - 1);
                } else {
                    let exhausted = StreamError::Exhausted {
                        attempts: retry_count,
                    };
                    let mut inner = self.lock();
                    inner.last_error = Some(exhausted.to_string());
                    if fallback_enabled {
                        tracing::warn!(%exhausted, "degrading to fallback mode");
                        inner.degraded = true;
                        drop(inner);
                        self.in_flight.store(false, Ordering::SeqCst);
                        self.set_status(RecoveryStatus::Connected);
                    } else {
                        tracing::error!(%exhausted, "entering error state");
                        drop(inner);
                        self.in_flight.store(false, Ordering::SeqCst);
                        self.set_status(RecoveryStatus::Error);
                    }
                }
            }
        }
    }

    /// Cancel any scheduled retry, reset the counter and error, and
    /// start an immediate attempt.
    pub fn force_reconnect(self: &Arc<Self>) {
        {
            let mut inner = self.lock();
            inner.pending_retry = None;
            inner.retry_count = 0;
            inner.last_error = None;
        }
        self.set_status(RecoveryStatus::Connecting);
        let this = self.clone();
        tokio::spawn(async move {
            this.trigger_recovery().await;
        });
    }

    /// Treat future retry exhaustion as a soft-degraded connected
    /// state. Enabling while already in `error` promotes immediately,
    /// without another probe.
    pub fn enable_fallback(&self) {
        let promote = {
            let mut inner = self.lock();
            inner.fallback_enabled = true;
            self.status() == RecoveryStatus::Error
        };
        if promote {
            self.lock().degraded = true;
            self.set_status(RecoveryStatus::Connected);
        }
    }

    pub fn disable_fallback(&self) {
        self.lock().fallback_enabled = false;
    }

    /// Cancel timers and in-flight work, clear counter, error, and
    /// history, and return to `disconnected`.
    pub fn reset(&self) {
        {
            let mut inner = self.lock();
            inner.cancel.cancel();
            inner.cancel = CancellationToken::new();
            inner.pending_retry = None;
            inner.health_loop = None;
            inner.retry_count = 0;
            inner.last_error = None;
            inner.history.clear();
            inner.degraded = false;
        }
        self.set_status(RecoveryStatus::Disconnected);
    }

    /// Start the passive health loop: while connected, probe every
    /// `health_check_interval`; a failed probe (with no recovery
    /// already running) triggers recovery.
    pub fn start_health_loop(self: &Arc<Self>) {
        let interval = Duration::from_millis(self.config.health_check_interval_ms);
        let probe_timeout = Duration::from_millis(self.config.probe_timeout_ms);
        let weak = Arc::downgrade(self);

        let task = ScheduledTask::repeating(interval, move || {
            let weak: Weak<Self> = weak.clone();
            async move {
                let Some(this) = weak.upgrade() else { return };
                if this.status() != RecoveryStatus::Connected {
                    return;
                }
                if this.in_flight.load(Ordering::SeqCst) {
                    return;
                }
                let healthy = matches!(
                    tokio::time::timeout(probe_timeout, this.probe.check_boxed()).await,
                    Ok(Ok(()))
                );
                if !healthy && !this.in_flight.load(Ordering::SeqCst) {
                    tracing::warn!("health probe failed; starting recovery");
                    this.trigger_recovery().await;
                }
            }
        });
        self.lock().health_loop = Some(task);
    }

    // --- Internals ---

    async fn probe_and_recover(&self) -> Result<(), StreamError> {
        let probe_timeout = Duration::from_millis(self.config.probe_timeout_ms);
        match tokio::time::timeout(probe_timeout, self.probe.check_boxed()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(err),
            Err(_) => {
                return Err(StreamError::Timeout(format!(
                    "health probe exceeded {}ms",
                    self.config.probe_timeout_ms
                )));
            }
        }
        self.action.recover_boxed().await
    }

    fn schedule_retry(self: &Arc<Self>, exponent: u32) {
        let delay = backoff::delay_with_jitter(&self.config, exponent);
        tracing::info!(delay_ms = delay.as_millis() as u64, "scheduling recovery retry");
        let weak = Arc::downgrade(self);
        let task = ScheduledTask::once(delay, move || async move {
            if let Some(this) = weak.upgrade() {
                this.trigger_recovery().await;
            }
        });
        self.lock().pending_retry = Some(task);
    }

    fn record(inner: &mut ControllerInner, attempt: RecoveryAttempt) {
        if inner.history.len() >= RecoveryConfig::HISTORY_LIMIT {
            inner.history.pop_front();
        }
        inner.history.push_back(attempt);
    }

    fn set_status(&self, status: RecoveryStatus) {
        let previous = *self.status_tx.borrow();
        if previous != status {
            tracing::info!(from = %previous, to = %status, "recovery status change");
        }
        self.status_tx.send_replace(status);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ControllerInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
