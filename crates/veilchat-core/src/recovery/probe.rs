//! Health probe and recovery action ports, with boxed forms and the
//! standard adapters the orchestrator wires in.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use veilchat_types::error::{GatewayError, StreamError};
use veilchat_types::transport::TransportState;

use crate::gateway::BoxPrivacyGateway;
use crate::transport::PushTransport;

/// A cheap, side-effect-free liveness check.
///
/// The recovery controller bounds every probe with its configured
/// timeout; implementations need not enforce one themselves.
pub trait HealthProbe: Send + Sync {
    fn check(&self) -> impl Future<Output = Result<(), StreamError>> + Send;
}

/// The procedure that re-establishes service after a failure.
pub trait RecoverAction: Send + Sync {
    fn recover(&self) -> impl Future<Output = Result<(), StreamError>> + Send;
}

/// Object-safe forms with boxed futures, for storage inside the
/// controller without generic spread.
pub trait HealthProbeDyn: Send + Sync {
    fn check_boxed(&self) -> Pin<Box<dyn Future<Output = Result<(), StreamError>> + Send + '_>>;
}

impl<T: HealthProbe> HealthProbeDyn for T {
    fn check_boxed(&self) -> Pin<Box<dyn Future<Output = Result<(), StreamError>> + Send + '_>> {
        Box::pin(self.check())
    }
}

pub trait RecoverActionDyn: Send + Sync {
    fn recover_boxed(&self) -> Pin<Box<dyn Future<Output = Result<(), StreamError>> + Send + '_>>;
}

impl<T: RecoverAction> RecoverActionDyn for T {
    fn recover_boxed(&self) -> Pin<Box<dyn Future<Output = Result<(), StreamError>> + Send + '_>> {
        Box::pin(self.recover())
    }
}

/// Probe backed by the privacy gateway's health endpoint.
pub struct GatewayProbe {
    gateway: Arc<BoxPrivacyGateway>,
}

impl GatewayProbe {
    pub fn new(gateway: Arc<BoxPrivacyGateway>) -> Self {
        Self { gateway }
    }
}

impl HealthProbe for GatewayProbe {
    async fn check(&self) -> Result<(), StreamError> {
        self.gateway.health().await.map_err(|err| match err {
            GatewayError::Unhealthy(msg) => StreamError::Timeout(msg),
            other => StreamError::Transport(other.to_string()),
        })
    }
}

/// Recovery action that cycles the push transport and waits for it to
/// come up.
///
/// `connect()` is fire-and-forget, so success is observed through the
/// open/error notifications, bounded by `settle_timeout`.
pub struct TransportRecovery {
    transport: Arc<dyn PushTransport>,
    settle_timeout: Duration,
}

impl TransportRecovery {
    pub fn new(transport: Arc<dyn PushTransport>, settle_timeout: Duration) -> Self {
        Self {
            transport,
            settle_timeout,
        }
    }
}

impl RecoverAction for TransportRecovery {
    async fn recover(&self) -> Result<(), StreamError> {
        let (tx, mut rx) = tokio::sync::mpsc::channel::<Result<(), StreamError>>(2);

        let opened = tx.clone();
        let open_sub = self.transport.on_open(Box::new(move || {
            let _ = opened.try_send(Ok(()));
        }));
        let errored = tx;
        let error_sub = self.transport.on_error(Box::new(move |err| {
            // Parse errors do not affect connection establishment.
            if !matches!(err, StreamError::Parse(_)) {
                let _ = errored.try_send(Err(err.clone()));
            }
        }));

        self.transport.disconnect();
        self.transport.connect();

        let outcome = match tokio::time::timeout(self.settle_timeout, rx.recv()).await {
            Ok(Some(result)) => result,
            Ok(None) => Err(StreamError::Closed),
            Err(_) => {
                // A transport already open before the notification race
                // settled still counts as recovered.
                if self.transport.state() == TransportState::Open {
                    Ok(())
                } else {
                    Err(StreamError::Timeout(
                        "transport did not reopen in time".to_string(),
                    ))
                }
            }
        };

        open_sub.dispose();
        error_sub.dispose();
        outcome
    }
}
