//! Interactive chat loop.
//!
//! Assembles the full engine (gateway, transport, store, recovery,
//! orchestrator), then runs a readline loop. A background task renders
//! session events -- streamed deltas, completions, connection changes --
//! through the shared writer so output never fights the prompt.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use console::style;
use rustyline_async::{Readline, ReadlineEvent, SharedWriter};
use tokio::sync::broadcast;

use veilchat_core::gateway::BoxPrivacyGateway;
use veilchat_core::recovery::{GatewayProbe, RecoveryController, TransportRecovery};
use veilchat_core::session::{ChatOrchestrator, SessionEvent, SessionStore};
use veilchat_core::transport::PushTransport;
use veilchat_infra::http::HttpPrivacyGateway;
use veilchat_infra::sse::SseTransport;
use veilchat_types::chat::MessageRole;
use veilchat_types::config::ClientConfig;

/// How long the recovery procedure waits for the transport to settle.
const RECONNECT_SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn run_chat(config: ClientConfig, start_fallback: bool) -> anyhow::Result<()> {
    let gateway = Arc::new(BoxPrivacyGateway::new(HttpPrivacyGateway::from_config(
        &config,
    )));
    let transport: Arc<dyn PushTransport> = Arc::new(SseTransport::from_config(&config));
    let store = Arc::new(SessionStore::new());

    let recovery = RecoveryController::new(
        config.recovery.clone(),
        GatewayProbe::new(gateway.clone()),
        TransportRecovery::new(transport.clone(), RECONNECT_SETTLE_TIMEOUT),
    );
    recovery.start_health_loop();

    let orchestrator = ChatOrchestrator::new(
        transport,
        gateway,
        store.clone(),
        recovery.clone(),
        config.language.clone(),
    );
    orchestrator.start();
    if start_fallback {
        orchestrator.switch_to_fallback();
    }

    let (mut readline, writer) = Readline::new("you> ".to_string())?;
    let mut banner = writer.clone();
    let _ = writeln!(
        banner,
        "{}",
        style("veilchat -- text is anonymized before it reaches the model").dim()
    );
    let _ = writeln!(
        banner,
        "{}",
        style("commands: /fallback /stream /reconnect /reset /status /verify /quit").dim()
    );

    let render_task = spawn_renderer(store.subscribe(), writer.clone());

    loop {
        match readline.readline().await {
            Ok(ReadlineEvent::Line(line)) => {
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                readline.add_history_entry(line.clone());

                if let Some(command) = line.strip_prefix('/') {
                    if handle_command(command, &orchestrator, &recovery, writer.clone()) {
                        break;
                    }
                    continue;
                }

                if let Err(err) = orchestrator.send_turn(&line).await {
                    let mut out = writer.clone();
                    let _ = writeln!(out, "{}", style(format!("error: {err}")).red());
                }
            }
            Ok(ReadlineEvent::Eof) | Ok(ReadlineEvent::Interrupted) => break,
            Err(err) => {
                tracing::error!(error = %err, "readline failed");
                break;
            }
        }
    }

    render_task.abort();
    orchestrator.shutdown();
    Ok(())
}

/// Handle a slash command. Returns true when the loop should exit.
fn handle_command(
    command: &str,
    orchestrator: &Arc<ChatOrchestrator>,
    recovery: &Arc<RecoveryController>,
    mut out: SharedWriter,
) -> bool {
    match command {
        "quit" | "exit" => return true,
        "fallback" => orchestrator.switch_to_fallback(),
        "stream" => orchestrator.resume_streaming(),
        "reconnect" => recovery.force_reconnect(),
        "reset" => {
            orchestrator.reset();
            let _ = writeln!(out, "{}", style("conversation reset").dim());
        }
        "status" => {
            let _ = writeln!(out, "recovery status: {}", recovery.status());
            let _ = writeln!(out, "retry count:     {}", recovery.retry_count());
            if let Some(error) = recovery.last_error() {
                let _ = writeln!(out, "last error:      {error}");
            }
            for attempt in recovery.history() {
                let outcome = match attempt.succeeded {
                    Some(true) => "ok",
                    Some(false) => "failed",
                    None => "in flight",
                };
                let _ = writeln!(
                    out,
                    "  attempt {} at {}: {} ({}ms)",
                    attempt.attempt,
                    attempt.timestamp.format("%H:%M:%S"),
                    outcome,
                    attempt.duration_ms.unwrap_or(0)
                );
            }
        }
        "verify" => {
            let log = orchestrator.verification_log();
            if log.is_empty() {
                let _ = writeln!(out, "{}", style("no attested exchanges yet").dim());
            }
            for (index, entry) in log.iter().enumerate() {
                let badge = if entry.is_verifiable() {
                    style("attested").green()
                } else {
                    style("unattested").red()
                };
                let preview: String = entry.content.chars().take(48).collect();
                let _ = writeln!(out, "{:>3}. [{badge}] {preview}", index + 1);
                if let Some(method) = &entry.signing_method {
                    let _ = writeln!(out, "     method: {method}");
                }
            }
        }
        other => {
            let _ = writeln!(out, "{}", style(format!("unknown command: /{other}")).red());
        }
    }
    false
}

fn spawn_renderer(
    mut events: broadcast::Receiver<SessionEvent>,
    writer: SharedWriter,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => render_event(&event, writer.clone()),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "renderer lagged behind session events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn render_event(event: &SessionEvent, mut out: SharedWriter) {
    match event {
        SessionEvent::StreamStarted { .. } => {
            let _ = write!(out, "{} ", style("assistant>").cyan().bold());
        }
        SessionEvent::ContentAppended { delta, .. } => {
            let _ = write!(out, "{delta}");
        }
        SessionEvent::MessageCompleted { .. } => {
            let _ = writeln!(out);
        }
        // Fallback-delivered messages arrive complete, without deltas.
        SessionEvent::MessageAdded(message) if message.role == MessageRole::Assistant => {
            let _ = writeln!(
                out,
                "{} {}",
                style("assistant>").cyan().bold(),
                message.content
            );
        }
        SessionEvent::MessageErrored { text, .. } => {
            let _ = writeln!(out, "{}", style(format!("[message failed: {text}]")).red());
        }
        SessionEvent::SessionErrored { text } => {
            let _ = writeln!(out, "{}", style(format!("! {text}")).yellow());
        }
        SessionEvent::ConnectionChanged { state } => {
            let _ = writeln!(out, "{}", style(format!("[connection: {state}]")).dim());
        }
        SessionEvent::FallbackChanged { active } => {
            let note = if *active {
                "fallback mode: responses arrive in one piece, not streamed"
            } else {
                "streaming mode restored"
            };
            let _ = writeln!(out, "{}", style(format!("[{note}]")).dim());
        }
        _ => {}
    }
}
