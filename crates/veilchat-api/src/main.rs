//! Veilchat CLI entry point.
//!
//! Binary name: `veil`
//!
//! Parses CLI arguments, initializes tracing and configuration, then
//! dispatches to the chat loop or one of the attestation commands.

mod cli;

use clap::Parser;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    if let Err(err) = veilchat_observe::tracing_setup::init(cli.otel, default_filter) {
        eprintln!("warning: could not install tracing subscriber: {err}");
    }

    let config_path = cli.config.clone().unwrap_or_else(cli::default_config_path);
    let mut config = veilchat_infra::config::load_client_config(&config_path).await;

    let result = match cli.command {
        Commands::Chat { language, fallback } => {
            if let Some(language) = language {
                config.language = language;
            }
            cli::chat::run_chat(config, fallback).await
        }
        Commands::Key { signing_method } => {
            cli::attest::fetch_public_key(&config, signing_method.as_deref()).await
        }
        Commands::Verify {
            content,
            signature,
            public_key,
            signing_method,
        } => {
            cli::attest::verify(&config, &content, &signature, &public_key, &signing_method)
                .await
        }
    };

    veilchat_observe::tracing_setup::shutdown();
    result
}
