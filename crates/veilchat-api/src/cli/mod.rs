//! CLI argument definitions and command dispatch helpers.

pub mod attest;
pub mod chat;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// PII-anonymizing chat client with attested exchanges.
#[derive(Parser)]
#[command(name = "veil", version, about)]
pub struct Cli {
    /// Path to config.toml (defaults to the platform config directory).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v: info, -vv: debug).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans via OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive chat session.
    Chat {
        /// Anonymization language override (e.g. "en", "de").
        #[arg(long)]
        language: Option<String>,

        /// Start in fallback (batch) mode instead of streaming.
        #[arg(long)]
        fallback: bool,
    },

    /// Fetch the gateway's signing public key.
    Key {
        /// Preferred signing method (e.g. "ecdsa").
        #[arg(long)]
        signing_method: Option<String>,
    },

    /// Verify a signature over message content.
    Verify {
        content: String,
        signature: String,
        public_key: String,
        signing_method: String,
    },
}

/// `~/.config/veilchat/config.toml` (platform equivalent).
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("veilchat")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_default_config_path_ends_with_config_toml() {
        let path = default_config_path();
        assert!(path.ends_with("veilchat/config.toml"));
    }
}
