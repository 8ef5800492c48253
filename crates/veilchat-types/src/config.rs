//! Client configuration for Veilchat.
//!
//! Deserialized from `config.toml`; every field has a default so a
//! missing or partial file still yields a usable configuration.

use serde::{Deserialize, Serialize};

use crate::recovery::RecoveryConfig;

/// Top-level client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the privacy gateway.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Path of the server-push stream endpoint, relative to the base URL.
    #[serde(default = "default_stream_path")]
    pub stream_path: String,
    /// Path of the companion client->server send endpoint.
    #[serde(default = "default_send_path")]
    pub send_path: String,
    /// Anonymization language.
    #[serde(default = "default_language")]
    pub language: String,
    /// Retry/backoff and health probe tuning.
    #[serde(default)]
    pub recovery: RecoveryConfig,
}

fn default_api_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_stream_path() -> String {
    "/stream".to_string()
}

fn default_send_path() -> String {
    "/stream/send".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            stream_path: default_stream_path(),
            send_path: default_send_path(),
            language: default_language(),
            recovery: RecoveryConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Absolute URL of the push stream endpoint.
    pub fn stream_url(&self) -> String {
        format!("{}{}", self.api_base_url.trim_end_matches('/'), self.stream_path)
    }

    /// Absolute URL of the companion send endpoint.
    pub fn send_url(&self) -> String {
        format!("{}{}", self.api_base_url.trim_end_matches('/'), self.send_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.api_base_url, "http://localhost:8000");
        assert_eq!(config.language, "en");
        assert_eq!(config.recovery.max_retries, 3);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: ClientConfig = toml::from_str(
            r#"
api_base_url = "https://gateway.example.com/"
language = "de"

[recovery]
max_retries = 5
fallback_enabled = true
"#,
        )
        .unwrap();
        assert_eq!(config.api_base_url, "https://gateway.example.com/");
        assert_eq!(config.language, "de");
        assert_eq!(config.recovery.max_retries, 5);
        assert!(config.recovery.fallback_enabled);
        // Untouched fields keep their defaults.
        assert_eq!(config.recovery.base_delay_ms, 1000);
        assert_eq!(config.stream_path, "/stream");
    }

    #[test]
    fn test_stream_url_strips_trailing_slash() {
        let config: ClientConfig =
            toml::from_str(r#"api_base_url = "http://host:9000/""#).unwrap();
        assert_eq!(config.stream_url(), "http://host:9000/stream");
        assert_eq!(config.send_url(), "http://host:9000/stream/send");
    }
}
