//! Client configuration loader.
//!
//! Reads `config.toml` from the given path and deserializes it into
//! [`ClientConfig`]. Falls back to defaults when the file is missing or
//! malformed -- a broken config file should degrade the experience, not
//! prevent startup.

use std::path::Path;

use veilchat_types::config::ClientConfig;

/// Load client configuration from a TOML file.
///
/// - Missing file: returns [`ClientConfig::default()`] quietly.
/// - Unreadable or unparsable file: logs a warning and returns the
///   default.
pub async fn load_client_config(path: &Path) -> ClientConfig {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("no config file at {}, using defaults", path.display());
            return ClientConfig::default();
        }
        Err(err) => {
            tracing::warn!("failed to read {}: {err}, using defaults", path.display());
            return ClientConfig::default();
        }
    };

    match toml::from_str::<ClientConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("failed to parse {}: {err}, using defaults", path.display());
            ClientConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_client_config(&tmp.path().join("config.toml")).await;
        assert_eq!(config.api_base_url, "http://localhost:8000");
        assert_eq!(config.recovery.max_retries, 3);
    }

    #[tokio::test]
    async fn test_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        tokio::fs::write(
            &path,
            r#"
api_base_url = "https://gateway.example.com"
language = "nl"

[recovery]
max_retries = 7
"#,
        )
        .await
        .unwrap();

        let config = load_client_config(&path).await;
        assert_eq!(config.api_base_url, "https://gateway.example.com");
        assert_eq!(config.language, "nl");
        assert_eq!(config.recovery.max_retries, 7);
        assert_eq!(config.recovery.base_delay_ms, 1000);
    }

    #[tokio::test]
    async fn test_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        tokio::fs::write(&path, "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_client_config(&path).await;
        assert_eq!(config.api_base_url, "http://localhost:8000");
    }
}
