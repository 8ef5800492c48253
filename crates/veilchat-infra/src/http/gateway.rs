//! HttpPrivacyGateway -- reqwest-backed [`PrivacyGateway`] implementation.
//!
//! Talks to the anonymization gateway's REST endpoints:
//! `POST /anonymize`, `POST /deanonymize`, `GET /public-key`,
//! `GET /verify-signature`, `HEAD /health`, and `POST /chat` (fallback
//! batch). An HTTP 404 on a session-scoped call maps to
//! [`GatewayError::SessionExpired`] so callers can re-establish the
//! correlation session.
//!
//! Some deployments wrap responses in a `{"success": ..., "data": ...}`
//! envelope; [`unwrap_envelope`] accepts both wrapped and bare bodies.

use std::time::Duration;

use serde::de::DeserializeOwned;

use veilchat_core::gateway::PrivacyGateway;
use veilchat_types::api::{
    AnonymizeRequest, AnonymizeResponse, BatchChatRequest, BatchChatResponse,
    DeanonymizeRequest, DeanonymizeResponse, PublicKeyResponse, VerifySignatureResponse,
};
use veilchat_types::config::ClientConfig;
use veilchat_types::error::GatewayError;

/// Default timeout for ordinary gateway requests.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Privacy gateway over HTTP.
pub struct HttpPrivacyGateway {
    client: reqwest::Client,
    base_url: String,
    probe_timeout: Duration,
}

impl HttpPrivacyGateway {
    pub fn new(base_url: impl Into<String>, probe_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to create reqwest client");
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            probe_timeout,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            config.api_base_url.clone(),
            Duration::from_millis(config.recovery.probe_timeout_ms),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn execute<R: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<R, GatewayError> {
        let response = request
            .send()
            .await
            .map_err(|err| GatewayError::Request(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "gateway error response");
            return Err(GatewayError::from_status(status.as_u16(), body));
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|err| GatewayError::Deserialization(err.to_string()))?;
        unwrap_envelope(value)
    }
}

/// Accept either a bare response body or one wrapped in a
/// `{"success": .., "data": ..}` envelope.
fn unwrap_envelope<R: DeserializeOwned>(value: serde_json::Value) -> Result<R, GatewayError> {
    let payload = match &value {
        serde_json::Value::Object(map) if map.contains_key("data") => {
            map.get("data").cloned().unwrap_or(serde_json::Value::Null)
        }
        _ => value,
    };
    serde_json::from_value(payload).map_err(|err| GatewayError::Deserialization(err.to_string()))
}

impl PrivacyGateway for HttpPrivacyGateway {
    async fn anonymize(
        &self,
        request: AnonymizeRequest,
    ) -> Result<AnonymizeResponse, GatewayError> {
        tracing::debug!(
            text_len = request.text.len(),
            has_session = request.session_id.is_some(),
            "anonymize"
        );
        self.execute(self.client.post(self.url("/anonymize")).json(&request))
            .await
    }

    async fn deanonymize(
        &self,
        request: DeanonymizeRequest,
    ) -> Result<DeanonymizeResponse, GatewayError> {
        tracing::debug!(text_len = request.text.len(), "deanonymize");
        self.execute(self.client.post(self.url("/deanonymize")).json(&request))
            .await
    }

    async fn public_key(
        &self,
        signing_method: Option<&str>,
    ) -> Result<PublicKeyResponse, GatewayError> {
        let mut request = self.client.get(self.url("/public-key"));
        if let Some(method) = signing_method {
            request = request.query(&[("signing_method", method)]);
        }
        self.execute(request).await
    }

    async fn verify_signature(
        &self,
        content: &str,
        signature: &str,
        public_key: &str,
        signing_method: &str,
    ) -> Result<VerifySignatureResponse, GatewayError> {
        let request = self.client.get(self.url("/verify-signature")).query(&[
            ("content", content),
            ("signature", signature),
            ("public_key", public_key),
            ("signing_method", signing_method),
        ]);
        self.execute(request).await
    }

    async fn health(&self) -> Result<(), GatewayError> {
        let request = self.client.head(self.url("/health"));
        let outcome = tokio::time::timeout(self.probe_timeout, request.send()).await;
        match outcome {
            Ok(Ok(response)) if response.status().is_success() => Ok(()),
            Ok(Ok(response)) => Err(GatewayError::Unhealthy(format!(
                "health probe returned HTTP {}",
                response.status()
            ))),
            Ok(Err(err)) => Err(GatewayError::Unhealthy(err.to_string())),
            Err(_) => Err(GatewayError::Unhealthy(format!(
                "health probe exceeded {}ms",
                self.probe_timeout.as_millis()
            ))),
        }
    }

    async fn batch_chat(
        &self,
        request: BatchChatRequest,
    ) -> Result<BatchChatResponse, GatewayError> {
        self.execute(self.client.post(self.url("/chat")).json(&request))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unwrap_envelope_bare_body() {
        let value = json!({"session_id": "s-1", "text": "<PERSON>"});
        let response: AnonymizeResponse = unwrap_envelope(value).unwrap();
        assert_eq!(response.session_id, "s-1");
    }

    #[test]
    fn test_unwrap_envelope_wrapped_body() {
        let value = json!({
            "success": true,
            "data": {"public_key": "0xkey", "signing_method": "ecdsa"}
        });
        let response: PublicKeyResponse = unwrap_envelope(value).unwrap();
        assert_eq!(response.public_key, "0xkey");
        assert_eq!(response.signing_method.as_deref(), Some("ecdsa"));
    }

    #[test]
    fn test_unwrap_envelope_shape_mismatch() {
        let value = json!({"unrelated": 1});
        let result: Result<PublicKeyResponse, _> = unwrap_envelope(value);
        assert!(matches!(result, Err(GatewayError::Deserialization(_))));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let gateway =
            HttpPrivacyGateway::new("http://localhost:8000/", Duration::from_secs(5));
        assert_eq!(gateway.url("/anonymize"), "http://localhost:8000/anonymize");
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_request_error() {
        // Bind-then-drop yields a port with nothing listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let gateway =
            HttpPrivacyGateway::new(format!("http://{addr}"), Duration::from_secs(2));
        let result = gateway
            .anonymize(AnonymizeRequest {
                text: "hi".to_string(),
                session_id: None,
                language: None,
            })
            .await;
        assert!(matches!(result, Err(GatewayError::Request(_))));
    }

    #[tokio::test]
    async fn test_health_probe_failure_is_unhealthy() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let gateway =
            HttpPrivacyGateway::new(format!("http://{addr}"), Duration::from_secs(2));
        assert!(matches!(
            gateway.health().await,
            Err(GatewayError::Unhealthy(_))
        ));
    }
}
