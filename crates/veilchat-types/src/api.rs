//! Request/response DTOs for the privacy gateway endpoints.
//!
//! Wire shapes match the gateway service: `POST /anonymize`,
//! `POST /deanonymize`, `GET /public-key`, `GET /verify-signature`, and
//! the fallback batch endpoint `POST /chat`.

use serde::{Deserialize, Serialize};

/// `POST /anonymize` request body.
///
/// The first call of a conversation omits `session_id`; the response
/// establishes the correlation id carried by every later call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnonymizeRequest {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// `POST /anonymize` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnonymizeResponse {
    pub session_id: String,
    pub text: String,
    #[serde(default)]
    pub quote: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub signing_method: Option<String>,
}

/// `POST /deanonymize` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeanonymizeRequest {
    pub text: String,
    pub session_id: String,
}

/// `POST /deanonymize` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeanonymizeResponse {
    pub text: String,
    #[serde(default)]
    pub quote: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub signing_method: Option<String>,
}

/// `GET /public-key` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicKeyResponse {
    pub public_key: String,
    #[serde(default)]
    pub signing_method: Option<String>,
}

/// `GET /verify-signature` response body.
///
/// `is_valid` is a string on the wire in some deployments
/// ("true"/"false"/diagnostic text), hence the lenient accessor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifySignatureResponse {
    pub is_valid: serde_json::Value,
    #[serde(default)]
    pub message: Option<String>,
}

impl VerifySignatureResponse {
    /// Interpret the verdict, accepting both boolean and string forms.
    pub fn verdict(&self) -> Option<bool> {
        match &self.is_valid {
            serde_json::Value::Bool(b) => Some(*b),
            serde_json::Value::String(s) => match s.to_lowercase().as_str() {
                "true" | "valid" => Some(true),
                "false" | "invalid" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

/// `POST /chat` request body, used only in fallback mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchChatRequest {
    pub message: String,
    pub session_id: String,
}

/// `POST /chat` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchChatResponse {
    pub response: String,
    pub session_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymize_request_first_call_omits_session() {
        let req = AnonymizeRequest {
            text: "My name is Alice".to_string(),
            session_id: None,
            language: Some("en".to_string()),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("session_id"));
        assert!(json.contains("\"language\":\"en\""));
    }

    #[test]
    fn test_anonymize_response_without_attestation() {
        let json = r#"{"session_id":"s-1","text":"My name is <PERSON>"}"#;
        let resp: AnonymizeResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.session_id, "s-1");
        assert!(resp.quote.is_none());
        assert!(resp.signature.is_none());
    }

    #[test]
    fn test_verify_verdict_boolean() {
        let resp: VerifySignatureResponse =
            serde_json::from_str(r#"{"is_valid":true}"#).unwrap();
        assert_eq!(resp.verdict(), Some(true));
    }

    #[test]
    fn test_verify_verdict_string_forms() {
        let resp: VerifySignatureResponse =
            serde_json::from_str(r#"{"is_valid":"false"}"#).unwrap();
        assert_eq!(resp.verdict(), Some(false));

        let resp: VerifySignatureResponse =
            serde_json::from_str(r#"{"is_valid":"verification_not_implemented"}"#).unwrap();
        assert_eq!(resp.verdict(), None);
    }

    #[test]
    fn test_batch_chat_roundtrip() {
        let resp = BatchChatResponse {
            response: "Hello there".to_string(),
            session_id: "s-9".to_string(),
        };
        let json = serde_json::to_string(&resp).unwrap();
        let parsed: BatchChatResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.response, "Hello there");
        assert_eq!(parsed.session_id, "s-9");
    }
}
