//! PrivacyGateway port and its object-safe wrapper.
//!
//! The gateway is the external collaborator that anonymizes and
//! de-anonymizes text, serves attestation material, and answers health
//! probes. Implementations live in veilchat-infra; the engine consumes
//! the trait only.
//!
//! `PrivacyGateway` uses native async fn in traits (RPITIT, Rust 2024
//! edition), so it cannot be a trait object directly. `BoxPrivacyGateway`
//! provides the type-erased form via an object-safe inner trait with
//! boxed futures and a blanket implementation.

use std::future::Future;
use std::pin::Pin;

use veilchat_types::api::{
    AnonymizeRequest, AnonymizeResponse, BatchChatRequest, BatchChatResponse,
    DeanonymizeRequest, DeanonymizeResponse, PublicKeyResponse, VerifySignatureResponse,
};
use veilchat_types::error::GatewayError;

/// Anonymization/attestation gateway operations.
///
/// All operations are cheap request/response calls; only `health` is
/// guaranteed side-effect free and safe to invoke on a timer.
pub trait PrivacyGateway: Send + Sync {
    /// Anonymize text. Omitting `session_id` establishes a new
    /// correlation session; the response always carries the id to use
    /// for the rest of the conversation.
    fn anonymize(
        &self,
        request: AnonymizeRequest,
    ) -> impl Future<Output = Result<AnonymizeResponse, GatewayError>> + Send;

    /// De-anonymize text within an existing correlation session.
    fn deanonymize(
        &self,
        request: DeanonymizeRequest,
    ) -> impl Future<Output = Result<DeanonymizeResponse, GatewayError>> + Send;

    /// Fetch the signing public key.
    fn public_key(
        &self,
        signing_method: Option<&str>,
    ) -> impl Future<Output = Result<PublicKeyResponse, GatewayError>> + Send;

    /// Verify a signature over `content`.
    fn verify_signature(
        &self,
        content: &str,
        signature: &str,
        public_key: &str,
        signing_method: &str,
    ) -> impl Future<Output = Result<VerifySignatureResponse, GatewayError>> + Send;

    /// Cheap liveness probe. Must be bounded by the caller's timeout
    /// and free of side effects.
    fn health(&self) -> impl Future<Output = Result<(), GatewayError>> + Send;

    /// Single synchronous exchange, used only in fallback mode.
    fn batch_chat(
        &self,
        request: BatchChatRequest,
    ) -> impl Future<Output = Result<BatchChatResponse, GatewayError>> + Send;
}

/// Object-safe version of [`PrivacyGateway`] with boxed futures.
pub trait PrivacyGatewayDyn: Send + Sync {
    fn anonymize_boxed(
        &self,
        request: AnonymizeRequest,
    ) -> Pin<Box<dyn Future<Output = Result<AnonymizeResponse, GatewayError>> + Send + '_>>;

    fn deanonymize_boxed(
        &self,
        request: DeanonymizeRequest,
    ) -> Pin<Box<dyn Future<Output = Result<DeanonymizeResponse, GatewayError>> + Send + '_>>;

    fn public_key_boxed<'a>(
        &'a self,
        signing_method: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<PublicKeyResponse, GatewayError>> + Send + 'a>>;

    fn verify_signature_boxed<'a>(
        &'a self,
        content: &'a str,
        signature: &'a str,
        public_key: &'a str,
        signing_method: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<VerifySignatureResponse, GatewayError>> + Send + 'a>>;

    fn health_boxed(&self)
        -> Pin<Box<dyn Future<Output = Result<(), GatewayError>> + Send + '_>>;

    fn batch_chat_boxed(
        &self,
        request: BatchChatRequest,
    ) -> Pin<Box<dyn Future<Output = Result<BatchChatResponse, GatewayError>> + Send + '_>>;
}

/// Blanket implementation: any `PrivacyGateway` is a `PrivacyGatewayDyn`.
impl<T: PrivacyGateway> PrivacyGatewayDyn for T {
    fn anonymize_boxed(
        &self,
        request: AnonymizeRequest,
    ) -> Pin<Box<dyn Future<Output = Result<AnonymizeResponse, GatewayError>> + Send + '_>> {
        Box::pin(self.anonymize(request))
    }

    fn deanonymize_boxed(
        &self,
        request: DeanonymizeRequest,
    ) -> Pin<Box<dyn Future<Output = Result<DeanonymizeResponse, GatewayError>> + Send + '_>> {
        Box::pin(self.deanonymize(request))
    }

    fn public_key_boxed<'a>(
        &'a self,
        signing_method: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<PublicKeyResponse, GatewayError>> + Send + 'a>> {
        Box::pin(self.public_key(signing_method))
    }

    fn verify_signature_boxed<'a>(
        &'a self,
        content: &'a str,
        signature: &'a str,
        public_key: &'a str,
        signing_method: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<VerifySignatureResponse, GatewayError>> + Send + 'a>>
    {
        Box::pin(self.verify_signature(content, signature, public_key, signing_method))
    }

    fn health_boxed(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<(), GatewayError>> + Send + '_>> {
        Box::pin(self.health())
    }

    fn batch_chat_boxed(
        &self,
        request: BatchChatRequest,
    ) -> Pin<Box<dyn Future<Output = Result<BatchChatResponse, GatewayError>> + Send + '_>> {
        Box::pin(self.batch_chat(request))
    }
}

/// Type-erased gateway for composition without generic spread.
pub struct BoxPrivacyGateway {
    inner: Box<dyn PrivacyGatewayDyn>,
}

impl BoxPrivacyGateway {
    pub fn new<T: PrivacyGateway + 'static>(gateway: T) -> Self {
        Self {
            inner: Box::new(gateway),
        }
    }

    pub async fn anonymize(
        &self,
        request: AnonymizeRequest,
    ) -> Result<AnonymizeResponse, GatewayError> {
        self.inner.anonymize_boxed(request).await
    }

    pub async fn deanonymize(
        &self,
        request: DeanonymizeRequest,
    ) -> Result<DeanonymizeResponse, GatewayError> {
        self.inner.deanonymize_boxed(request).await
    }

    pub async fn public_key(
        &self,
        signing_method: Option<&str>,
    ) -> Result<PublicKeyResponse, GatewayError> {
        self.inner.public_key_boxed(signing_method).await
    }

    pub async fn verify_signature(
        &self,
        content: &str,
        signature: &str,
        public_key: &str,
        signing_method: &str,
    ) -> Result<VerifySignatureResponse, GatewayError> {
        self.inner
            .verify_signature_boxed(content, signature, public_key, signing_method)
            .await
    }

    pub async fn health(&self) -> Result<(), GatewayError> {
        self.inner.health_boxed().await
    }

    pub async fn batch_chat(
        &self,
        request: BatchChatRequest,
    ) -> Result<BatchChatResponse, GatewayError> {
        self.inner.batch_chat_boxed(request).await
    }
}
