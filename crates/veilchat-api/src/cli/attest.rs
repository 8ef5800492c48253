//! Attestation commands: fetch the signing key, verify a signature.

use anyhow::Context;
use console::style;

use veilchat_core::gateway::PrivacyGateway;
use veilchat_infra::http::HttpPrivacyGateway;
use veilchat_types::config::ClientConfig;

pub async fn fetch_public_key(
    config: &ClientConfig,
    signing_method: Option<&str>,
) -> anyhow::Result<()> {
    let gateway = HttpPrivacyGateway::from_config(config);
    let key = gateway
        .public_key(signing_method)
        .await
        .context("fetching public key from gateway")?;

    println!("public key:     {}", key.public_key);
    if let Some(method) = key.signing_method {
        println!("signing method: {method}");
    }
    Ok(())
}

pub async fn verify(
    config: &ClientConfig,
    content: &str,
    signature: &str,
    public_key: &str,
    signing_method: &str,
) -> anyhow::Result<()> {
    let gateway = HttpPrivacyGateway::from_config(config);
    let response = gateway
        .verify_signature(content, signature, public_key, signing_method)
        .await
        .context("verifying signature with gateway")?;

    match response.verdict() {
        Some(true) => {
            println!("{}", style("signature valid").green().bold());
            Ok(())
        }
        Some(false) => {
            println!("{}", style("signature INVALID").red().bold());
            anyhow::bail!("signature verification failed");
        }
        None => {
            println!(
                "{} ({})",
                style("verification inconclusive").yellow(),
                response.is_valid
            );
            Ok(())
        }
    }
}
