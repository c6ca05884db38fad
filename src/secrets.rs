//! Config Decryption
//!
//! The configuration blob is encrypted at rest. Production runs decrypt it
//! with AWS KMS using the ambient credential chain:
//! - Local: named profile or environment credentials
//! - Lambda: execution role
//!
//! No key material is configured here; KMS ciphertext blobs carry their key id.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_kms::primitives::Blob;
use base64::Engine;
use tracing::{debug, info};

/// Turns the fetched ciphertext into plaintext JSON bytes
#[async_trait]
pub trait ConfigDecryptor: Send + Sync {
    /// Short name for logging
    fn name(&self) -> &'static str;

    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;
}

/// Pass-through for unencrypted local files
pub struct PlaintextDecryptor;

#[async_trait]
impl ConfigDecryptor for PlaintextDecryptor {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        Ok(ciphertext.to_vec())
    }
}

/// AWS KMS envelope decryption
pub struct KmsDecryptor {
    client: aws_sdk_kms::Client,
}

impl KmsDecryptor {
    pub fn new(client: aws_sdk_kms::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ConfigDecryptor for KmsDecryptor {
    fn name(&self) -> &'static str {
        "kms"
    }

    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let blob = unarmor(ciphertext);
        debug!(bytes = blob.len(), "Calling KMS Decrypt");

        let response = self
            .client
            .decrypt()
            .ciphertext_blob(Blob::new(blob))
            .send()
            .await
            .context("KMS Decrypt call failed")?;

        let plaintext = response
            .plaintext()
            .context("KMS returned no plaintext")?
            .as_ref()
            .to_vec();

        info!("Config decrypted successfully (length: {} bytes)", plaintext.len());
        Ok(plaintext)
    }
}

/// Accept both raw KMS blobs and base64-armoured text files
fn unarmor(ciphertext: &[u8]) -> Vec<u8> {
    let trimmed = ciphertext.trim_ascii();
    match base64::engine::general_purpose::STANDARD.decode(trimmed) {
        Ok(decoded) => decoded,
        Err(_) => ciphertext.to_vec(),
    }
}
