//! Payload decryption collaborator

use std::fmt::Debug;

use serde_json::Value;

/// Decryption error
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Payload had an unexpected shape
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
    /// Decryption failed
    #[error("Decryption failed: {0}")]
    Decrypt(String),
}

/// Decrypts message payloads
///
/// Only consulted when a cipher key is configured, and never for presence
/// channels.
pub trait Cryptor: Send + Sync + Debug {
    /// Decrypt a single message payload
    fn decrypt(&self, cipher_key: &str, payload: &Value) -> Result<Value, CryptoError>;
}
