// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Crypto Client
//!
//! Client-facing façade over the envelope protocol. Owns an ephemeral RSA
//! key pair for the session, fetches the remote party's public key over
//! HTTP, and orchestrates encrypt → transmit → decrypt.
//!
//! Transport and decode failures surface as `None` instead of propagating,
//! so callers have one uniform "no usable response" branch. Typed errors
//! are reserved for the encode path, where a failure is a caller bug.

use std::time::Duration;

use reqwest::Client;
use rsa::RsaPublicKey;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::crypto::envelope::{self, Envelope};
use crate::crypto::error::CryptoError;
use crate::crypto::keys::{fingerprint_pem, import_public, KeyManager, PublicKeyRecord};
use crate::messages::{parse_plaintext, EncryptedRequest, PlaintextMessage};

/// Default bound on every outbound request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client-side façade: ephemeral identity plus the remote key cache
pub struct CryptoClient {
    http: Client,
    keys: KeyManager,
    remote_key: RwLock<Option<RsaPublicKey>>,
}

impl CryptoClient {
    /// Create a client with the default 10-second request timeout
    pub fn new() -> Result<Self, CryptoError> {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a client with a custom request timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self, CryptoError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CryptoError::Encryption {
                reason: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            http,
            keys: KeyManager::generate()?,
            remote_key: RwLock::new(None),
        })
    }

    /// This session's shareable public key record
    pub fn export_public(&self, owner: &str) -> Result<PublicKeyRecord, CryptoError> {
        self.keys.export_public(owner)
    }

    /// Fetch the remote party's public key record
    ///
    /// Bounded by the client timeout. Returns `None` on timeout, connection
    /// failure, non-success status, or a malformed body, so callers can
    /// treat "no key available" uniformly.
    pub async fn fetch_public_key(&self, base_url: &str) -> Option<PublicKeyRecord> {
        let url = format!("{}/v1/public-key", base_url.trim_end_matches('/'));
        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(timed_out = e.is_timeout(), "public key fetch failed");
                return None;
            }
        };
        if !response.status().is_success() {
            warn!(status = %response.status(), "public key fetch rejected");
            return None;
        }
        match response.json::<PublicKeyRecord>().await {
            Ok(record) => Some(record),
            Err(_) => {
                warn!("public key response body malformed");
                None
            }
        }
    }

    /// Encrypt a request message against a previously fetched public key
    pub fn encrypt_request(
        &self,
        message: &PlaintextMessage,
        recipient: &RsaPublicKey,
    ) -> Result<Envelope, CryptoError> {
        let plaintext = serde_json::to_vec(message)?;
        envelope::encrypt(&plaintext, recipient)
    }

    /// Decrypt a response envelope into the structured schema
    ///
    /// Returns `None` when required envelope fields are missing or invalid,
    /// decryption fails, or the decrypted body does not parse as the
    /// expected schema. Never returns partially-decoded data.
    pub fn decrypt_response(&self, envelope: &Envelope) -> Option<PlaintextMessage> {
        let plaintext = match envelope::decrypt(envelope, self.keys.private_key()) {
            Ok(bytes) => bytes,
            Err(_) => {
                warn!(outcome = "decrypt_failed", "response envelope rejected");
                return None;
            }
        };
        match parse_plaintext(&plaintext) {
            Ok(message) => Some(message),
            Err(_) => {
                warn!(outcome = "schema_mismatch", "response body outside schema");
                None
            }
        }
    }

    /// Fetch-key (if uncached) → encrypt → transmit → decrypt
    ///
    /// On any stage failure returns `None` and leaves no partial state; the
    /// cached remote key is only replaced by a successfully imported one.
    pub async fn send_encrypted_message(
        &self,
        base_url: &str,
        message: &PlaintextMessage,
    ) -> Option<PlaintextMessage> {
        // 1. Resolve the remote public key, fetching on first use
        let recipient = match self.cached_remote_key().await {
            Some(key) => key,
            None => {
                let record = self.fetch_public_key(base_url).await?;
                let key = match import_public(&record) {
                    Ok(key) => key,
                    Err(e) => {
                        warn!(%e, "fetched public key record rejected");
                        return None;
                    }
                };
                debug!(
                    owner = %record.owner,
                    fingerprint = %fingerprint_pem(&record.public_key_pem),
                    "remote public key cached"
                );
                *self.remote_key.write().await = Some(key.clone());
                key
            }
        };

        // 2. Encrypt
        let envelope = match self.encrypt_request(message, &recipient) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(%e, "request encryption failed");
                return None;
            }
        };

        // 3. Transmit
        let sender_public_key = match self.keys.export_public("client") {
            Ok(record) => record.public_key_pem,
            Err(e) => {
                warn!(%e, "public key export failed");
                return None;
            }
        };
        let body = EncryptedRequest {
            envelope,
            sender_public_key,
        };
        let url = format!("{}/v1/encrypted", base_url.trim_end_matches('/'));
        let response = match self.http.post(&url).json(&body).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(timed_out = e.is_timeout(), "encrypted request failed");
                return None;
            }
        };
        if !response.status().is_success() {
            warn!(status = %response.status(), "encrypted request rejected");
            return None;
        }
        let reply: Envelope = match response.json().await {
            Ok(reply) => reply,
            Err(_) => {
                warn!("response envelope body malformed");
                return None;
            }
        };

        // 4. Decrypt
        debug!(ciphertext_len = reply.ciphertext.len(), "response envelope received");
        self.decrypt_response(&reply)
    }

    /// Drop the cached remote key, forcing a re-fetch on the next send
    ///
    /// Callers use this after a decrypt failure that suggests the remote
    /// party rotated its key pair.
    pub async fn forget_remote_key(&self) {
        *self.remote_key.write().await = None;
    }

    async fn cached_remote_key(&self) -> Option<RsaPublicKey> {
        self.remote_key.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::ChatMessage;

    #[tokio::test]
    async fn test_fetch_public_key_connection_refused() {
        let client = CryptoClient::with_timeout(Duration::from_millis(500)).unwrap();
        // Nothing listens here
        let result = client.fetch_public_key("http://127.0.0.1:1").await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_send_failure_leaves_no_cached_key() {
        let client = CryptoClient::with_timeout(Duration::from_millis(500)).unwrap();
        let message = PlaintextMessage::new(vec![ChatMessage::user("hi")]);

        let result = client
            .send_encrypted_message("http://127.0.0.1:1", &message)
            .await;
        assert!(result.is_none());
        assert!(client.cached_remote_key().await.is_none());
    }

    #[test]
    fn test_decrypt_response_rejects_foreign_envelope() {
        let client = CryptoClient::new().unwrap();
        let other = KeyManager::generate().unwrap();

        // Envelope sealed for a different key pair
        let envelope = envelope::encrypt(b"{\"version\":1,\"messages\":[]}", other.public_key())
            .unwrap();
        assert!(client.decrypt_response(&envelope).is_none());
    }

    #[test]
    fn test_decrypt_response_rejects_non_schema_body() {
        let client = CryptoClient::new().unwrap();
        let own_public = import_public(&client.export_public("client").unwrap()).unwrap();

        let envelope = envelope::encrypt(b"not the schema", &own_public).unwrap();
        assert!(client.decrypt_response(&envelope).is_none());
    }
}
