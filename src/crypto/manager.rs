// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Server-Side Crypto Manager
//!
//! Mirrors the client façade for the server identity: decrypts inbound
//! envelopes, validates message shape, and re-encrypts outbound messages
//! against the caller's public key.
//!
//! The decode path is deliberately lenient (malformed network input flattens
//! to [`DecryptedPayload::Absent`] so the transport layer has one uniform
//! failure branch); the encode path is deliberately strict (an absent payload
//! is a typed error, catching caller bugs at the call site).

use rsa::RsaPublicKey;

use super::envelope::{self, Envelope};
use super::error::CryptoError;
use super::keys::{KeyManager, PublicKeyRecord};
use crate::messages::{parse_plaintext, PlaintextMessage};

/// Result of decrypting an inbound envelope
#[derive(Debug, Clone, PartialEq)]
pub enum DecryptedPayload {
    /// Decrypted bytes parsed as the expected structured schema
    Structured(PlaintextMessage),
    /// Decrypted fine but not the expected schema; forward-compatible fallback
    Raw(Vec<u8>),
    /// Decryption or envelope shape failure; respond with the generic error
    Absent,
}

/// Outbound payload shapes the manager can encrypt
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundPayload {
    Structured(PlaintextMessage),
    Text(String),
    Raw(Vec<u8>),
}

/// The server identity's encrypt/decrypt façade
pub struct CryptoManager {
    keys: KeyManager,
}

impl CryptoManager {
    /// Create a manager with a freshly generated server key pair
    pub fn new() -> Result<Self, CryptoError> {
        Ok(Self {
            keys: KeyManager::generate()?,
        })
    }

    /// Create a manager around an existing key pair
    pub fn from_keys(keys: KeyManager) -> Self {
        Self { keys }
    }

    /// The shareable record for this server identity
    pub fn public_record(&self, owner: &str) -> Result<PublicKeyRecord, CryptoError> {
        self.keys.export_public(owner)
    }

    /// Short hex fingerprint of the server public key, safe for logs
    pub fn fingerprint(&self) -> String {
        self.keys.fingerprint()
    }

    /// Replace the server key pair wholesale
    ///
    /// Envelopes encrypted under the old key decrypt to `Absent` afterwards.
    pub fn rotate(&mut self) -> Result<(), CryptoError> {
        self.keys.rotate()
    }

    /// Decrypt an inbound envelope into a tagged payload
    ///
    /// Never panics and never returns partially-trusted data:
    /// - schema-valid bytes → [`DecryptedPayload::Structured`]
    /// - authenticated but non-schema bytes → [`DecryptedPayload::Raw`]
    /// - any decryption failure → [`DecryptedPayload::Absent`]
    ///
    /// Only sizes and outcome codes are logged, never content.
    pub fn decrypt_message(&self, envelope: &Envelope) -> DecryptedPayload {
        let plaintext = match envelope::decrypt(envelope, self.keys.private_key()) {
            Ok(bytes) => bytes,
            Err(_) => {
                tracing::warn!(
                    ciphertext_len = envelope.ciphertext.len(),
                    outcome = "decrypt_failed",
                    "inbound envelope rejected"
                );
                return DecryptedPayload::Absent;
            }
        };

        match parse_plaintext(&plaintext) {
            Ok(message) => {
                tracing::debug!(
                    turns = message.messages.len(),
                    outcome = "structured",
                    "inbound envelope decoded"
                );
                DecryptedPayload::Structured(message)
            }
            Err(_) => {
                tracing::debug!(
                    plaintext_len = plaintext.len(),
                    outcome = "raw_fallback",
                    "inbound envelope decoded outside schema"
                );
                DecryptedPayload::Raw(plaintext)
            }
        }
    }

    /// Encrypt an outbound payload against the recipient's public key
    ///
    /// # Errors
    ///
    /// - `CryptoError::MissingPayload` when `payload` is `None`. Absence is
    ///   a caller bug and must stay distinguishable from an intentionally
    ///   empty message, which encrypts normally.
    /// - `CryptoError::Schema` when a structured payload fails to serialize.
    /// - `CryptoError::Encryption` for codec-level input errors (including
    ///   empty byte/text payloads, which carry zero plaintext bytes).
    pub fn encrypt_message(
        &self,
        payload: Option<&OutboundPayload>,
        recipient: &RsaPublicKey,
    ) -> Result<Envelope, CryptoError> {
        let payload = payload.ok_or(CryptoError::MissingPayload)?;

        let plaintext: Vec<u8> = match payload {
            OutboundPayload::Structured(message) => serde_json::to_vec(message)?,
            OutboundPayload::Text(text) => text.as_bytes().to_vec(),
            OutboundPayload::Raw(bytes) => bytes.clone(),
        };

        envelope::encrypt(&plaintext, recipient)
    }
}
