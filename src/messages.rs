// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Plaintext Message Schema
//!
//! The versioned structured payload exchanged inside envelopes. Understood
//! only by the crypto client and the server-side crypto manager; the relay
//! never parses it.

use serde::{Deserialize, Serialize};

use crate::crypto::envelope::Envelope;
use crate::crypto::error::CryptoError;

/// Current plaintext schema version
pub const SCHEMA_VERSION: u32 = 1;

/// One chat turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Structured payload carried inside an envelope
///
/// Used for both requests (chat turns plus sampling options) and responses
/// (assistant turns). Unknown fields are ignored on parse so newer peers can
/// extend the schema without breaking older ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaintextMessage {
    /// Schema version; must equal [`SCHEMA_VERSION`]
    pub version: u32,
    /// Chat turns; may be explicitly empty
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl PlaintextMessage {
    /// Message with the given turns and no sampling options
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            version: SCHEMA_VERSION,
            messages,
            model: None,
            max_tokens: None,
            temperature: None,
        }
    }

    /// Single user turn from a bare prompt
    pub fn from_prompt(content: impl Into<String>) -> Self {
        Self::new(vec![ChatMessage::user(content)])
    }

    /// Single assistant turn (the usual response shape)
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(vec![ChatMessage::assistant(content)])
    }

    /// An explicitly empty message: no turns, no options
    ///
    /// Valid to encrypt and round-trips as-is; distinct from an absent
    /// payload, which is a caller error.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Parse decrypted bytes as the expected structured schema
///
/// # Errors
///
/// Returns `CryptoError::Schema` when the bytes are not JSON for this
/// schema or carry an unsupported version.
pub fn parse_plaintext(bytes: &[u8]) -> Result<PlaintextMessage, CryptoError> {
    let message: PlaintextMessage = serde_json::from_slice(bytes)?;
    if message.version != SCHEMA_VERSION {
        return Err(CryptoError::Schema {
            reason: format!("unsupported schema version {}", message.version),
        });
    }
    Ok(message)
}

/// Body of `POST /v1/encrypted`: the envelope fields plus the sender's
/// public key, which the backend uses to encrypt its response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedRequest {
    #[serde(flatten)]
    pub envelope: Envelope,
    /// SPKI PEM public key of the requesting client
    pub sender_public_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_schema() {
        let msg = PlaintextMessage::from_prompt("What is the capital of France?");
        let bytes = serde_json::to_vec(&msg).unwrap();

        let parsed = parse_plaintext(&bytes).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_parse_rejects_wrong_version() {
        let json = r#"{"version":99,"messages":[]}"#;
        assert!(matches!(
            parse_plaintext(json.as_bytes()),
            Err(CryptoError::Schema { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_non_schema_text() {
        assert!(parse_plaintext(b"just some prose").is_err());
        assert!(parse_plaintext(b"{\"foo\": 1}").is_err());
    }

    #[test]
    fn test_parse_ignores_unknown_fields() {
        let json = r#"{"version":1,"messages":[],"future_field":true}"#;
        let parsed = parse_plaintext(json.as_bytes()).unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_empty_message_roundtrip() {
        let empty = PlaintextMessage::empty();
        let bytes = serde_json::to_vec(&empty).unwrap();
        // Empty message still serializes to non-empty bytes
        assert!(!bytes.is_empty());
        assert_eq!(parse_plaintext(&bytes).unwrap(), empty);
    }
}
