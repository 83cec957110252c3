// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Crypto Error Types
//!
//! Error taxonomy for the envelope protocol:
//!
//! - **KeyFormat**: malformed public/private key material (bad PEM, wrong modulus size)
//! - **Encryption**: invalid input to the encode path (empty plaintext, bad recipient key)
//! - **Decryption**: any failure on the decode path. Deliberately carries no cause:
//!   bad OAEP padding, a failed authentication tag, and a wrong-length unwrapped key
//!   must be indistinguishable to callers and over the wire (oracle resistance).
//! - **Schema**: decrypted content does not match the expected structured schema
//! - **MissingPayload**: caller passed no payload where one was required

use std::fmt;

/// Error type for all envelope-protocol operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Malformed public or private key material
    KeyFormat {
        /// Specific failure reason
        reason: String,
    },

    /// Invalid input to the encryption path
    ///
    /// This error occurs when:
    /// - Plaintext is empty (a caller bug, never silently encrypted)
    /// - The recipient public key has the wrong modulus size
    Encryption {
        /// Specific failure reason
        reason: String,
    },

    /// Decryption failed
    ///
    /// Single opaque variant; padding failures, authentication-tag failures,
    /// missing fields, and wrong-length symmetric keys are not distinguishable.
    Decryption,

    /// Decrypted content does not match the expected structured schema
    Schema {
        /// Specific failure reason
        reason: String,
    },

    /// A payload was required but absent
    ///
    /// Distinct from an explicit empty message, which is a valid payload.
    MissingPayload,
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoError::KeyFormat { reason } => {
                write!(f, "Invalid key material: {}", reason)
            }
            CryptoError::Encryption { reason } => {
                write!(f, "Encryption failed: {}", reason)
            }
            CryptoError::Decryption => {
                write!(f, "Decryption failed")
            }
            CryptoError::Schema { reason } => {
                write!(f, "Schema validation failed: {}", reason)
            }
            CryptoError::MissingPayload => {
                write!(f, "Payload is required but was absent")
            }
        }
    }
}

impl std::error::Error for CryptoError {}

// Conversion from PEM/SPKI decode errors
impl From<rsa::pkcs8::spki::Error> for CryptoError {
    fn from(err: rsa::pkcs8::spki::Error) -> Self {
        CryptoError::KeyFormat {
            reason: format!("SPKI error: {}", err),
        }
    }
}

// Conversion from JSON parse errors on decrypted payloads
impl From<serde_json::Error> for CryptoError {
    fn from(err: serde_json::Error) -> Self {
        CryptoError::Schema {
            reason: format!("JSON error: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = CryptoError::KeyFormat {
            reason: "bad PEM".to_string(),
        };
        assert_eq!(format!("{}", err), "Invalid key material: bad PEM");

        let err = CryptoError::Decryption;
        assert_eq!(format!("{}", err), "Decryption failed");

        let err = CryptoError::MissingPayload;
        assert_eq!(format!("{}", err), "Payload is required but was absent");
    }

    #[test]
    fn test_decryption_error_renders_without_cause() {
        // Whatever went wrong on the decode path, callers see one message.
        assert!(!format!("{}", CryptoError::Decryption).contains(':'));
    }

    #[test]
    fn test_from_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let crypto_err: CryptoError = json_err.into();

        match crypto_err {
            CryptoError::Schema { reason } => assert!(reason.contains("JSON")),
            _ => panic!("Expected CryptoError::Schema"),
        }
    }

    #[test]
    fn test_error_implements_error_trait() {
        let err: Box<dyn std::error::Error> = Box::new(CryptoError::MissingPayload);
        assert!(err.to_string().contains("absent"));
    }
}
