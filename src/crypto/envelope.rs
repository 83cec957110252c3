// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Hybrid Envelope Codec
//!
//! Pure encode/decode for the encrypted wire format. Each envelope carries one
//! message encrypted with a fresh random AES-256-GCM key, with that key
//! wrapped under the recipient's RSA public key using OAEP (SHA-256).
//!
//! **Wire Format** (JSON, all byte fields base64):
//! ```text
//! {
//!   "encrypted_key": <RSA-OAEP(aes_key)>,   // always modulus-sized (256 bytes)
//!   "nonce":         <12 bytes>,            // fresh per encryption
//!   "ciphertext":    <AES-256-GCM output>,  // tag appended unless detached
//!   "tag":           <16 bytes, optional>   // detached authentication tag
//! }
//! ```
//!
//! No I/O and no state: key generation, nonce generation, and the two cipher
//! passes are the only effects. Plaintext and key material are never logged.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use super::error::CryptoError;
use super::keys::RSA_MODULUS_BYTES;

/// AES-256 key size in bytes
pub const AES_KEY_SIZE: usize = 32;
/// AES-GCM nonce size in bytes
pub const NONCE_SIZE: usize = 12;
/// AES-GCM authentication tag size in bytes
pub const TAG_SIZE: usize = 16;

/// One hybrid-encrypted message on the wire
///
/// Envelopes are ephemeral: constructed per request/response and discarded
/// after decode. The relay forwards them verbatim and never inspects them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// AES key wrapped with RSA-OAEP; length equals the recipient modulus size
    #[serde(with = "b64")]
    pub encrypted_key: Vec<u8>,
    /// 12-byte nonce, unique per encryption operation
    #[serde(with = "b64")]
    pub nonce: Vec<u8>,
    /// AES-256-GCM ciphertext (tag appended when `tag` is `None`)
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
    /// Detached 16-byte authentication tag; `None` means combined form
    #[serde(default, skip_serializing_if = "Option::is_none", with = "b64_opt")]
    pub tag: Option<Vec<u8>>,
}

/// Encrypt plaintext into an envelope for the given recipient
///
/// Generates a fresh random 32-byte AES key and 12-byte nonce for every call,
/// encrypts the plaintext with AES-256-GCM, and wraps the AES key with
/// RSA-OAEP over SHA-256.
///
/// # Errors
///
/// Returns `CryptoError::Encryption` if:
/// - `plaintext` is empty (treated as a caller bug, never a silent no-op)
/// - The recipient key does not have the expected modulus size
pub fn encrypt(plaintext: &[u8], recipient: &RsaPublicKey) -> Result<Envelope, CryptoError> {
    // 1. Reject empty plaintext
    if plaintext.is_empty() {
        return Err(CryptoError::Encryption {
            reason: "plaintext is empty".to_string(),
        });
    }

    // 2. Validate recipient modulus size
    if recipient.size() != RSA_MODULUS_BYTES {
        return Err(CryptoError::Encryption {
            reason: format!(
                "recipient modulus size: expected {} bytes, got {}",
                RSA_MODULUS_BYTES,
                recipient.size()
            ),
        });
    }

    // 3. Fresh symmetric key and nonce for this envelope only
    let mut aes_key = Zeroizing::new([0u8; AES_KEY_SIZE]);
    OsRng.fill_bytes(aes_key.as_mut());
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    // 4. Encrypt the payload, tag appended
    let cipher = Aes256Gcm::new_from_slice(aes_key.as_ref()).map_err(|e| {
        CryptoError::Encryption {
            reason: format!("failed to create cipher: {}", e),
        }
    })?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| CryptoError::Encryption {
            reason: format!("AEAD encryption failed: {}", e),
        })?;

    // 5. Wrap the symmetric key for the recipient
    let encrypted_key = recipient
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), aes_key.as_ref())
        .map_err(|e| CryptoError::Encryption {
            reason: format!("RSA-OAEP key wrap failed: {}", e),
        })?;

    Ok(Envelope {
        encrypted_key,
        nonce: nonce.to_vec(),
        ciphertext,
        tag: None,
    })
}

/// Decrypt an envelope with the recipient's private key
///
/// Unwraps the AES key with RSA-OAEP, then authenticated-decrypts the
/// ciphertext. Never returns partial output.
///
/// # Errors
///
/// Returns `CryptoError::Decryption` on every failure: wrong-length fields,
/// bad OAEP padding, wrong-length unwrapped key, or a failed authentication
/// tag. The variant carries no cause so callers and wire responses cannot
/// leak which step failed.
pub fn decrypt(envelope: &Envelope, private: &RsaPrivateKey) -> Result<Vec<u8>, CryptoError> {
    // Field-size checks first; same opaque error as a cipher failure
    if envelope.encrypted_key.len() != private.size() {
        return Err(CryptoError::Decryption);
    }
    if envelope.nonce.len() != NONCE_SIZE {
        return Err(CryptoError::Decryption);
    }

    // Unwrap the symmetric key
    let aes_key = Zeroizing::new(
        private
            .decrypt(Oaep::new::<Sha256>(), &envelope.encrypted_key)
            .map_err(|_| CryptoError::Decryption)?,
    );
    if aes_key.len() != AES_KEY_SIZE {
        return Err(CryptoError::Decryption);
    }

    // Reassemble combined form when the tag rides detached
    let combined: Vec<u8> = match &envelope.tag {
        Some(tag) => {
            if tag.len() != TAG_SIZE {
                return Err(CryptoError::Decryption);
            }
            let mut buf = Vec::with_capacity(envelope.ciphertext.len() + TAG_SIZE);
            buf.extend_from_slice(&envelope.ciphertext);
            buf.extend_from_slice(tag);
            buf
        }
        None => {
            if envelope.ciphertext.len() < TAG_SIZE {
                return Err(CryptoError::Decryption);
            }
            envelope.ciphertext.clone()
        }
    };

    let cipher =
        Aes256Gcm::new_from_slice(aes_key.as_ref()).map_err(|_| CryptoError::Decryption)?;
    cipher
        .decrypt(Nonce::from_slice(&envelope.nonce), combined.as_slice())
        .map_err(|_| CryptoError::Decryption)
}

/// Base64 (de)serialization for envelope byte fields
pub(crate) mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Base64 (de)serialization for the optional detached tag
pub(crate) mod b64_opt {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => serializer.serialize_some(&STANDARD.encode(b)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        match encoded {
            Some(s) => STANDARD
                .decode(s)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
