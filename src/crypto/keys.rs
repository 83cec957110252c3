// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! RSA Key Management
//!
//! Owns one RSA-2048 key pair per party. The server generates its pair once
//! per process lifetime; clients generate an ephemeral pair per session. Only
//! the public half is ever serialized (SPKI PEM); the private half stays
//! in-process and is replaced wholesale on rotation, never mutated.

use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::CryptoError;

/// Configured RSA key strength in bits
pub const RSA_KEY_BITS: usize = 2048;
/// RSA modulus size in bytes for the configured strength
pub const RSA_MODULUS_BYTES: usize = RSA_KEY_BITS / 8;

/// Shareable public key plus the identity advertising it
///
/// Exchanged over the wire. The relay may cache records but cannot derive
/// the private counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyRecord {
    /// SPKI PEM encoding of the public key
    pub public_key_pem: String,
    /// Opaque owner identity, e.g. "server" or a client session id
    pub owner: String,
}

/// One party's RSA key pair and the encrypt/decrypt identity bound to it
pub struct KeyManager {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl KeyManager {
    /// Generate a fresh RSA-2048 key pair
    pub fn generate() -> Result<Self, CryptoError> {
        let private = RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS).map_err(|e| {
            CryptoError::KeyFormat {
                reason: format!("key generation failed: {}", e),
            }
        })?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    /// The public half of this identity
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    /// The private half; never leaves the process
    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private
    }

    /// Serialize only the public half as a shareable record
    pub fn export_public(&self, owner: &str) -> Result<PublicKeyRecord, CryptoError> {
        let public_key_pem = self.public.to_public_key_pem(LineEnding::LF)?;
        Ok(PublicKeyRecord {
            public_key_pem,
            owner: owner.to_string(),
        })
    }

    /// Short hex fingerprint of the public key, safe for logs
    pub fn fingerprint(&self) -> String {
        fingerprint_pem(
            &self
                .public
                .to_public_key_pem(LineEnding::LF)
                .unwrap_or_default(),
        )
    }

    /// Replace the pair wholesale with a freshly generated one
    ///
    /// Callers holding envelopes encrypted under the old key will fail
    /// decryption afterwards; that is expected and surfaces as the generic
    /// decryption error. They must re-fetch the public key before their
    /// next encrypt.
    pub fn rotate(&mut self) -> Result<(), CryptoError> {
        *self = Self::generate()?;
        Ok(())
    }
}

/// Short hex fingerprint of a PEM-encoded public key, safe for logs
pub fn fingerprint_pem(pem: &str) -> String {
    let digest = Sha256::digest(pem.as_bytes());
    hex::encode(&digest[..4])
}

/// Validate and parse a public key record received over the wire
///
/// # Errors
///
/// Returns `CryptoError::KeyFormat` when the PEM encoding is malformed or
/// the modulus is not the configured strength.
pub fn import_public(record: &PublicKeyRecord) -> Result<RsaPublicKey, CryptoError> {
    let key = RsaPublicKey::from_public_key_pem(&record.public_key_pem)?;
    if key.size() != RSA_MODULUS_BYTES {
        return Err(CryptoError::KeyFormat {
            reason: format!(
                "modulus size: expected {} bytes, got {}",
                RSA_MODULUS_BYTES,
                key.size()
            ),
        });
    }
    Ok(key)
}
