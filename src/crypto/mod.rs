// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! End-to-End Encryption Module
//!
//! Implements the envelope protocol carried between clients and the backend
//! node through the untrusted relay:
//!
//! - **Envelope**: hybrid RSA-OAEP + AES-256-GCM wire format, pure functions
//! - **Keys**: per-party RSA-2048 key pairs with SPKI PEM public exchange
//! - **Manager**: the server identity's decrypt/re-encrypt façade
//!
//! ## Security Considerations
//!
//! - Private keys never leave the process; symmetric keys are zeroized
//! - Nonces are generated fresh per encryption operation, never reused
//! - Every decode failure surfaces as one undifferentiated decryption error
//! - Plaintext and key material are never logged under any configuration
//!
//! ## Protocol Flow
//!
//! 1. Client fetches the node's public key record (directly or via relay)
//! 2. Client encrypts a plaintext message into an envelope for the node
//! 3. Relay forwards the envelope bytes verbatim; it cannot decrypt them
//! 4. Node unwraps the AES key with its private key, decrypts, validates shape
//! 5. Node hands plaintext to the inference engine, gets a response back
//! 6. Node re-encrypts the response against the client's public key
//! 7. Client unwraps the response envelope with its ephemeral private key

pub mod envelope;
pub mod error;
pub mod keys;
pub mod manager;

pub use envelope::{decrypt, encrypt, Envelope, AES_KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use error::CryptoError;
pub use keys::{
    fingerprint_pem, import_public, KeyManager, PublicKeyRecord, RSA_KEY_BITS, RSA_MODULUS_BYTES,
};
pub use manager::{CryptoManager, DecryptedPayload, OutboundPayload};
