// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod api;
pub mod client;
pub mod config;
pub mod crypto;
pub mod inference;
pub mod messages;
pub mod relay;
pub mod version;

// Re-export main types
pub use client::CryptoClient;
pub use config::{NodeConfig, RelayConfig};
pub use crypto::{
    CryptoError, CryptoManager, DecryptedPayload, Envelope, KeyManager, OutboundPayload,
    PublicKeyRecord,
};
pub use inference::{EchoEngine, HttpEngineClient, InferenceEngine};
pub use messages::{ChatMessage, EncryptedRequest, PlaintextMessage, SCHEMA_VERSION};
pub use relay::{
    BackendTransport, EndpointRegistry, HealthProber, HealthState, HttpTransport, RateLimiter,
    RelayDispatcher, RelayError, RetryPolicy,
};
