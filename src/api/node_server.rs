// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Backend Node HTTP Surface
//!
//! The envelope endpoint the backend party exposes (reached directly or
//! through the relay): public-key retrieval plus the encrypted
//! request/response route. Decryption failures all collapse to one generic
//! client error; the response never says why an envelope was rejected.

use axum::{
    extract::rejection::JsonRejection,
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};

use super::errors::ApiError;
use crate::crypto::{
    import_public, CryptoManager, DecryptedPayload, Envelope, OutboundPayload, PublicKeyRecord,
};
use crate::inference::InferenceEngine;
use crate::messages::{EncryptedRequest, PlaintextMessage};

#[derive(Clone)]
pub struct NodeState {
    manager: Arc<CryptoManager>,
    engine: Arc<dyn InferenceEngine>,
    owner: String,
}

impl NodeState {
    pub fn new(
        manager: Arc<CryptoManager>,
        engine: Arc<dyn InferenceEngine>,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            manager,
            engine,
            owner: owner.into(),
        }
    }
}

#[derive(Serialize)]
struct NodeHealth {
    status: &'static str,
    owner: String,
}

/// Build the node router; separable from serving for tests
pub fn node_router(state: NodeState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/public-key", get(public_key_handler))
        .route("/v1/encrypted", post(encrypted_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Bind and serve the node surface
pub async fn start_node_server(
    addr: SocketAddr,
    state: NodeState,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = node_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("node listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    Ok(())
}

async fn health_handler(State(state): State<NodeState>) -> impl IntoResponse {
    Json(NodeHealth {
        status: "ok",
        owner: state.owner.clone(),
    })
}

async fn public_key_handler(
    State(state): State<NodeState>,
) -> Result<Json<PublicKeyRecord>, ApiError> {
    state
        .manager
        .public_record(&state.owner)
        .map(Json)
        .map_err(|e| ApiError::InternalError(format!("key export failed: {}", e)))
}

async fn encrypted_handler(
    State(state): State<NodeState>,
    body: Result<Json<EncryptedRequest>, JsonRejection>,
) -> Result<Json<Envelope>, ApiError> {
    // 1. Shape-check the body and the sender's key before any crypto
    let Json(request) = body
        .map_err(|e| ApiError::InvalidRequest(format!("malformed request body: {}", e)))?;
    let sender_key = import_public(&PublicKeyRecord {
        public_key_pem: request.sender_public_key.clone(),
        owner: String::new(),
    })
    .map_err(|_| ApiError::InvalidRequest("sender public key malformed".to_string()))?;

    // 2. Decrypt; every failure mode answers with the same generic error
    let prompt = match state.manager.decrypt_message(&request.envelope) {
        DecryptedPayload::Structured(message) => message,
        DecryptedPayload::Raw(bytes) => match String::from_utf8(bytes) {
            // Non-schema text rides as a bare prompt so off-schema clients keep working
            Ok(text) => PlaintextMessage::from_prompt(text),
            Err(_) => return Err(ApiError::ProcessingFailed),
        },
        DecryptedPayload::Absent => return Err(ApiError::ProcessingFailed),
    };

    // 3. Hand plaintext to the engine boundary
    let completion = state.engine.complete(prompt).await.map_err(|e| {
        tracing::error!(error = %e, "inference engine call failed");
        ApiError::InternalError("inference engine unavailable".to_string())
    })?;

    // 4. Re-encrypt against the caller's key
    state
        .manager
        .encrypt_message(Some(&OutboundPayload::Structured(completion)), &sender_key)
        .map(Json)
        .map_err(|e| {
            tracing::error!(error = %e, "response encryption failed");
            ApiError::InternalError("response encryption failed".to_string())
        })
}
