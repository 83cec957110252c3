// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Relay HTTP Surface
//!
//! The routes the relay exposes to clients. Envelope bodies are taken as raw
//! bytes and handed to the dispatcher untouched; upstream responses are
//! relayed back with their status intact. The only routes the relay answers
//! itself are its own health report and the two dispatch failures.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use serde::Serialize;
use std::{net::SocketAddr, sync::Arc, time::Instant};
use tower_http::cors::{Any, CorsLayer};

use super::errors::ApiError;
use crate::relay::{BackendEndpoint, EndpointRegistry, ForwardMethod, RelayDispatcher, RelayError};

#[derive(Clone)]
pub struct RelayState {
    dispatcher: Arc<RelayDispatcher>,
    registry: Arc<EndpointRegistry>,
    started_at: Instant,
    rate_window_secs: u64,
}

impl RelayState {
    pub fn new(
        dispatcher: Arc<RelayDispatcher>,
        registry: Arc<EndpointRegistry>,
        rate_window_secs: u64,
    ) -> Self {
        Self {
            dispatcher,
            registry,
            started_at: Instant::now(),
            rate_window_secs,
        }
    }
}

#[derive(Serialize)]
struct RelayHealth {
    status: &'static str,
    uptime_seconds: u64,
    backends: Vec<BackendEndpoint>,
}

/// Build the relay router; separable from serving for tests
pub fn relay_router(state: RelayState) -> Router {
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

/// Bind and serve the relay surface
pub async fn start_relay_server(
    addr: SocketAddr,
    state: RelayState,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = relay_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("relay listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
    })
    .await?;

    Ok(())
}

async fn health_handler(State(state): State<RelayState>) -> impl IntoResponse {
    axum::response::Json(RelayHealth {
        status: "ok",
        uptime_seconds: state.started_at.elapsed().as_secs(),
        backends: state.registry.snapshot().await,
    })
}

async fn public_key_handler(
    State(state): State<RelayState>,
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
) -> Response {
    let client = client_identity(&headers, connect.map(|ConnectInfo(addr)| addr));
    let outcome = state
        .dispatcher
        .dispatch(&client, "/v1/public-key", ForwardMethod::Get, None)
        .await;
    relay_outcome(&state, outcome)
}

async fn encrypted_handler(
    State(state): State<RelayState>,
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
    body: Bytes,
) -> Response {
    let client = client_identity(&headers, connect.map(|ConnectInfo(addr)| addr));
    let outcome = state
        .dispatcher
        .dispatch(&client, "/v1/encrypted", ForwardMethod::Post, Some(body))
        .await;
    relay_outcome(&state, outcome)
}

/// Client identity for rate limiting: session header first, else source address
fn client_identity(headers: &HeaderMap, connect: Option<SocketAddr>) -> String {
    if let Some(session) = headers.get("x-session-id").and_then(|v| v.to_str().ok()) {
        return session.to_string();
    }
    match connect {
        Some(addr) => addr.ip().to_string(),
        None => "unknown".to_string(),
    }
}

fn relay_outcome(
    state: &RelayState,
    outcome: Result<crate::relay::ForwardResponse, RelayError>,
) -> Response {
    match outcome {
        Ok(forwarded) => {
            // Pass the upstream response through verbatim
            let status = StatusCode::from_u16(forwarded.status)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            Response::builder()
                .status(status)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(forwarded.body))
                .unwrap_or_else(|_| {
                    ApiError::InternalError("response assembly failed".to_string())
                        .into_response()
                })
        }
        Err(RelayError::RateLimitExceeded) => ApiError::RateLimitExceeded {
            retry_after: state.rate_window_secs,
        }
        .into_response(),
        Err(RelayError::UpstreamUnavailable { .. }) => {
            ApiError::UpstreamUnavailable.into_response()
        }
    }
}
