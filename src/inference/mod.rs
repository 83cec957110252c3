// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Inference Engine Boundary
//!
//! The backend hands a decoded plaintext message to the inference engine and
//! receives a plaintext message back; the engine's internals are not this
//! crate's concern. [`HttpEngineClient`] talks to a local engine process over
//! HTTP; [`EchoEngine`] is a deterministic stand-in for tests and local runs.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;

use crate::messages::PlaintextMessage;

/// Boundary to the party that turns prompts into completions
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    async fn complete(&self, request: PlaintextMessage) -> Result<PlaintextMessage>;
}

/// Client for a local inference engine exposing a plaintext completion route
pub struct HttpEngineClient {
    http: Client,
    endpoint: String,
}

impl HttpEngineClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: Client::builder().timeout(timeout).build()?,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl InferenceEngine for HttpEngineClient {
    async fn complete(&self, request: PlaintextMessage) -> Result<PlaintextMessage> {
        let url = format!("{}/v1/completion", self.endpoint.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow!("engine request failed: {}", e))?;

        if !response.status().is_success() {
            return Err(anyhow!("engine returned status {}", response.status()));
        }

        response
            .json::<PlaintextMessage>()
            .await
            .map_err(|e| anyhow!("engine response malformed: {}", e))
    }
}

/// Echoes the last user turn back as an assistant turn
pub struct EchoEngine;

#[async_trait]
impl InferenceEngine for EchoEngine {
    async fn complete(&self, request: PlaintextMessage) -> Result<PlaintextMessage> {
        let content = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(PlaintextMessage::assistant(format!("echo: {}", content)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::ChatMessage;

    #[tokio::test]
    async fn test_echo_engine_reflects_last_turn() {
        let request = PlaintextMessage::new(vec![
            ChatMessage::user("first"),
            ChatMessage::user("second"),
        ]);

        let response = EchoEngine.complete(request).await.unwrap();
        assert_eq!(response.messages.len(), 1);
        assert_eq!(response.messages[0].role, "assistant");
        assert_eq!(response.messages[0].content, "echo: second");
    }

    #[tokio::test]
    async fn test_http_engine_unreachable_is_error() {
        let engine =
            HttpEngineClient::new("http://127.0.0.1:1", Duration::from_millis(200)).unwrap();
        let result = engine.complete(PlaintextMessage::from_prompt("hi")).await;
        assert!(result.is_err());
    }
}
