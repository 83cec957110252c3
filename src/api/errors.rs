// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured error body returned at the transport boundary
///
/// Carries an outcome class and a fixed message only; decryption failures
/// are never explained to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error_type: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Error classes surfaced by the relay and node HTTP surfaces
///
/// Rate limiting, upstream exhaustion, and the generic processing failure
/// must stay distinguishable from each other, while the processing failure
/// stays silent about why an envelope could not be handled.
#[derive(Debug, Clone)]
pub enum ApiError {
    /// Request body is not the expected shape (client error class)
    InvalidRequest(String),
    /// Envelope could not be processed; reason deliberately withheld
    ProcessingFailed,
    /// Client identity exceeded its request window
    RateLimitExceeded {
        retry_after: u64,
    },
    /// Every backend attempt was exhausted
    UpstreamUnavailable,
    InternalError(String),
}

impl ApiError {
    pub fn to_response(&self, request_id: Option<String>) -> ErrorResponse {
        let (error_type, message) = match self {
            ApiError::InvalidRequest(msg) => ("invalid_request", msg.clone()),
            ApiError::ProcessingFailed => (
                "processing_failed",
                "request could not be processed".to_string(),
            ),
            ApiError::RateLimitExceeded { .. } => {
                ("rate_limit_exceeded", "too many requests".to_string())
            }
            ApiError::UpstreamUnavailable => (
                "upstream_unavailable",
                "service temporarily unavailable".to_string(),
            ),
            ApiError::InternalError(msg) => ("internal_error", msg.clone()),
        };

        ErrorResponse {
            error_type: error_type.to_string(),
            message,
            request_id,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::InvalidRequest(_) | ApiError::ProcessingFailed => 400,
            ApiError::RateLimitExceeded { .. } => 429,
            ApiError::UpstreamUnavailable => 503,
            ApiError::InternalError(_) => 500,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ApiError::ProcessingFailed => write!(f, "Request could not be processed"),
            ApiError::RateLimitExceeded { retry_after } => {
                write!(f, "Rate limit exceeded, retry after {} seconds", retry_after)
            }
            ApiError::UpstreamUnavailable => write!(f, "Service temporarily unavailable"),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, axum::response::Json(self.to_response(None))).into_response()
    }
}
