// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Relay Dispatcher
//!
//! Stateless-per-request forwarding between clients and backend endpoints.
//! Each request runs the same strictly ordered flow: rate-limit check,
//! candidate selection from the shared registry, forward, then retry against
//! the next-best candidate on timeout or connection failure.
//!
//! Envelope bytes are relayed verbatim; the dispatcher never parses,
//! decrypts, or mutates them, and it never converts a transport failure
//! into success. Logs carry endpoint, attempt number, and outcome only.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use super::rate_limiter::RateLimiter;
use super::registry::EndpointRegistry;

/// Transport-level failure classes that trigger failover
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Deadline expired; the call is abandoned, not awaited further
    #[error("request timed out")]
    Timeout,
    /// Connection could not be established or broke mid-flight
    #[error("connection failed: {0}")]
    Connect(String),
}

/// HTTP method of a forwarded request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardMethod {
    Get,
    Post,
}

/// Upstream response relayed back to the caller as-is
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardResponse {
    pub status: u16,
    pub body: Bytes,
}

/// Outbound call seam, mockable for tests
#[async_trait]
pub trait BackendTransport: Send + Sync {
    async fn request(
        &self,
        base_url: &str,
        path: &str,
        method: ForwardMethod,
        body: Option<Bytes>,
    ) -> Result<ForwardResponse, TransportError>;
}

/// reqwest-backed transport with a bounded per-request deadline
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait]
impl BackendTransport for HttpTransport {
    async fn request(
        &self,
        base_url: &str,
        path: &str,
        method: ForwardMethod,
        body: Option<Bytes>,
    ) -> Result<ForwardResponse, TransportError> {
        let url = format!("{}{}", base_url.trim_end_matches('/'), path);
        let request = match method {
            ForwardMethod::Get => self.http.get(&url),
            ForwardMethod::Post => {
                let builder = self.http.post(&url).header("content-type", "application/json");
                match body {
                    Some(bytes) => builder.body(bytes),
                    None => builder,
                }
            }
        };

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Connect(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(ForwardResponse { status, body })
    }
}

/// Dispatch failures surfaced to the transport boundary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// The client identity exceeded its request window; no backend contact
    #[error("too many requests")]
    RateLimitExceeded,
    /// Every attempt in the budget failed; never partial bytes
    #[error("service temporarily unavailable after {attempts} attempts")]
    UpstreamUnavailable { attempts: u32 },
}

/// Retry budget and backoff schedule between attempts
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(100),
            backoff_cap: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Bounded exponential delay before the given attempt (1-based)
    fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2).min(16);
        self.backoff_base
            .saturating_mul(1u32 << exponent)
            .min(self.backoff_cap)
    }
}

/// The relay's per-request forwarding engine
///
/// Shared state (endpoint registry, rate-limit table) is injected at
/// construction; requests themselves share nothing.
pub struct RelayDispatcher {
    registry: Arc<EndpointRegistry>,
    rate_limiter: RateLimiter,
    transport: Arc<dyn BackendTransport>,
    policy: RetryPolicy,
}

impl RelayDispatcher {
    pub fn new(
        registry: Arc<EndpointRegistry>,
        rate_limiter: RateLimiter,
        transport: Arc<dyn BackendTransport>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            registry,
            rate_limiter,
            transport,
            policy,
        }
    }

    /// Forward one request through the failover chain
    ///
    /// Rate limiting always precedes backend contact. Retries are internal;
    /// callers only observe added latency, a relayed upstream response, or
    /// one of the two terminal [`RelayError`] signals.
    pub async fn dispatch(
        &self,
        client_id: &str,
        path: &str,
        method: ForwardMethod,
        body: Option<Bytes>,
    ) -> Result<ForwardResponse, RelayError> {
        if !self.rate_limiter.check_and_record(client_id) {
            warn!(client = %client_id, outcome = "rate_limited", "request refused");
            return Err(RelayError::RateLimitExceeded);
        }

        let request_id = Uuid::new_v4();
        let candidates = self.registry.candidates().await;
        if candidates.is_empty() {
            warn!(%request_id, outcome = "no_candidates", "no backend available");
            return Err(RelayError::UpstreamUnavailable { attempts: 0 });
        }

        let mut attempts = 0u32;
        // Cycle so a single configured endpoint still gets the full budget
        for url in candidates.iter().cycle().take(self.policy.max_attempts as usize) {
            attempts += 1;
            let delay = self.policy.delay_before(attempts);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match self.transport.request(url, path, method, body.clone()).await {
                Ok(response) => {
                    info!(
                        %request_id,
                        endpoint = %url,
                        attempt = attempts,
                        status = response.status,
                        body_len = response.body.len(),
                        outcome = "forwarded",
                        "request relayed"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    warn!(
                        %request_id,
                        endpoint = %url,
                        attempt = attempts,
                        error = %e,
                        outcome = "attempt_failed",
                        "forward attempt failed"
                    );
                }
            }
        }

        warn!(%request_id, attempts, outcome = "exhausted", "all backend attempts failed");
        Err(RelayError::UpstreamUnavailable { attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Transport that fails for listed URLs and succeeds elsewhere
    struct ScriptedTransport {
        failing: Vec<String>,
        calls: Arc<AtomicU32>,
    }

    impl ScriptedTransport {
        fn failing(urls: &[&str]) -> Self {
            Self {
                failing: urls.iter().map(|u| u.to_string()).collect(),
                calls: Arc::new(AtomicU32::new(0)),
            }
        }
    }

    #[async_trait]
    impl BackendTransport for ScriptedTransport {
        async fn request(
            &self,
            base_url: &str,
            _path: &str,
            _method: ForwardMethod,
            _body: Option<Bytes>,
        ) -> Result<ForwardResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.iter().any(|u| u == base_url) {
                Err(TransportError::Connect("refused".to_string()))
            } else {
                Ok(ForwardResponse {
                    status: 200,
                    body: Bytes::from_static(b"ok"),
                })
            }
        }
    }

    fn dispatcher(
        urls: &[&str],
        limiter: RateLimiter,
        transport: ScriptedTransport,
    ) -> RelayDispatcher {
        let registry = Arc::new(EndpointRegistry::new(
            urls.iter().map(|u| u.to_string()).collect(),
            Vec::new(),
        ));
        let policy = RetryPolicy {
            backoff_base: Duration::from_millis(1),
            backoff_cap: Duration::from_millis(4),
            ..RetryPolicy::default()
        };
        RelayDispatcher::new(registry, limiter, Arc::new(transport), policy)
    }

    #[tokio::test]
    async fn test_rate_limit_precedes_backend_contact() {
        let transport = ScriptedTransport::failing(&[]);
        let d = dispatcher(&["http://a"], RateLimiter::new(1), transport);

        assert!(d
            .dispatch("client", "/v1/encrypted", ForwardMethod::Post, None)
            .await
            .is_ok());
        let second = d
            .dispatch("client", "/v1/encrypted", ForwardMethod::Post, None)
            .await;
        assert_eq!(second, Err(RelayError::RateLimitExceeded));
    }

    #[tokio::test]
    async fn test_failover_to_next_candidate() {
        let transport = ScriptedTransport::failing(&["http://a"]);
        let d = dispatcher(&["http://a", "http://b"], RateLimiter::new(10), transport);

        let response = d
            .dispatch("client", "/v1/encrypted", ForwardMethod::Post, None)
            .await
            .unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_exhaustion_surfaces_upstream_unavailable() {
        let transport = ScriptedTransport::failing(&["http://a", "http://b"]);
        let d = dispatcher(&["http://a", "http://b"], RateLimiter::new(10), transport);

        let result = d
            .dispatch("client", "/v1/encrypted", ForwardMethod::Post, None)
            .await;
        assert_eq!(result, Err(RelayError::UpstreamUnavailable { attempts: 3 }));
    }

    #[tokio::test]
    async fn test_attempt_budget_respected_with_single_endpoint() {
        let transport = ScriptedTransport::failing(&["http://a"]);
        let calls = transport.calls.clone();
        let d = dispatcher(&["http://a"], RateLimiter::new(10), transport);

        let result = d
            .dispatch("client", "/v1/encrypted", ForwardMethod::Post, None)
            .await;
        assert_eq!(result, Err(RelayError::UpstreamUnavailable { attempts: 3 }));
        // The single endpoint was retried up to the budget, no further
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_backoff_is_bounded_exponential() {
        let policy = RetryPolicy {
            max_attempts: 10,
            backoff_base: Duration::from_millis(100),
            backoff_cap: Duration::from_secs(2),
        };

        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_millis(100));
        assert_eq!(policy.delay_before(3), Duration::from_millis(200));
        assert_eq!(policy.delay_before(4), Duration::from_millis(400));
        // Capped
        assert_eq!(policy.delay_before(9), Duration::from_secs(2));
    }
}
