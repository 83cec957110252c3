//! Relay dispatch properties: rate limiting, failover, health transitions
//!
//! The transport seam is faked so backend behavior is scripted per URL;
//! nothing here touches real sockets except the prober test, which probes a
//! port nothing listens on.

use async_trait::async_trait;
use bytes::Bytes;
use fabstir_llm_relay::relay::{
    BackendTransport, EndpointRegistry, ForwardMethod, ForwardResponse, HealthProber, HealthState,
    RateLimiter, RelayDispatcher, RelayError, RetryPolicy, TransportError,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Per-URL scripted outcomes with call counting
struct FakeBackends {
    alive: HashMap<String, &'static [u8]>,
    calls: Arc<AtomicU32>,
}

impl FakeBackends {
    fn new(alive: &[(&str, &'static [u8])]) -> Self {
        Self {
            alive: alive
                .iter()
                .map(|(url, body)| (url.to_string(), *body))
                .collect(),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }
}

#[async_trait]
impl BackendTransport for FakeBackends {
    async fn request(
        &self,
        base_url: &str,
        _path: &str,
        _method: ForwardMethod,
        _body: Option<Bytes>,
    ) -> Result<ForwardResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.alive.get(base_url) {
            Some(body) => Ok(ForwardResponse {
                status: 200,
                body: Bytes::from_static(body),
            }),
            None => Err(TransportError::Connect("connection refused".to_string())),
        }
    }
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        backoff_base: Duration::from_millis(1),
        backoff_cap: Duration::from_millis(4),
    }
}

#[tokio::test]
async fn test_one_request_per_window_yields_one_success_one_limited() {
    let registry = Arc::new(EndpointRegistry::new(
        vec!["http://backend".to_string()],
        Vec::new(),
    ));
    let dispatcher = RelayDispatcher::new(
        registry,
        RateLimiter::with_window(1, Duration::from_secs(60)),
        Arc::new(FakeBackends::new(&[("http://backend", b"ok")])),
        fast_policy(),
    );

    let first = dispatcher
        .dispatch("203.0.113.7", "/v1/encrypted", ForwardMethod::Post, None)
        .await;
    let second = dispatcher
        .dispatch("203.0.113.7", "/v1/encrypted", ForwardMethod::Post, None)
        .await;

    assert!(first.is_ok());
    assert_eq!(second, Err(RelayError::RateLimitExceeded));
}

#[tokio::test]
async fn test_rate_limited_request_never_reaches_a_backend() {
    let registry = Arc::new(EndpointRegistry::new(
        vec!["http://backend".to_string()],
        Vec::new(),
    ));
    let backends = FakeBackends::new(&[("http://backend", b"ok")]);
    let calls = backends.calls.clone();
    let dispatcher = RelayDispatcher::new(
        registry,
        RateLimiter::with_window(1, Duration::from_secs(60)),
        Arc::new(backends),
        fast_policy(),
    );

    let _ = dispatcher
        .dispatch("client", "/v1/encrypted", ForwardMethod::Post, None)
        .await;
    let _ = dispatcher
        .dispatch("client", "/v1/encrypted", ForwardMethod::Post, None)
        .await;

    // Only the admitted request produced backend traffic
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failover_reaches_fallback_within_budget() {
    // Primary dead, fallback alive
    let registry = Arc::new(EndpointRegistry::new(
        vec!["http://primary".to_string()],
        vec!["http://tunnel".to_string()],
    ));
    let dispatcher = RelayDispatcher::new(
        registry.clone(),
        RateLimiter::new(100),
        Arc::new(FakeBackends::new(&[("http://tunnel", b"via-fallback")])),
        fast_policy(),
    );

    let response = dispatcher
        .dispatch("client", "/v1/encrypted", ForwardMethod::Post, None)
        .await
        .unwrap();
    assert_eq!(response.body.as_ref(), b"via-fallback");
}

#[tokio::test]
async fn test_unreachable_primary_is_skipped_entirely() {
    let registry = Arc::new(EndpointRegistry::new(
        vec!["http://primary".to_string(), "http://secondary".to_string()],
        Vec::new(),
    ));
    // Probe loop has already marked the primary Unreachable
    for _ in 0..3 {
        registry.record_failure("http://primary").await;
    }
    assert_eq!(
        registry.state_of("http://primary").await,
        Some(HealthState::Unreachable)
    );

    let backends = FakeBackends::new(&[("http://secondary", b"ok")]);
    let calls = backends.calls.clone();
    let dispatcher = RelayDispatcher::new(
        registry,
        RateLimiter::new(100),
        Arc::new(backends),
        fast_policy(),
    );

    let response = dispatcher
        .dispatch("client", "/v1/encrypted", ForwardMethod::Post, None)
        .await
        .unwrap();
    assert_eq!(response.status, 200);
    // First attempt went straight to the secondary
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_exhaustion_yields_upstream_unavailable_not_partial_bytes() {
    let registry = Arc::new(EndpointRegistry::new(
        vec!["http://a".to_string(), "http://b".to_string()],
        vec!["http://c".to_string()],
    ));
    let dispatcher = RelayDispatcher::new(
        registry,
        RateLimiter::new(100),
        Arc::new(FakeBackends::new(&[])),
        fast_policy(),
    );

    let result = dispatcher
        .dispatch("client", "/v1/encrypted", ForwardMethod::Post, None)
        .await;
    assert_eq!(result, Err(RelayError::UpstreamUnavailable { attempts: 3 }));
}

#[tokio::test]
async fn test_prober_marks_dead_primary_unreachable_after_three_failures() {
    let registry = Arc::new(EndpointRegistry::new(
        vec!["http://127.0.0.1:1".to_string()],
        vec!["http://tunnel".to_string()],
    ));
    let prober = HealthProber::new(
        registry.clone(),
        Duration::from_secs(30),
        Duration::from_millis(200),
    )
    .unwrap();

    for _ in 0..3 {
        prober.probe_all().await;
    }

    assert_eq!(
        registry.state_of("http://127.0.0.1:1").await,
        Some(HealthState::Unreachable)
    );
    // Selection now offers only the fallback
    assert_eq!(registry.candidates().await, vec!["http://tunnel"]);
}
