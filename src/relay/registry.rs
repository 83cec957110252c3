// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Backend Endpoint Registry
//!
//! Shared registry of configured backend endpoints and their health states,
//! injected into the dispatcher at construction. Health transitions are
//! driven exclusively by the probe loop; the request path only reads the
//! registry to order its candidates.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

/// Consecutive probe failures before an endpoint is marked Unreachable
pub const FAILURE_THRESHOLD: u32 = 3;

/// Per-endpoint health classification driving failover routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unreachable,
}

/// One configured backend and its probe-derived state
#[derive(Debug, Clone, Serialize)]
pub struct BackendEndpoint {
    pub url: String,
    pub health: HealthState,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

impl BackendEndpoint {
    fn new(url: String) -> Self {
        Self {
            url,
            health: HealthState::Healthy,
            last_checked_at: None,
            last_failure_at: None,
            consecutive_failures: 0,
        }
    }
}

/// Synchronized endpoint table plus the configured fallback URLs
///
/// Fallbacks (e.g. a tunnel address) are not health-tracked; they are tried
/// in configured order once every primary is Unreachable.
pub struct EndpointRegistry {
    endpoints: RwLock<Vec<BackendEndpoint>>,
    fallback_urls: Vec<String>,
}

impl EndpointRegistry {
    pub fn new(backend_urls: Vec<String>, fallback_urls: Vec<String>) -> Self {
        Self {
            endpoints: RwLock::new(
                backend_urls.into_iter().map(BackendEndpoint::new).collect(),
            ),
            fallback_urls,
        }
    }

    /// Record a successful probe: reset the failure run, promote one step
    pub async fn record_success(&self, url: &str) {
        let mut endpoints = self.endpoints.write().await;
        if let Some(endpoint) = endpoints.iter_mut().find(|e| e.url == url) {
            endpoint.last_checked_at = Some(Utc::now());
            endpoint.consecutive_failures = 0;
            let promoted = match endpoint.health {
                HealthState::Unreachable => HealthState::Degraded,
                HealthState::Degraded => HealthState::Healthy,
                HealthState::Healthy => HealthState::Healthy,
            };
            if promoted != endpoint.health {
                tracing::info!(url = %endpoint.url, from = ?endpoint.health, to = ?promoted, "endpoint promoted");
                endpoint.health = promoted;
            }
        }
    }

    /// Record a failed probe: extend the failure run, demote along
    /// Healthy → Degraded → Unreachable
    ///
    /// The first failure in a run demotes to Degraded; reaching
    /// [`FAILURE_THRESHOLD`] consecutive failures marks the endpoint
    /// Unreachable.
    pub async fn record_failure(&self, url: &str) {
        let mut endpoints = self.endpoints.write().await;
        if let Some(endpoint) = endpoints.iter_mut().find(|e| e.url == url) {
            let now = Utc::now();
            endpoint.last_checked_at = Some(now);
            endpoint.last_failure_at = Some(now);
            endpoint.consecutive_failures += 1;

            let demoted = if endpoint.consecutive_failures >= FAILURE_THRESHOLD {
                HealthState::Unreachable
            } else {
                HealthState::Degraded
            };
            if demoted != endpoint.health {
                tracing::warn!(url = %endpoint.url, from = ?endpoint.health, to = ?demoted, "endpoint demoted");
                endpoint.health = demoted;
            }
        }
    }

    /// Candidate URLs in failover order
    ///
    /// Healthy endpoints in configured order, then Degraded endpoints
    /// least-recently-failed first, then the fallback URLs in configured
    /// order. Unreachable endpoints are skipped; the probe loop keeps
    /// re-checking them, so they rejoin once they recover.
    pub async fn candidates(&self) -> Vec<String> {
        let endpoints = self.endpoints.read().await;

        let mut ordered: Vec<String> = endpoints
            .iter()
            .filter(|e| e.health == HealthState::Healthy)
            .map(|e| e.url.clone())
            .collect();

        let mut degraded: Vec<&BackendEndpoint> = endpoints
            .iter()
            .filter(|e| e.health == HealthState::Degraded)
            .collect();
        degraded.sort_by_key(|e| e.last_failure_at);
        ordered.extend(degraded.into_iter().map(|e| e.url.clone()));

        ordered.extend(self.fallback_urls.iter().cloned());
        ordered
    }

    /// All configured endpoint URLs, regardless of health
    pub async fn urls(&self) -> Vec<String> {
        self.endpoints.read().await.iter().map(|e| e.url.clone()).collect()
    }

    /// Current health of one endpoint
    pub async fn state_of(&self, url: &str) -> Option<HealthState> {
        self.endpoints
            .read()
            .await
            .iter()
            .find(|e| e.url == url)
            .map(|e| e.health)
    }

    /// Snapshot for the operational health endpoint
    pub async fn snapshot(&self) -> Vec<BackendEndpoint> {
        self.endpoints.read().await.clone()
    }
}
