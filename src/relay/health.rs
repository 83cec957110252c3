// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Background Health Probing
//!
//! Periodic probe task independent of request handling. Probes every
//! configured endpoint's `/health` route and feeds outcomes into the shared
//! registry; it is the only writer of endpoint health state. Unreachable
//! endpoints keep being probed so they can rejoin once they recover.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::debug;

use super::registry::EndpointRegistry;

/// Periodic prober over the shared endpoint registry
pub struct HealthProber {
    registry: Arc<EndpointRegistry>,
    http: reqwest::Client,
    interval: Duration,
}

impl HealthProber {
    pub fn new(
        registry: Arc<EndpointRegistry>,
        interval: Duration,
        probe_timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            registry,
            http: reqwest::Client::builder().timeout(probe_timeout).build()?,
            interval,
        })
    }

    /// Probe every registered endpoint once
    pub async fn probe_all(&self) {
        for url in self.registry.urls().await {
            let healthy = self.probe(&url).await;
            debug!(endpoint = %url, healthy, "probe completed");
            if healthy {
                self.registry.record_success(&url).await;
            } else {
                self.registry.record_failure(&url).await;
            }
        }
    }

    async fn probe(&self, url: &str) -> bool {
        let probe_url = format!("{}/health", url.trim_end_matches('/'));
        match self.http.get(&probe_url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Run the probe loop until the task is aborted
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                ticker.tick().await;
                self.probe_all().await;
            }
        })
    }
}
