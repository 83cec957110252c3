// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Service Configuration
//!
//! TOML-backed configuration for the relay and node daemons. Every field has
//! a serde default so a partial file (or none at all) yields a runnable
//! configuration; the binaries layer CLI/env overrides on top.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

fn default_relay_listen() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_node_listen() -> String {
    "127.0.0.1:9090".to_string()
}

fn default_engine_url() -> String {
    "http://127.0.0.1:9191".to_string()
}

fn default_key_owner() -> String {
    "server".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_rate_limit_per_window() -> u32 {
    60
}

fn default_rate_limit_window_secs() -> u64 {
    60
}

fn default_health_check_interval_secs() -> u64 {
    30
}

fn default_backoff_base_ms() -> u64 {
    100
}

fn default_backoff_cap_ms() -> u64 {
    2_000
}

/// Relay daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_relay_listen")]
    pub listen_addr: String,
    /// Primary backends, tried in order
    #[serde(default)]
    pub backend_urls: Vec<String>,
    /// Last-resort URLs (e.g. a tunnel address), tried in order
    #[serde(default)]
    pub fallback_urls: Vec<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_rate_limit_per_window")]
    pub rate_limit_per_window: u32,
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            listen_addr: default_relay_listen(),
            backend_urls: vec![],
            fallback_urls: vec![],
            request_timeout_secs: default_request_timeout_secs(),
            max_attempts: default_max_attempts(),
            rate_limit_per_window: default_rate_limit_per_window(),
            rate_limit_window_secs: default_rate_limit_window_secs(),
            health_check_interval_secs: default_health_check_interval_secs(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
        }
    }
}

impl RelayConfig {
    /// Parse a TOML file into a relay configuration
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: RelayConfig = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the dispatcher cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.backend_urls.is_empty() && self.fallback_urls.is_empty() {
            return Err(anyhow!("at least one backend or fallback URL is required"));
        }
        if self.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be at least 1"));
        }
        if self.rate_limit_per_window == 0 {
            return Err(anyhow!("rate_limit_per_window must be at least 1"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_cap(&self) -> Duration {
        Duration::from_millis(self.backoff_cap_ms)
    }
}

/// Backend node daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_node_listen")]
    pub listen_addr: String,
    /// Local inference engine endpoint (plain HTTP, same host)
    #[serde(default = "default_engine_url")]
    pub engine_url: String,
    /// Identity advertised with the public key record
    #[serde(default = "default_key_owner")]
    pub key_owner: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            listen_addr: default_node_listen(),
            engine_url: default_engine_url(),
            key_owner: default_key_owner(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl NodeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
