// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{anyhow, Result};
use clap::Parser;
use fabstir_llm_relay::{
    api::{start_relay_server, RelayState},
    config::RelayConfig,
    relay::{EndpointRegistry, HealthProber, HttpTransport, RateLimiter, RelayDispatcher, RetryPolicy},
    version,
};
use std::{env, net::SocketAddr, path::PathBuf, sync::Arc};

/// Encrypted envelope relay for LLM inference backends
#[derive(Parser, Debug)]
#[command(name = "fabstir-llm-relay")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address override
    #[arg(long, env = "RELAY_LISTEN_ADDR")]
    listen: Option<String>,

    /// Backend URL(s), comma separated (overrides the config file)
    #[arg(long = "backend", env = "RELAY_BACKEND_URLS", value_delimiter = ',')]
    backends: Vec<String>,

    /// Fallback URL(s), comma separated (overrides the config file)
    #[arg(long = "fallback", env = "RELAY_FALLBACK_URLS", value_delimiter = ',')]
    fallbacks: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => RelayConfig::load(path)?,
        None => RelayConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }
    if !args.backends.is_empty() {
        config.backend_urls = args.backends;
    }
    if !args.fallbacks.is_empty() {
        config.fallback_urls = args.fallbacks;
    }
    config.validate()?;

    tracing::info!("{}", version::get_version_string());
    tracing::info!(
        backends = config.backend_urls.len(),
        fallbacks = config.fallback_urls.len(),
        timeout_secs = config.request_timeout_secs,
        "relay configuration loaded"
    );

    // Shared state: endpoint registry and rate-limit table, injected into
    // the dispatcher rather than living as process globals
    let registry = Arc::new(EndpointRegistry::new(
        config.backend_urls.clone(),
        config.fallback_urls.clone(),
    ));
    let rate_limiter =
        RateLimiter::with_window(config.rate_limit_per_window, config.rate_limit_window());
    let transport = Arc::new(HttpTransport::new(config.request_timeout())?);
    let policy = RetryPolicy {
        max_attempts: config.max_attempts,
        backoff_base: config.backoff_base(),
        backoff_cap: config.backoff_cap(),
    };
    let dispatcher = Arc::new(RelayDispatcher::new(
        registry.clone(),
        rate_limiter,
        transport,
        policy,
    ));

    // Probe loop runs independently of request handling
    let prober = HealthProber::new(
        registry.clone(),
        config.health_check_interval(),
        config.request_timeout(),
    )?;
    let probe_task = prober.spawn();

    let addr: SocketAddr = config.listen_addr.parse()?;
    let state = RelayState::new(dispatcher, registry, config.rate_limit_window_secs);
    let served = start_relay_server(addr, state).await;

    probe_task.abort();
    served.map_err(|e| anyhow!("relay server failed: {}", e))
}
