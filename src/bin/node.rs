// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{anyhow, Result};
use clap::Parser;
use fabstir_llm_relay::{
    api::{start_node_server, NodeState},
    config::NodeConfig,
    crypto::CryptoManager,
    inference::{EchoEngine, HttpEngineClient, InferenceEngine},
    version,
};
use std::{env, net::SocketAddr, path::PathBuf, sync::Arc};

/// Backend envelope endpoint: decrypts requests, calls the local inference
/// engine, re-encrypts responses
#[derive(Parser, Debug)]
#[command(name = "fabstir-llm-relay-node")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, env = "NODE_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address override
    #[arg(long, env = "NODE_LISTEN_ADDR")]
    listen: Option<String>,

    /// Local inference engine URL override
    #[arg(long, env = "ENGINE_URL")]
    engine_url: Option<String>,

    /// Answer with a deterministic echo instead of calling an engine
    #[arg(long)]
    echo_engine: bool,
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
        Some(path) => NodeConfig::load(path)?,
        None => NodeConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }
    if let Some(engine_url) = args.engine_url {
        config.engine_url = engine_url;
    }

    tracing::info!("{}", version::get_version_string());

    // One server key pair per process lifetime; rotation replaces it wholesale
    let manager = Arc::new(CryptoManager::new().map_err(|e| anyhow!("key generation: {}", e))?);
    tracing::info!(
        owner = %config.key_owner,
        fingerprint = %manager.fingerprint(),
        "server key pair generated"
    );

    let engine: Arc<dyn InferenceEngine> = if args.echo_engine {
        tracing::warn!("echo engine enabled; completions are not real inference");
        Arc::new(EchoEngine)
    } else {
        Arc::new(HttpEngineClient::new(
            config.engine_url.clone(),
            config.request_timeout(),
        )?)
    };

    let addr: SocketAddr = config.listen_addr.parse()?;
    let state = NodeState::new(manager, engine, config.key_owner.clone());
    start_node_server(addr, state)
        .await
        .map_err(|e| anyhow!("node server failed: {}", e))
}
