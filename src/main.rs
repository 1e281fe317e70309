//! FastCGI Gateway Multiplexing Core
//!
//! The request-multiplexing core of a FastCGI gateway: a fixed pool of
//! worker tasks proxies concurrent client requests to upstream FastCGI
//! backends with no cross-worker contention in steady state.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────────┐
//!                  │               GATEWAY CORE                       │
//!                  │                                                  │
//!   GatewayConfig  │  ┌──────────────┐     ┌────────────────────┐     │
//!   ───────────────┼─▶│   config     │────▶│  ContextRegistry   │     │
//!                  │  │ load+validate│     │  (built once)      │     │
//!                  │  └──────────────┘     └─────────┬──────────┘     │
//!                  │                                 │ one row +      │
//!                  │                                 │ one id each    │
//!                  │          ┌──────────────────────┼──────────┐     │
//!                  │          ▼                      ▼          ▼     │
//!                  │  ┌──────────────┐      ┌──────────────┐   ...    │
//!                  │  │  Context w0  │      │  Context w1  │          │
//!                  │  │ slots | row  │      │ slots | row  │          │
//!                  │  │    chunks    │      │    chunks    │          │
//!                  │  └──────┬───────┘      └──────┬───────┘          │
//!                  └─────────┼─────────────────────┼──────────────────┘
//!                            ▼                     ▼
//!                     FastCGI backends      FastCGI backends
//!                    (one conn/location)   (one conn/location)
//! ```
//!
//! The HTTP accept loop, request parsing and FastCGI record framing are
//! host-server collaborators layered around this core.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fastcgi_gateway::config::loader::load_config;
use fastcgi_gateway::{ContextRegistry, GatewayConfig, Shutdown, Worker};

#[derive(Parser, Debug)]
#[command(name = "fastcgi-gateway", about = "FastCGI gateway multiplexing core")]
struct Args {
    /// Path to the TOML configuration file. Defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    // Initialize tracing subscriber; RUST_LOG overrides the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(config.observability.env_filter_directive())
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("fastcgi-gateway v0.1.0 starting");

    tracing::info!(
        workers = config.workers,
        request_capacity = config.request_capacity,
        locations = config.locations.len(),
        "Configuration loaded"
    );

    let registry = Arc::new(ContextRegistry::init(&config)?);
    let shutdown = Shutdown::new();

    let mut tasks = Vec::with_capacity(config.workers as usize);
    for _ in 0..config.workers {
        let registry = Arc::clone(&registry);
        let rx = shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            match Worker::attach(&registry) {
                Ok(worker) => worker.run(rx).await,
                Err(e) => tracing::error!(error = %e, "worker failed to attach"),
            }
        }));
    }

    shutdown.trigger_on_ctrl_c().await;

    for task in tasks {
        let _ = task.await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
