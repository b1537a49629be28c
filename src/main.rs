//! Stealth forwarding proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌───────────────────────────────────────────────────────┐
//!                        │                    STEALTH PROXY                      │
//!   Client Request       │  ┌────────┐   ┌──────────┐   ┌─────────┐   ┌────────┐ │
//!   ─────────────────────┼─▶│  http  │──▶│ security │──▶│ target  │──▶│ cache  │ │
//!                        │  │ server │   │auth/limit│   │ resolve │   │ lookup │ │
//!                        │  └────────┘   └──────────┘   └─────────┘   └───┬────┘ │
//!                        │                                           miss │      │
//!                        │                                                ▼      │
//!   Client Response      │  ┌────────┐   ┌──────────┐   ┌─────────┐   ┌────────┐ │
//!   ◀────────────────────┼──│response│◀──│ rewrite  │◀──│ headers │◀──│upstream│◀┼── Origin
//!                        │  │ + CORS │   │ html/css │   │sanitize │   │ fetch  │ │
//!                        │  └────────┘   └──────────┘   └─────────┘   └────────┘ │
//!                        └───────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use stealth_proxy::config::loader::ENV_API_KEY;
use stealth_proxy::config::load_config;
use stealth_proxy::observability::{logging, metrics};
use stealth_proxy::{HttpServer, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "stealth-proxy")]
#[command(about = "Forwarding proxy that rewrites pages to stay behind it", long_about = None)]
struct Args {
    /// TOML configuration file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overriding `listener.bind_address`
    #[arg(short, long)]
    bind: Option<String>,

    /// Shared secret required in `x-api-key`
    #[arg(long, env = ENV_API_KEY, hide_env_values = true)]
    api_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref(), |config| {
        if let Some(bind) = args.bind {
            config.listener.bind_address = bind;
        }
        if let Some(key) = args.api_key {
            config.auth.api_key = Some(key);
        }
    })?;

    logging::init_tracing(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "stealth-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        api_key = config.auth.api_key.is_some(),
        rate_limit_window_ms = config.rate_limit.window_ms,
        rate_limit_max = config.rate_limit.max_requests,
        cache_ttl_secs = config.cache.ttl_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    shutdown.trigger_on_ctrl_c();

    let server = HttpServer::new(config)?;
    server.run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
