use std::net::SocketAddr;

use clap::Parser;
use pulse_core::config::PulseConfig;
use tracing::{info, warn};

mod app;
mod auth;
mod http;
mod shutdown;

#[derive(Debug, Parser)]
#[command(name = "pulse-gateway", version, about = "Tenant-scoped real-time event streaming")]
struct Cli {
    /// Config file; defaults to ~/.pulse/pulse.toml
    #[arg(long, env = "PULSE_CONFIG")]
    config: Option<String>,

    /// Override `gateway.bind`
    #[arg(long)]
    bind: Option<String>,

    /// Override `gateway.port`
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pulse_gateway=info,pulse_stream=info,tower_http=debug".into()),
        )
        .init();

    let cli = Cli::parse();

    // load config: --config / PULSE_CONFIG > ~/.pulse/pulse.toml
    let mut config = PulseConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!(code = e.code(), "Config load failed ({}), using defaults", e);
        PulseConfig::default()
    });
    if let Some(bind) = cli.bind {
        config.gateway.bind = bind;
    }
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    let grace = config.stream.shutdown_timeout();

    let state = app::AppState::new(config);
    if state.gate.is_closed() {
        warn!("stream.allowed_origins admits nothing, every stream upgrade will be rejected");
    } else if state.gate.allows_any() {
        warn!("stream.allowed_origins contains \"*\", any origin may connect (development only)");
    }
    if state.tenants.is_empty() {
        warn!("auth.tenants has no usable entries, no request can be attributed to a tenant");
    }
    let hub = state.hub.clone();
    let router = app::build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Pulse gateway listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown::drain_on_signal(hub, grace))
        .await?;

    info!("Pulse gateway stopped");
    Ok(())
}
