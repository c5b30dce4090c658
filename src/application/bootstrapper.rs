//! Process startup: logging, database, housekeeping, then the HTTP listener.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, CONFIG};
use crate::db;
use crate::endpoints;
use crate::services::scheduler;
use crate::state::AppState;

pub async fn run() -> anyhow::Result<()> {
    install_tracing(&CONFIG);

    let fleet = &CONFIG.fleet;
    tracing::info!(
        version = CONFIG.build.version,
        commit = %CONFIG.build.commit_hash,
        latest_agent_version = %fleet.latest_agent_version,
        lease_timeout_secs = fleet.lease_timeout_secs,
        command_batch_size = fleet.command_batch_size,
        "Starting opnfleet"
    );

    let conn = db::connect().await?;
    scheduler::start_scheduler(Arc::new(conn.clone()), fleet.retention_days);

    let app = endpoints::create_router(AppState::new(conn, fleet.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(cors(&CONFIG.server.allowed_origins));

    serve(app).await
}

/// `RUST_LOG` wins over the configured level when set
fn install_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("opnfleet={},tower_http=info", config.log_level))
    });
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format.as_str() {
        "json" => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        _ => registry
            .with(tracing_subscriber::fmt::layer().with_ansi(false))
            .init(),
    }
}

fn cors(allowed_origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Skipping invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        base.allow_origin(Any)
    } else {
        base.allow_origin(origins)
    }
}

async fn serve(app: Router) -> anyhow::Result<()> {
    let ip: IpAddr = CONFIG.server.host.parse().unwrap_or_else(|_| {
        tracing::warn!(host = %CONFIG.server.host, "Invalid listen host, using 0.0.0.0");
        IpAddr::V4(Ipv4Addr::UNSPECIFIED)
    });
    let addr = SocketAddr::new(ip, CONFIG.server.port);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Accepting agent check-ins");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested, draining connections");
}
