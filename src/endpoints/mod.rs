pub mod agent;
pub mod audit;
pub mod commands;
pub mod firewalls;

use axum::{routing::get, Json, Router};
use utoipa::OpenApi;

use crate::config::CONFIG;
use crate::error::AppError;
use crate::state::AppState;

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/system/version", get(get_version))
        .route("/api/openapi.json", get(openapi_json))
        .nest("/api", api_routes(state))
        .fallback(not_found)
}

/// Agent, dashboard and collaborator routes under /api/*
fn api_routes(state: AppState) -> Router {
    Router::new()
        .nest("/agent", agent::agent_routes(state.clone()))
        .nest("/firewalls", firewalls::firewalls_routes(state.clone()))
        .nest("/commands", commands::commands_routes(state.clone()))
        .nest("/audit", audit::audit_routes(state))
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Version info endpoint
async fn get_version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "version": CONFIG.build.version,
        "commit_hash": CONFIG.build.commit_hash,
        "build_time": CONFIG.build.build_time,
        "latest_agent_version": CONFIG.fleet.latest_agent_version,
    }))
}

#[derive(OpenApi)]
#[openapi(
    info(title = "opnfleet", description = "Firewall fleet check-in and dispatch API"),
    components(schemas(
        crate::schemas::CheckinResponse,
        crate::schemas::QueuedCommand,
        crate::schemas::PendingProxyRequest,
        crate::schemas::ResultAck,
        crate::schemas::CreateFirewall,
        crate::schemas::FirewallResponse,
        crate::schemas::EnqueueCommand,
        crate::schemas::EnqueueProxyRequest,
        crate::models::firewall::LifecycleStatus,
        crate::models::firewall_command::Model,
        crate::models::firewall_command::CommandStatus,
        crate::models::bandwidth_test::Model,
        crate::models::proxy_request::Model,
        crate::services::audit::AuditLogResponse,
    ))
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// JSON 404 for unknown paths
async fn not_found() -> AppError {
    AppError::NotFound("No such endpoint".to_string())
}

/// JSON 405 for a known path called with the wrong method
pub(crate) async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed("Method not allowed".to_string())
}
