//! Operator-facing fleet routes: enrollment, command queueing, update
//! requests and proxy requests.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use super::method_not_allowed;
use crate::error::Result;
use crate::models::audit_log::{AuditAction, ResourceType};
use crate::models::firewall_command::{self, CommandChannel};
use crate::models::{bandwidth_test, proxy_request};
use crate::schemas::{
    CommandListQuery, CreateFirewall, EnqueueCommand, EnqueueProxyRequest, FirewallResponse,
};
use crate::services::audit::{AuditEvent, AuditService};
use crate::services::{fleet, ledger, orchestrator, relay, telemetry};
use crate::state::AppState;

const DEFAULT_LIST_LIMIT: u64 = 50;

/// Create firewall routes
pub fn firewalls_routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/",
            get(list_firewalls)
                .post(create_firewall)
                .fallback(method_not_allowed),
        )
        .route("/{id}", get(get_firewall).fallback(method_not_allowed))
        .route(
            "/{id}/update",
            post(request_update).fallback(method_not_allowed),
        )
        .route(
            "/{id}/commands",
            get(list_commands)
                .post(enqueue_command)
                .fallback(method_not_allowed),
        )
        .route(
            "/{id}/speedtest",
            post(run_speedtest).fallback(method_not_allowed),
        )
        .route(
            "/{id}/bandwidth-tests",
            get(list_bandwidth_tests).fallback(method_not_allowed),
        )
        .route(
            "/{id}/proxy-requests",
            post(enqueue_proxy_request).fallback(method_not_allowed),
        )
        .with_state(state)
}

async fn list_firewalls(State(state): State<AppState>) -> Result<Json<Vec<FirewallResponse>>> {
    let now = Utc::now();
    let threshold = state.fleet.offline_threshold();
    let firewalls = fleet::list_firewalls(&state.db)
        .await?
        .into_iter()
        .map(|fw| fleet::to_response(fw, now, threshold))
        .collect();
    Ok(Json(firewalls))
}

async fn create_firewall(
    State(state): State<AppState>,
    Json(request): Json<CreateFirewall>,
) -> Result<(StatusCode, Json<FirewallResponse>)> {
    let firewall = fleet::enroll(&state.db, &state.audit, request).await?;
    let response = fleet::to_response(firewall, Utc::now(), state.fleet.offline_threshold());
    Ok((StatusCode::CREATED, Json(response)))
}

async fn get_firewall(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<FirewallResponse>> {
    let firewall = fleet::get_firewall(&state.db, id).await?;
    Ok(Json(fleet::to_response(
        firewall,
        Utc::now(),
        state.fleet.offline_threshold(),
    )))
}

/// Ask the firewall to install firmware updates on its next check-in
async fn request_update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<FirewallResponse>> {
    let firewall = orchestrator::request_system_update(&state.db, &state.audit, id).await?;
    Ok(Json(fleet::to_response(
        firewall,
        Utc::now(),
        state.fleet.offline_threshold(),
    )))
}

async fn list_commands(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<CommandListQuery>,
) -> Result<Json<Vec<firewall_command::Model>>> {
    fleet::get_firewall(&state.db, id).await?;
    let commands =
        ledger::list_commands(&state.db, id, query.limit.unwrap_or(DEFAULT_LIST_LIMIT)).await?;
    Ok(Json(commands))
}

async fn enqueue_command(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<EnqueueCommand>,
) -> Result<(StatusCode, Json<firewall_command::Model>)> {
    let channel = if request.update_channel {
        CommandChannel::Update
    } else {
        CommandChannel::Primary
    };
    let command = ledger::enqueue_command(
        &state.db,
        id,
        &request.command,
        request.description.as_deref(),
        channel,
    )
    .await?;
    audit_enqueued(&state.audit, &command).await;
    Ok((StatusCode::CREATED, Json(command)))
}

/// Queue the bandwidth test command
async fn run_speedtest(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<firewall_command::Model>)> {
    let command = ledger::enqueue_command(
        &state.db,
        id,
        &state.fleet.speedtest_command,
        Some("Bandwidth test"),
        CommandChannel::Primary,
    )
    .await?;
    audit_enqueued(&state.audit, &command).await;
    Ok((StatusCode::CREATED, Json(command)))
}

async fn list_bandwidth_tests(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<CommandListQuery>,
) -> Result<Json<Vec<bandwidth_test::Model>>> {
    fleet::get_firewall(&state.db, id).await?;
    let tests =
        telemetry::list_bandwidth_tests(&state.db, id, query.limit.unwrap_or(DEFAULT_LIST_LIMIT))
            .await?;
    Ok(Json(tests))
}

async fn enqueue_proxy_request(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<EnqueueProxyRequest>,
) -> Result<(StatusCode, Json<proxy_request::Model>)> {
    let queued = relay::enqueue_proxy_request(&state.db, id, request).await?;
    let event = AuditEvent::new(AuditAction::ProxyRequestQueued, ResourceType::ProxyRequest)
        .resource(queued.id)
        .firewall(id)
        .details(serde_json::json!({
            "client_id": queued.client_id,
            "method": queued.method,
            "path": queued.path,
        }));
    state.audit.record(event).await;
    Ok((StatusCode::CREATED, Json(queued)))
}

async fn audit_enqueued(audit: &AuditService, command: &firewall_command::Model) {
    let event = AuditEvent::new(AuditAction::CommandEnqueued, ResourceType::Command)
        .resource(command.id)
        .firewall(command.firewall_id)
        .details(serde_json::json!({
            "channel": command.channel(),
            "description": command.description,
        }));
    audit.record(event).await;
}
