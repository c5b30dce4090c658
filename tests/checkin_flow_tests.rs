//! Check-in handler integration tests
//!
//! Drives `CheckinService::handle` with controlled clocks through the
//! protocol scenarios: FIFO delivery, lease reclaim, agent remediation,
//! firmware update convergence, result submission and step isolation.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use serde_json::{json, Value};

mod common;
use common::{build_app_state, create_test_db, create_test_firewall, insert_command, update_firewall};

use opnfleet::error::AppError;
use opnfleet::models::firewall::LifecycleStatus;
use opnfleet::models::firewall_command::{CommandChannel, CommandStatus};
use opnfleet::models::prelude::*;
use opnfleet::models::{audit_log, bandwidth_test, telemetry_sample};
use opnfleet::schemas::{AgentReply, CheckinRequest, CheckinResponse, ResultAck, UpdateReport};
use opnfleet::services::orchestrator::{self, UpdateOrchestrator};
use opnfleet::services::{fleet, ledger};
use opnfleet::state::AppState;

async fn poll(state: &AppState, body: Value, now: DateTime<Utc>) -> CheckinResponse {
    let req: CheckinRequest = serde_json::from_value(body).unwrap();
    match state.checkin.handle(req, now).await.unwrap() {
        AgentReply::Checkin(response) => *response,
        other => panic!("Expected a check-in response, got {:?}", other),
    }
}

async fn submit(state: &AppState, body: Value, now: DateTime<Utc>) -> ResultAck {
    let req: CheckinRequest = serde_json::from_value(body).unwrap();
    match state.checkin.handle(req, now).await.unwrap() {
        AgentReply::Result(ack) => ack,
        other => panic!("Expected a result acknowledgement, got {:?}", other),
    }
}

async fn handle_err(state: &AppState, body: Value) -> AppError {
    let req: CheckinRequest = serde_json::from_value(body).unwrap();
    state.checkin.handle(req, Utc::now()).await.unwrap_err()
}

// ============================================================================
// Command delivery
// ============================================================================

#[tokio::test]
async fn test_pending_commands_delivered_in_creation_order() {
    let db = create_test_db().await;
    let state = build_app_state(db.clone());
    let fw = create_test_firewall(&db, "edge-42", Some("hw-42")).await;
    let t0 = Utc::now();

    let cmd1 = insert_command(&db, fw.id, "cmd1", CommandChannel::Primary, t0 - chrono::Duration::seconds(2)).await;
    let cmd2 = insert_command(&db, fw.id, "cmd2", CommandChannel::Primary, t0 - chrono::Duration::seconds(1)).await;

    let response = poll(
        &state,
        json!({ "firewall_id": fw.id, "agent_version": "3.0.0" }),
        t0,
    )
    .await;

    let ids: Vec<i64> = response.queued_commands.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![cmd1.id, cmd2.id]);
    assert_eq!(response.queued_commands[0].command, "cmd1");

    for id in ids {
        assert_eq!(ledger::get_command(&db, id).await.unwrap().status, CommandStatus::Sent);
    }
}

#[tokio::test]
async fn test_batch_cap_limits_delivery() {
    let db = create_test_db().await;
    let state = build_app_state(db.clone());
    let fw = create_test_firewall(&db, "edge-01", None).await;
    let t0 = Utc::now();
    for i in 0..8 {
        insert_command(&db, fw.id, &format!("echo {}", i), CommandChannel::Primary, t0 - chrono::Duration::seconds(20 - i)).await;
    }

    let first = poll(&state, json!({ "firewall_id": fw.id, "agent_version": "3.0.0" }), t0).await;
    assert_eq!(first.queued_commands.len(), 5);

    let second = poll(&state, json!({ "firewall_id": fw.id, "agent_version": "3.0.0" }), t0).await;
    assert_eq!(second.queued_commands.len(), 3);
}

#[tokio::test]
async fn test_stale_lease_is_redelivered_after_timeout() {
    let db = create_test_db().await;
    let state = build_app_state(db.clone());
    let fw = create_test_firewall(&db, "edge-01", None).await;
    let t0 = Utc::now();
    let cmd1 = insert_command(&db, fw.id, "cmd1", CommandChannel::Primary, t0).await;

    let body = json!({ "firewall_id": fw.id, "agent_version": "3.0.0" });

    let first = poll(&state, body.clone(), t0).await;
    assert_eq!(first.queued_commands.len(), 1);

    // Still within the lease: not handed out again
    let within = poll(&state, body.clone(), t0 + chrono::Duration::minutes(5)).await;
    assert!(within.queued_commands.is_empty());

    let after = poll(&state, body, t0 + chrono::Duration::minutes(11)).await;
    assert_eq!(after.queued_commands.len(), 1);
    assert_eq!(after.queued_commands[0].id, cmd1.id);

    let reclaimed = Firewall::find_by_id(fw.id).one(&db).await.unwrap().unwrap();
    assert!(reclaimed.last_checkin.is_some());
    let audit_entries = AuditLog::find()
        .filter(audit_log::Column::Action.eq("commands_reclaimed"))
        .count(&db)
        .await
        .unwrap();
    assert_eq!(audit_entries, 1);
}

#[tokio::test]
async fn test_update_agent_only_receives_update_commands() {
    let db = create_test_db().await;
    let state = build_app_state(db.clone());
    let fw = create_test_firewall(&db, "edge-01", Some("hw-1")).await;
    let t0 = Utc::now();
    insert_command(&db, fw.id, "uptime", CommandChannel::Primary, t0).await;
    let update = insert_command(&db, fw.id, "pkg upgrade -y", CommandChannel::Update, t0).await;

    let response = poll(
        &state,
        json!({ "hardware_id": "hw-1", "agent_version": "1.0", "agent_type": "update" }),
        t0,
    )
    .await;

    assert_eq!(response.checkin_interval, 300);
    assert_eq!(response.queued_commands.len(), 1);
    assert_eq!(response.queued_commands[0].id, update.id);
    // No update decisions on the update channel
    assert_eq!(response.agent_update_available, None);
    assert_eq!(response.opnsense_update_requested, None);

    let stored = Firewall::find_by_id(fw.id).one(&db).await.unwrap().unwrap();
    assert_eq!(stored.update_agent_version.as_deref(), Some("1.0"));
    assert!(stored.update_agent_last_checkin.is_some());
    assert!(stored.last_checkin.is_none(), "Primary liveness must not change");
}

#[tokio::test]
async fn test_primary_interval() {
    let db = create_test_db().await;
    let state = build_app_state(db.clone());
    let fw = create_test_firewall(&db, "edge-01", None).await;

    let response = poll(&state, json!({ "firewall_id": fw.id, "agent_version": "3.0.0" }), Utc::now()).await;
    assert!(response.success);
    assert_eq!(response.checkin_interval, 120);
    assert_eq!(response.firewall_id, fw.id);
}

// ============================================================================
// Identity and validation
// ============================================================================

#[tokio::test]
async fn test_unknown_id_falls_back_to_hardware_id() {
    let db = create_test_db().await;
    let state = build_app_state(db.clone());
    let fw = create_test_firewall(&db, "edge-01", Some("hw-abc")).await;

    let response = poll(
        &state,
        json!({ "firewall_id": 9999, "hardware_id": "hw-abc", "agent_version": "3.0.0" }),
        Utc::now(),
    )
    .await;
    assert_eq!(response.firewall_id, fw.id);

    let reidentified = AuditLog::find()
        .filter(audit_log::Column::Action.eq("firewall_reidentified"))
        .count(&db)
        .await
        .unwrap();
    assert_eq!(reidentified, 1);
}

#[tokio::test]
async fn test_zero_id_uses_hardware_id() {
    let db = create_test_db().await;
    let state = build_app_state(db.clone());
    let fw = create_test_firewall(&db, "edge-01", Some("hw-abc")).await;

    let response = poll(
        &state,
        json!({ "firewall_id": 0, "hardware_id": "hw-abc", "agent_version": "3.0.0" }),
        Utc::now(),
    )
    .await;
    assert_eq!(response.firewall_id, fw.id);
}

#[tokio::test]
async fn test_unresolvable_firewall_is_not_found() {
    let db = create_test_db().await;
    let state = build_app_state(db.clone());
    create_test_firewall(&db, "edge-01", Some("hw-abc")).await;

    let err = handle_err(&state, json!({ "firewall_id": 77, "agent_version": "3.0.0" })).await;
    assert!(matches!(err, AppError::NotFound(_)));

    let err = handle_err(&state, json!({ "hardware_id": "hw-other", "agent_version": "3.0.0" })).await;
    assert!(matches!(err, AppError::NotFound(_)));

    let err = handle_err(&state, json!({ "agent_version": "3.0.0" })).await;
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_missing_agent_version_is_rejected() {
    let db = create_test_db().await;
    let state = build_app_state(db.clone());
    let fw = create_test_firewall(&db, "edge-01", None).await;

    let err = handle_err(&state, json!({ "firewall_id": fw.id })).await;
    assert!(matches!(err, AppError::BadRequest(_)));
}

// ============================================================================
// Telemetry
// ============================================================================

#[tokio::test]
async fn test_omitted_fields_keep_stored_values() {
    let db = create_test_db().await;
    let state = build_app_state(db.clone());
    let fw = create_test_firewall(&db, "edge-01", None).await;
    update_firewall(&db, &fw, |fw| {
        fw.lan_ip = Set(Some("192.168.1.1".to_string()));
        fw.wan_ip = Set(Some("198.51.100.1".to_string()));
    })
    .await;

    poll(
        &state,
        json!({
            "firewall_id": fw.id,
            "hardware_id": "hw-new",
            "agent_version": "3.0.0",
            "wan_ip": "203.0.113.7",
            "uptime": "3 days"
        }),
        Utc::now(),
    )
    .await;

    let stored = Firewall::find_by_id(fw.id).one(&db).await.unwrap().unwrap();
    assert_eq!(stored.wan_ip.as_deref(), Some("203.0.113.7"));
    assert_eq!(stored.lan_ip.as_deref(), Some("192.168.1.1"));
    assert_eq!(stored.uptime.as_deref(), Some("3 days"));
    assert_eq!(stored.agent_version.as_deref(), Some("3.0.0"));
    assert_eq!(stored.hardware_id.as_deref(), Some("hw-new"), "Missing fingerprint is adopted");
    assert!(stored.last_checkin.is_some());
}

#[tokio::test]
async fn test_stats_append_telemetry_sample() {
    let db = create_test_db().await;
    let state = build_app_state(db.clone());
    let fw = create_test_firewall(&db, "edge-01", None).await;

    poll(
        &state,
        json!({
            "firewall_id": fw.id,
            "agent_version": "3.0.0",
            "traffic_stats": { "interface": "igb0", "bytes_in": "1024", "bytes_out": 2048 },
            "system_stats": { "cpu_usage": "12.5%", "memory_percent": 40 }
        }),
        Utc::now(),
    )
    .await;
    poll(&state, json!({ "firewall_id": fw.id, "agent_version": "3.0.0" }), Utc::now()).await;

    let samples = TelemetrySample::find()
        .filter(telemetry_sample::Column::FirewallId.eq(fw.id))
        .all(&db)
        .await
        .unwrap();
    assert_eq!(samples.len(), 1, "Only check-ins carrying stats add samples");
    let sample = &samples[0];
    assert_eq!(sample.interface.as_deref(), Some("igb0"));
    assert_eq!(sample.bytes_in, Some(1024));
    assert_eq!(sample.cpu_percent, Some(12.5));
    assert_eq!(sample.memory_percent, Some(40.0));
    assert_eq!(sample.latency_ms, None);
}

// ============================================================================
// Agent binary updates
// ============================================================================

async fn agent_update_for(version: &str) -> CheckinResponse {
    let db = create_test_db().await;
    let state = build_app_state(db.clone());
    let fw = create_test_firewall(&db, "edge-01", None).await;
    poll(&state, json!({ "firewall_id": fw.id, "agent_version": version }), Utc::now()).await
}

#[tokio::test]
async fn test_known_bad_release_gets_self_heal() {
    let response = agent_update_for("2.1.2").await;

    assert_eq!(response.agent_update_available, Some(true));
    assert_eq!(response.latest_agent_version.as_deref(), Some("3.0.0"));
    let command = response.agent_update_command.unwrap();
    assert!(command.contains("agent_selfheal_2.1.2.sh"), "got {}", command);
    assert!(command.starts_with("fetch -o /tmp/opnfleet_selfheal.sh https://fleet.test/"));
}

#[tokio::test]
async fn test_legacy_agent_gets_package_reinstall() {
    let response = agent_update_for("v1.4.2").await;

    assert_eq!(response.agent_update_available, Some(true));
    let command = response.agent_update_command.unwrap();
    assert!(command.contains("pkg add -f https://fleet.test/downloads/opnfleet-agent-3.0.0.pkg"));
}

#[tokio::test]
async fn test_other_outdated_agent_gets_standard_replace() {
    let response = agent_update_for("2.9.0").await;

    assert_eq!(response.agent_update_available, Some(true));
    assert_eq!(
        response.agent_update_url.as_deref(),
        Some("https://fleet.test/downloads/opnfleet_agent_v3.0.0.sh")
    );
    let command = response.agent_update_command.unwrap();
    assert!(!command.contains("selfheal"));
    assert!(command.contains("service opnfleet_agent restart"));
}

#[tokio::test]
async fn test_current_agent_needs_no_update() {
    let response = agent_update_for("3.0.0").await;
    assert_eq!(response.agent_update_available, Some(false));
    assert!(response.agent_update_command.is_none());

    let newer = agent_update_for("3.1.0").await;
    assert_eq!(newer.agent_update_available, Some(false));
}

// ============================================================================
// Firmware updates
// ============================================================================

#[tokio::test]
async fn test_updating_firewall_converges_when_nothing_left() {
    let db = create_test_db().await;
    let state = build_app_state(db.clone());
    let fw = create_test_firewall(&db, "edge-01", None).await;
    update_firewall(&db, &fw, |fw| {
        fw.lifecycle_status = Set(LifecycleStatus::Updating);
        fw.current_version = Set(Some("24.7".to_string()));
    })
    .await;

    let response = poll(
        &state,
        json!({
            "firewall_id": fw.id,
            "agent_version": "3.0.0",
            "opnsense_updates": { "updates_available": 0, "current_version": "24.7.1" }
        }),
        Utc::now(),
    )
    .await;

    assert_eq!(response.update_check_performed, Some(true));
    assert_eq!(response.updates_available, Some(false));

    let stored = Firewall::find_by_id(fw.id).one(&db).await.unwrap().unwrap();
    assert_eq!(stored.lifecycle_status, LifecycleStatus::Online);
    assert_eq!(stored.current_version.as_deref(), Some("24.7.1"));
    assert!(stored.last_update_check.is_some());

    let converged = AuditLog::find()
        .filter(audit_log::Column::Action.eq("update_converged"))
        .count(&db)
        .await
        .unwrap();
    assert_eq!(converged, 1);
}

#[tokio::test]
async fn test_partial_progress_returns_online() {
    let db = create_test_db().await;
    let state = build_app_state(db.clone());
    let fw = create_test_firewall(&db, "edge-01", None).await;
    update_firewall(&db, &fw, |fw| {
        fw.lifecycle_status = Set(LifecycleStatus::Updating);
        fw.current_version = Set(Some("24.1".to_string()));
    })
    .await;

    poll(
        &state,
        json!({
            "firewall_id": fw.id,
            "agent_version": "3.0.0",
            "opnsense_updates": {
                "updates_available": true,
                "current_version": "24.7",
                "available_version": "24.7.1"
            }
        }),
        Utc::now(),
    )
    .await;

    let stored = Firewall::find_by_id(fw.id).one(&db).await.unwrap().unwrap();
    assert_eq!(stored.lifecycle_status, LifecycleStatus::Online);
    assert!(stored.updates_available);
    assert_eq!(stored.available_version.as_deref(), Some("24.7.1"));

    let partial = AuditLog::find()
        .filter(audit_log::Column::Action.eq("update_partial_progress"))
        .count(&db)
        .await
        .unwrap();
    assert_eq!(partial, 1);
}

#[tokio::test]
async fn test_updating_without_progress_stays_updating() {
    let db = create_test_db().await;
    let state = build_app_state(db.clone());
    let fw = create_test_firewall(&db, "edge-01", None).await;
    update_firewall(&db, &fw, |fw| {
        fw.lifecycle_status = Set(LifecycleStatus::Updating);
        fw.current_version = Set(Some("24.7".to_string()));
    })
    .await;

    poll(
        &state,
        json!({
            "firewall_id": fw.id,
            "agent_version": "3.0.0",
            "opnsense_updates": { "updates_available": 1, "current_version": "24.7" }
        }),
        Utc::now(),
    )
    .await;

    let stored = Firewall::find_by_id(fw.id).one(&db).await.unwrap().unwrap();
    assert_eq!(stored.lifecycle_status, LifecycleStatus::Updating);
}

#[tokio::test]
async fn test_update_check_respects_cadence() {
    let db = create_test_db().await;
    let state = build_app_state(db.clone());
    let fw = create_test_firewall(&db, "edge-01", None).await;
    let now = Utc::now();
    update_firewall(&db, &fw, |fw| {
        fw.last_update_check = Set(Some(now - chrono::Duration::hours(1)));
        fw.current_version = Set(Some("24.7".to_string()));
    })
    .await;

    let body = json!({
        "firewall_id": fw.id,
        "agent_version": "3.0.0",
        "opnsense_updates": { "updates_available": 1, "current_version": "24.7" }
    });

    let early = poll(&state, body.clone(), now).await;
    assert_eq!(early.update_check_performed, None);
    let stored = Firewall::find_by_id(fw.id).one(&db).await.unwrap().unwrap();
    assert!(!stored.updates_available);

    let due = poll(&state, body, now + chrono::Duration::hours(5)).await;
    assert_eq!(due.update_check_performed, Some(true));
    let stored = Firewall::find_by_id(fw.id).one(&db).await.unwrap().unwrap();
    assert!(stored.updates_available);
}

#[tokio::test]
async fn test_requested_update_is_emitted_exactly_once() {
    let db = create_test_db().await;
    let state = build_app_state(db.clone());
    let fw = create_test_firewall(&db, "edge-01", None).await;
    update_firewall(&db, &fw, |fw| {
        fw.update_requested = Set(true);
        fw.lifecycle_status = Set(LifecycleStatus::UpdatePending);
        fw.updates_available = Set(true);
        fw.last_update_check = Set(Some(Utc::now()));
    })
    .await;

    let body = json!({ "firewall_id": fw.id, "agent_version": "3.0.0" });

    let first = poll(&state, body.clone(), Utc::now()).await;
    assert_eq!(first.opnsense_update_requested, Some(true));
    assert_eq!(
        first.opnsense_update_command.as_deref(),
        Some("/usr/local/etc/rc.firmware upgrade")
    );

    let stored = Firewall::find_by_id(fw.id).one(&db).await.unwrap().unwrap();
    assert!(!stored.update_requested);
    assert_eq!(stored.lifecycle_status, LifecycleStatus::Updating);
    assert!(!stored.updates_available);
    assert!(stored.last_update_check.is_none());
    assert!(stored.reboot_required);

    let second = poll(&state, body, Utc::now()).await;
    assert_eq!(second.opnsense_update_requested, None);
    assert_eq!(second.opnsense_update_command, None);

    let dispatched = AuditLog::find()
        .filter(audit_log::Column::Action.eq("update_dispatched"))
        .count(&db)
        .await
        .unwrap();
    assert_eq!(dispatched, 1);
}

#[tokio::test]
async fn test_effective_status_reports_updating() {
    let db = create_test_db().await;
    let state = build_app_state(db.clone());
    let fw = create_test_firewall(&db, "edge-01", None).await;
    update_firewall(&db, &fw, |fw| fw.update_requested = Set(true)).await;

    poll(&state, json!({ "firewall_id": fw.id, "agent_version": "3.0.0" }), Utc::now()).await;

    let stored = fleet::get_firewall(&db, fw.id).await.unwrap();
    let view = fleet::to_response(stored, Utc::now(), state.fleet.offline_threshold());
    assert_eq!(view.status, LifecycleStatus::Updating);
}

#[tokio::test]
async fn test_stale_snapshot_keeps_operator_request() {
    let db = create_test_db().await;
    let state = build_app_state(db.clone());
    let updater = UpdateOrchestrator::new(&state.fleet, state.audit.clone());
    let report: UpdateReport =
        serde_json::from_value(json!({ "updates_available": 0, "current_version": "24.7" })).unwrap();

    // Snapshot taken while online, request lands before the check is written
    let fw = create_test_firewall(&db, "edge-01", None).await;
    let snapshot = Firewall::find_by_id(fw.id).one(&db).await.unwrap().unwrap();
    orchestrator::request_system_update(&db, &state.audit, fw.id).await.unwrap();

    let outcome = updater
        .reconcile_system(&db, &snapshot, Some(&report), Utc::now())
        .await
        .unwrap();
    assert!(outcome.check_performed);
    let stored = Firewall::find_by_id(fw.id).one(&db).await.unwrap().unwrap();
    assert!(stored.update_requested);
    assert_eq!(stored.lifecycle_status, LifecycleStatus::UpdatePending);

    // Snapshot taken while updating: convergence must not override the new request
    let other = create_test_firewall(&db, "edge-02", None).await;
    update_firewall(&db, &other, |fw| {
        fw.lifecycle_status = Set(LifecycleStatus::Updating);
        fw.current_version = Set(Some("24.7".to_string()));
    })
    .await;
    let snapshot = Firewall::find_by_id(other.id).one(&db).await.unwrap().unwrap();
    orchestrator::request_system_update(&db, &state.audit, other.id).await.unwrap();

    updater
        .reconcile_system(&db, &snapshot, Some(&report), Utc::now())
        .await
        .unwrap();
    let stored = Firewall::find_by_id(other.id).one(&db).await.unwrap().unwrap();
    assert!(stored.update_requested);
    assert_eq!(stored.lifecycle_status, LifecycleStatus::UpdatePending);

    let converged = AuditLog::find()
        .filter(audit_log::Column::Action.eq("update_converged"))
        .count(&db)
        .await
        .unwrap();
    assert_eq!(converged, 0);
}

#[tokio::test]
async fn test_stuck_update_can_be_requested_again() {
    let db = create_test_db().await;
    let state = build_app_state(db.clone());
    let fw = create_test_firewall(&db, "edge-01", None).await;
    update_firewall(&db, &fw, |fw| fw.current_version = Set(Some("24.7".to_string()))).await;
    let t0 = Utc::now();
    let body = json!({
        "firewall_id": fw.id,
        "agent_version": "3.0.0",
        "opnsense_updates": { "updates_available": 1, "current_version": "24.7" }
    });

    orchestrator::request_system_update(&db, &state.audit, fw.id).await.unwrap();
    let first = poll(&state, body.clone(), t0).await;
    assert_eq!(first.opnsense_update_requested, Some(true));

    for hours in [6, 12, 18] {
        let response = poll(&state, body.clone(), t0 + chrono::Duration::hours(hours)).await;
        assert_eq!(response.opnsense_update_requested, None);
    }
    let stored = Firewall::find_by_id(fw.id).one(&db).await.unwrap().unwrap();
    assert_eq!(stored.lifecycle_status, LifecycleStatus::Updating);

    let retried = orchestrator::request_system_update(&db, &state.audit, fw.id)
        .await
        .unwrap();
    assert_eq!(retried.lifecycle_status, LifecycleStatus::UpdatePending);

    let again = poll(&state, body, t0 + chrono::Duration::hours(19)).await;
    assert_eq!(again.opnsense_update_requested, Some(true));
    assert_eq!(
        again.opnsense_update_command.as_deref(),
        Some("/usr/local/etc/rc.firmware upgrade")
    );
}

// ============================================================================
// Result submission
// ============================================================================

#[tokio::test]
async fn test_base64_speedtest_result_is_recorded() {
    let db = create_test_db().await;
    let state = build_app_state(db.clone());
    let fw = create_test_firewall(&db, "edge-01", None).await;
    let t0 = Utc::now();
    let cmd = ledger::enqueue_command(
        &db,
        fw.id,
        "/usr/local/bin/opnfleet_speedtest.sh --json",
        Some("Bandwidth test"),
        CommandChannel::Primary,
    )
    .await
    .unwrap();
    poll(&state, json!({ "firewall_id": fw.id, "agent_version": "3.0.0" }), t0).await;

    let payload = r#"{"download_mbps": 940.5, "upload_mbps": 38.2, "latency_ms": 12.0, "server": "Amsterdam"}"#;
    let ack = submit(
        &state,
        json!({
            "firewall_id": fw.id,
            "command_id": cmd.id,
            "status": "completed",
            "result": STANDARD.encode(payload)
        }),
        t0 + chrono::Duration::seconds(30),
    )
    .await;

    assert!(ack.success);
    assert_eq!(ack.command_id, cmd.id);
    assert_eq!(ack.status, "completed");

    let stored = ledger::get_command(&db, cmd.id).await.unwrap();
    assert_eq!(stored.status, CommandStatus::Completed);
    assert_eq!(stored.result.as_deref(), Some(payload));
    assert!(stored.completed_at.is_some());

    let tests = BandwidthTest::find()
        .filter(bandwidth_test::Column::FirewallId.eq(fw.id))
        .all(&db)
        .await
        .unwrap();
    assert_eq!(tests.len(), 1);
    assert_eq!(tests[0].command_id, Some(cmd.id));
    assert_eq!(tests[0].download_mbps, 940.5);
    assert_eq!(tests[0].upload_mbps, 38.2);
    assert_eq!(tests[0].latency_ms, Some(12.0));
    assert_eq!(tests[0].server.as_deref(), Some("Amsterdam"));
}

#[tokio::test]
async fn test_failed_speedtest_records_no_figures() {
    let db = create_test_db().await;
    let state = build_app_state(db.clone());
    let fw = create_test_firewall(&db, "edge-01", None).await;
    let cmd = ledger::enqueue_command(&db, fw.id, "speedtest", None, CommandChannel::Primary)
        .await
        .unwrap();

    submit(
        &state,
        json!({
            "firewall_id": fw.id,
            "command_id": cmd.id,
            "status": "failed",
            "result": "{\"download\": 1, \"upload\": 1}"
        }),
        Utc::now(),
    )
    .await;

    assert_eq!(BandwidthTest::find().count(&db).await.unwrap(), 0);
    assert_eq!(
        ledger::get_command(&db, cmd.id).await.unwrap().status,
        CommandStatus::Failed
    );
}

#[tokio::test]
async fn test_resubmitted_speedtest_keeps_one_record() {
    let db = create_test_db().await;
    let state = build_app_state(db.clone());
    let fw = create_test_firewall(&db, "edge-01", None).await;
    let cmd = ledger::enqueue_command(&db, fw.id, "speedtest --json", None, CommandChannel::Primary)
        .await
        .unwrap();
    let t0 = Utc::now();

    let first = STANDARD.encode(r#"{"download": 100, "upload": 10}"#);
    let retry = STANDARD.encode(r#"{"download": 120, "upload": 12}"#);
    for (result, at) in [(&first, 0), (&first, 5), (&retry, 10)] {
        submit(
            &state,
            json!({ "firewall_id": fw.id, "command_id": cmd.id, "status": "completed", "result": result }),
            t0 + chrono::Duration::seconds(at),
        )
        .await;
    }

    let tests = BandwidthTest::find()
        .filter(bandwidth_test::Column::CommandId.eq(cmd.id))
        .all(&db)
        .await
        .unwrap();
    assert_eq!(tests.len(), 1);
    assert_eq!(tests[0].download_mbps, 120.0);
    assert_eq!(tests[0].upload_mbps, 12.0);

    // A later failure report invalidates the figures
    submit(
        &state,
        json!({ "firewall_id": fw.id, "command_id": cmd.id, "status": "failed", "result": "timeout" }),
        t0 + chrono::Duration::seconds(20),
    )
    .await;
    assert_eq!(BandwidthTest::find().count(&db).await.unwrap(), 0);
}

#[tokio::test]
async fn test_result_submission_does_not_touch_telemetry_or_queue() {
    let db = create_test_db().await;
    let state = build_app_state(db.clone());
    let fw = create_test_firewall(&db, "edge-01", None).await;
    let t0 = Utc::now();
    let done = insert_command(&db, fw.id, "uptime", CommandChannel::Primary, t0).await;
    let waiting = insert_command(&db, fw.id, "df -h", CommandChannel::Primary, t0).await;

    submit(
        &state,
        json!({
            "firewall_id": fw.id,
            "command_id": done.id,
            "status": "completed",
            "result": "up 3 days",
            "wan_ip": "203.0.113.9"
        }),
        t0,
    )
    .await;

    let stored = Firewall::find_by_id(fw.id).one(&db).await.unwrap().unwrap();
    assert!(stored.last_checkin.is_none());
    assert!(stored.wan_ip.is_none());
    assert_eq!(
        ledger::get_command(&db, waiting.id).await.unwrap().status,
        CommandStatus::Pending
    );
    assert_eq!(
        ledger::get_command(&db, done.id).await.unwrap().result.as_deref(),
        Some("up 3 days")
    );
}

#[tokio::test]
async fn test_result_submission_validation() {
    let db = create_test_db().await;
    let state = build_app_state(db.clone());
    let fw = create_test_firewall(&db, "edge-01", None).await;
    let other = create_test_firewall(&db, "edge-02", None).await;
    let cmd = insert_command(&db, fw.id, "uptime", CommandChannel::Primary, Utc::now()).await;

    let missing_status = handle_err(&state, json!({ "firewall_id": fw.id, "command_id": cmd.id })).await;
    assert!(matches!(missing_status, AppError::BadRequest(_)));

    let bad_status = handle_err(
        &state,
        json!({ "firewall_id": fw.id, "command_id": cmd.id, "status": "running" }),
    )
    .await;
    assert!(matches!(bad_status, AppError::BadRequest(_)));

    let foreign = handle_err(
        &state,
        json!({ "firewall_id": other.id, "command_id": cmd.id, "status": "completed" }),
    )
    .await;
    assert!(matches!(foreign, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_duplicate_result_is_acknowledged() {
    let db = create_test_db().await;
    let state = build_app_state(db.clone());
    let fw = create_test_firewall(&db, "edge-01", None).await;
    let cmd = insert_command(&db, fw.id, "uptime", CommandChannel::Primary, Utc::now()).await;

    let body = json!({ "firewall_id": fw.id, "command_id": cmd.id, "status": "completed", "result": "first" });
    submit(&state, body, Utc::now()).await;

    let ack = submit(
        &state,
        json!({ "firewall_id": fw.id, "command_id": cmd.id, "status": "completed", "result": "second" }),
        Utc::now(),
    )
    .await;
    assert!(ack.success);
    assert!(ack.message.contains("already"));
    assert_eq!(
        ledger::get_command(&db, cmd.id).await.unwrap().result.as_deref(),
        Some("second")
    );
}

// ============================================================================
// Step isolation
// ============================================================================

#[tokio::test]
async fn test_failing_relay_still_delivers_commands() {
    let db = create_test_db().await;
    let state = build_app_state(db.clone());
    let fw = create_test_firewall(&db, "edge-01", None).await;
    let cmd = insert_command(&db, fw.id, "uptime", CommandChannel::Primary, Utc::now()).await;

    db.execute_unprepared("DROP TABLE proxy_requests").await.unwrap();

    let response = poll(&state, json!({ "firewall_id": fw.id, "agent_version": "3.0.0" }), Utc::now()).await;

    assert!(response.success);
    assert!(response.pending_requests.is_empty());
    let ids: Vec<i64> = response.queued_commands.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![cmd.id]);
    assert_eq!(response.agent_update_available, Some(false));
}

#[tokio::test]
async fn test_failing_telemetry_still_delivers_commands() {
    let db = create_test_db().await;
    let state = build_app_state(db.clone());
    let fw = create_test_firewall(&db, "edge-01", None).await;
    let cmd = insert_command(&db, fw.id, "uptime", CommandChannel::Primary, Utc::now()).await;

    db.execute_unprepared("DROP TABLE telemetry_samples").await.unwrap();

    let response = poll(
        &state,
        json!({
            "firewall_id": fw.id,
            "agent_version": "3.0.0",
            "system_stats": { "cpu_percent": 5 }
        }),
        Utc::now(),
    )
    .await;

    assert!(response.success);
    assert_eq!(response.queued_commands.len(), 1);
    assert_eq!(response.queued_commands[0].id, cmd.id);
    assert_eq!(
        ledger::get_command(&db, cmd.id).await.unwrap().status,
        CommandStatus::Sent
    );
}
