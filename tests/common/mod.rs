//! Test helpers shared by the integration tests.
//!
//! Every test gets its own in-memory SQLite database with all migrations
//! applied, plus fixture helpers for firewalls, commands and proxy requests.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{DateTime, Utc};
use http_body_util::BodyExt;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use tower::util::ServiceExt;

use opnfleet::config::fleet::FleetConfig;
use opnfleet::models::firewall::{self, LifecycleStatus};
use opnfleet::models::firewall_command::{self, CommandChannel, CommandStatus};
use opnfleet::state::AppState;

/// Fresh in-memory SQLite with the full schema
pub async fn create_test_db() -> DatabaseConnection {
    opnfleet::db::connect_with_url("sqlite::memory:")
        .await
        .expect("in-memory database")
}

/// Fleet configuration used by tests: the protocol defaults
pub fn test_fleet_config() -> FleetConfig {
    FleetConfig {
        public_url: "https://fleet.test".to_string(),
        ..FleetConfig::default()
    }
}

/// Build an AppState with the test fleet configuration
pub fn build_app_state(db: DatabaseConnection) -> AppState {
    AppState::new(db, test_fleet_config())
}

/// Enroll a firewall directly in the database
pub async fn create_test_firewall(
    db: &DatabaseConnection,
    name: &str,
    hardware_id: Option<&str>,
) -> firewall::Model {
    let now = Utc::now();
    firewall::ActiveModel {
        name: Set(name.to_string()),
        hardware_id: Set(hardware_id.map(str::to_string)),
        lifecycle_status: Set(LifecycleStatus::Online),
        update_requested: Set(false),
        updates_available: Set(false),
        reboot_required: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to create test firewall")
}

/// Insert a pending command with an explicit creation time
pub async fn insert_command(
    db: &DatabaseConnection,
    firewall_id: i64,
    command: &str,
    channel: CommandChannel,
    created_at: DateTime<Utc>,
) -> firewall_command::Model {
    firewall_command::ActiveModel {
        firewall_id: Set(firewall_id),
        command: Set(command.to_string()),
        description: Set(None),
        status: Set(CommandStatus::Pending),
        is_update_command: Set(channel.is_update()),
        created_at: Set(created_at),
        sent_at: Set(None),
        completed_at: Set(None),
        result: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to insert test command")
}

/// Update fields of a firewall for a test scenario
pub async fn update_firewall(
    db: &DatabaseConnection,
    firewall: &firewall::Model,
    apply: impl FnOnce(&mut firewall::ActiveModel),
) -> firewall::Model {
    let mut active: firewall::ActiveModel = firewall.clone().into();
    apply(&mut active);
    active.update(db).await.expect("Failed to update test firewall")
}

/// Send a JSON request through the router and return status and parsed body
pub async fn send_json(
    app: Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, value)
}

/// Send a raw body to a URI
pub async fn send_raw(app: Router, method: &str, uri: &str, body: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, value)
}
