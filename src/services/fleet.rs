//! Fleet registry: enrollment and operator-facing views.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};

use crate::db::DbConn;
use crate::error::{AppError, Result};
use crate::models::audit_log::{AuditAction, ResourceType};
use crate::models::firewall::{self, LifecycleStatus};
use crate::models::prelude::*;
use crate::schemas::{CreateFirewall, FirewallResponse};
use crate::services::audit::{AuditEvent, AuditService};

/// Status an operator should see for a firewall.
///
/// An in-flight update is reported as stored. Otherwise online/offline is
/// derived from check-in recency and never persisted.
pub fn effective_status(
    now: DateTime<Utc>,
    last_seen: Option<DateTime<Utc>>,
    threshold: Duration,
    stored: LifecycleStatus,
) -> LifecycleStatus {
    if matches!(
        stored,
        LifecycleStatus::Updating | LifecycleStatus::UpdatePending
    ) {
        return stored;
    }

    let recent = last_seen.is_some_and(|seen| {
        (now - seen)
            .to_std()
            .map(|elapsed| elapsed <= threshold)
            // Clock skew: a check-in stamped in the future counts as recent
            .unwrap_or(true)
    });

    if recent {
        LifecycleStatus::Online
    } else {
        LifecycleStatus::Offline
    }
}

/// Enroll a new firewall
pub async fn enroll(
    db: &DbConn,
    audit: &AuditService,
    request: CreateFirewall,
) -> Result<firewall::Model> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Name must not be empty".to_string()));
    }

    let hardware_id = request
        .hardware_id
        .as_deref()
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_string);

    if let Some(hw) = &hardware_id {
        let existing = Firewall::find()
            .filter(firewall::Column::HardwareId.eq(hw.as_str()))
            .one(db)
            .await?;
        if existing.is_some() {
            return Err(AppError::Conflict(format!(
                "A firewall with hardware id '{}' is already enrolled",
                hw
            )));
        }
    }

    let now = Utc::now();
    let model = firewall::ActiveModel {
        name: Set(name.to_string()),
        hardware_id: Set(hardware_id),
        description: Set(request.description),
        lifecycle_status: Set(LifecycleStatus::Online),
        update_requested: Set(false),
        updates_available: Set(false),
        reboot_required: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    tracing::info!(firewall_id = model.id, name = %model.name, "Firewall enrolled");
    audit
        .record(
            AuditEvent::new(AuditAction::FirewallEnrolled, ResourceType::Firewall)
                .resource(model.id)
                .firewall(model.id)
                .details(serde_json::json!({ "name": model.name })),
        )
        .await;

    Ok(model)
}

pub async fn get_firewall(db: &DbConn, firewall_id: i64) -> Result<firewall::Model> {
    Firewall::find_by_id(firewall_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Firewall {} not found", firewall_id)))
}

pub async fn list_firewalls(db: &DbConn) -> Result<Vec<firewall::Model>> {
    let firewalls = Firewall::find()
        .order_by_asc(firewall::Column::Name)
        .order_by_asc(firewall::Column::Id)
        .all(db)
        .await?;
    Ok(firewalls)
}

/// Operator view of a firewall as of `now`
pub fn to_response(
    firewall: firewall::Model,
    now: DateTime<Utc>,
    offline_threshold: Duration,
) -> FirewallResponse {
    let status = effective_status(
        now,
        firewall.last_checkin,
        offline_threshold,
        firewall.lifecycle_status,
    );
    FirewallResponse::from_model(firewall, status)
}
