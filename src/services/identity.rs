//! Maps an inbound check-in to a firewall record.
//!
//! Agents normally send the numeric id they were enrolled with. After a
//! reinstall or config reset that id may be gone, but the hardware
//! fingerprint survives, so it is the fallback key.

use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};

use crate::db::DbConn;
use crate::error::{AppError, Result};
use crate::models::firewall;
use crate::models::prelude::*;

/// How a check-in was matched to its firewall
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedBy {
    Id,
    HardwareId,
}

#[derive(Debug, Clone)]
pub struct ResolvedFirewall {
    pub firewall: firewall::Model,
    pub resolved_by: ResolvedBy,
}

/// Resolve the firewall a check-in belongs to.
///
/// A non-zero id is tried first; when it is absent, zero, or unknown the
/// hardware fingerprint is used. Fails with `NotFound` when neither matches.
pub async fn resolve_firewall(
    db: &DbConn,
    firewall_id: Option<i64>,
    hardware_id: Option<&str>,
) -> Result<ResolvedFirewall> {
    if let Some(id) = firewall_id.filter(|id| *id != 0) {
        if let Some(firewall) = Firewall::find_by_id(id).one(db).await? {
            return Ok(ResolvedFirewall {
                firewall,
                resolved_by: ResolvedBy::Id,
            });
        }
        tracing::debug!(firewall_id = id, "Claimed firewall id is unknown, trying hardware id");
    }

    if let Some(hardware_id) = hardware_id.map(str::trim).filter(|h| !h.is_empty()) {
        if let Some(firewall) = Firewall::find()
            .filter(firewall::Column::HardwareId.eq(hardware_id))
            .one(db)
            .await?
        {
            tracing::info!(
                firewall_id = firewall.id,
                claimed_id = ?firewall_id,
                "Resolved firewall by hardware id"
            );
            return Ok(ResolvedFirewall {
                firewall,
                resolved_by: ResolvedBy::HardwareId,
            });
        }
    }

    Err(AppError::NotFound(match firewall_id {
        Some(id) if id != 0 => format!("Firewall {} not found", id),
        _ => "Firewall not found".to_string(),
    }))
}
