//! Persistence of what agents report about themselves.
//!
//! Only fields present in a check-in overwrite stored values: agents are
//! upgraded gradually and an older script must not erase data a newer one
//! (or an operator) put there.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set};
use serde_json::Value;

use crate::db::DbConn;
use crate::error::Result;
use crate::models::prelude::*;
use crate::models::{bandwidth_test, firewall, telemetry_sample};
use crate::schemas::CheckinRequest;

/// Store the primary agent's heartbeat and reported telemetry
pub async fn record_checkin(
    db: &DbConn,
    current: &firewall::Model,
    req: &CheckinRequest,
    now: DateTime<Utc>,
) -> Result<()> {
    let mut active: firewall::ActiveModel = current.clone().into();

    active.last_checkin = Set(Some(now));
    active.updated_at = Set(now);
    if let Some(version) = &req.agent_version {
        active.agent_version = Set(Some(version.clone()));
    }
    if current.hardware_id.is_none() {
        if let Some(hardware_id) = &req.hardware_id {
            active.hardware_id = Set(Some(hardware_id.clone()));
        }
    }

    macro_rules! keep_unless_reported {
        ($($field:ident),+ $(,)?) => {
            $(
                if let Some(value) = &req.$field {
                    active.$field = Set(Some(value.clone()));
                }
            )+
        };
    }
    keep_unless_reported!(
        wan_ip,
        lan_ip,
        ipv6_address,
        wan_netmask,
        wan_gateway,
        wan_dns_primary,
        wan_dns_secondary,
        lan_netmask,
        lan_network,
        uptime,
    );

    active.update(db).await?;

    if req.has_stats() {
        record_sample(db, current.id, req, now).await?;
    }

    Ok(())
}

/// The update agent only refreshes its own liveness columns
pub async fn record_update_agent_checkin(
    db: &DbConn,
    current: &firewall::Model,
    agent_version: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let mut active: firewall::ActiveModel = current.clone().into();
    active.update_agent_version = Set(Some(agent_version.to_string()));
    active.update_agent_last_checkin = Set(Some(now));
    active.updated_at = Set(now);
    active.update(db).await?;
    Ok(())
}

async fn record_sample(
    db: &DbConn,
    firewall_id: i64,
    req: &CheckinRequest,
    now: DateTime<Utc>,
) -> Result<()> {
    let traffic = req.traffic_stats.clone().unwrap_or_default();
    let system = req.system_stats.clone().unwrap_or_default();
    let latency = req.latency_stats.clone().unwrap_or_default();

    telemetry_sample::ActiveModel {
        firewall_id: Set(firewall_id),
        recorded_at: Set(now),
        interface: Set(traffic.interface),
        bytes_in: Set(traffic.bytes_in),
        bytes_out: Set(traffic.bytes_out),
        packets_in: Set(traffic.packets_in),
        packets_out: Set(traffic.packets_out),
        cpu_percent: Set(system.cpu_percent),
        memory_percent: Set(system.memory_percent),
        disk_percent: Set(system.disk_percent),
        load_average: Set(system.load_average),
        latency_ms: Set(latency.latency_ms),
        packet_loss: Set(latency.packet_loss),
        ..Default::default()
    }
    .insert(db)
    .await?;

    Ok(())
}

/// Delete telemetry samples recorded before `cutoff`
pub async fn purge_samples_before(db: &DbConn, cutoff: DateTime<Utc>) -> Result<u64> {
    let result = TelemetrySample::delete_many()
        .filter(telemetry_sample::Column::RecordedAt.lt(cutoff))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

// ============================================================================
// Bandwidth tests
// ============================================================================

/// Figures extracted from a speedtest result
#[derive(Debug, Clone, PartialEq)]
pub struct BandwidthFigures {
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub latency_ms: Option<f64>,
    pub server: Option<String>,
}

/// Parse a decoded speedtest result. Returns `None` unless it is a JSON
/// object carrying both download and upload figures.
pub fn parse_bandwidth_result(result: &str) -> Option<BandwidthFigures> {
    let value: Value = serde_json::from_str(result.trim()).ok()?;
    let obj = value.as_object()?;

    let number = |keys: &[&str]| -> Option<f64> {
        keys.iter().find_map(|k| match obj.get(*k)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    };

    Some(BandwidthFigures {
        download_mbps: number(&["download_mbps", "download"])?,
        upload_mbps: number(&["upload_mbps", "upload"])?,
        latency_ms: number(&["latency_ms", "ping", "latency"]),
        server: obj.get("server").and_then(|s| match s {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Object(o) => o.get("name").and_then(Value::as_str).map(str::to_string),
            _ => None,
        }),
    })
}

/// Persist the figures of a completed speedtest command.
///
/// There is at most one row per command: a resubmitted result replaces the
/// earlier figures. An unparseable result is logged and drops any figures
/// stored for the command, since they no longer match its result.
pub async fn record_bandwidth_test(
    db: &DbConn,
    firewall_id: i64,
    command_id: i64,
    result: &str,
    now: DateTime<Utc>,
) -> Result<Option<bandwidth_test::Model>> {
    let Some(figures) = parse_bandwidth_result(result) else {
        tracing::warn!(firewall_id, command_id, "Speedtest result could not be parsed");
        discard_bandwidth_test(db, command_id).await?;
        return Ok(None);
    };

    let row = bandwidth_test::ActiveModel {
        firewall_id: Set(firewall_id),
        command_id: Set(Some(command_id)),
        download_mbps: Set(figures.download_mbps),
        upload_mbps: Set(figures.upload_mbps),
        latency_ms: Set(figures.latency_ms),
        server: Set(figures.server),
        tested_at: Set(now),
        ..Default::default()
    };
    BandwidthTest::insert(row)
        .on_conflict(
            OnConflict::column(bandwidth_test::Column::CommandId)
                .update_columns([
                    bandwidth_test::Column::DownloadMbps,
                    bandwidth_test::Column::UploadMbps,
                    bandwidth_test::Column::LatencyMs,
                    bandwidth_test::Column::Server,
                    bandwidth_test::Column::TestedAt,
                ])
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    let model = BandwidthTest::find()
        .filter(bandwidth_test::Column::CommandId.eq(command_id))
        .one(db)
        .await?;

    if let Some(model) = &model {
        tracing::info!(
            firewall_id,
            command_id,
            download_mbps = model.download_mbps,
            upload_mbps = model.upload_mbps,
            "Bandwidth test recorded"
        );
    }
    Ok(model)
}

/// Remove the figures recorded for a command, if any
pub async fn discard_bandwidth_test(db: &DbConn, command_id: i64) -> Result<u64> {
    let result = BandwidthTest::delete_many()
        .filter(bandwidth_test::Column::CommandId.eq(command_id))
        .exec(db)
        .await?;
    if result.rows_affected > 0 {
        tracing::info!(command_id, "Discarded stale bandwidth test");
    }
    Ok(result.rows_affected)
}

/// Recorded bandwidth tests of a firewall, newest first
pub async fn list_bandwidth_tests(
    db: &DbConn,
    firewall_id: i64,
    limit: u64,
) -> Result<Vec<bandwidth_test::Model>> {
    let tests = BandwidthTest::find()
        .filter(bandwidth_test::Column::FirewallId.eq(firewall_id))
        .order_by_desc(bandwidth_test::Column::TestedAt)
        .order_by_desc(bandwidth_test::Column::Id)
        .limit(limit.clamp(1, 500))
        .all(db)
        .await?;
    Ok(tests)
}
