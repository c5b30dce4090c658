//! Command ledger: the durable per-firewall work queue.
//!
//! Commands move `pending -> sent -> completed | failed`. A `sent` command
//! whose lease outlives the timeout is put back to `pending` by
//! [`reclaim_stale`], so delivery is at-least-once: every payload must be
//! safe to run more than once.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveEnum, ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    Set, TransactionTrait,
};
use std::time::Duration;

use crate::db::DbConn;
use crate::error::{AppError, Result};
use crate::models::firewall_command::{self, CommandChannel, CommandStatus};
use crate::models::prelude::*;

/// Outcome of recording a command result
#[derive(Debug, Clone)]
pub struct Resolution {
    pub command: firewall_command::Model,
    /// The command had already been resolved before this submission
    pub duplicate: bool,
}

/// Append a command to a firewall's queue.
///
/// Delivery is at-least-once, so `command` must be idempotent.
pub async fn enqueue_command(
    db: &DbConn,
    firewall_id: i64,
    command: &str,
    description: Option<&str>,
    channel: CommandChannel,
) -> Result<firewall_command::Model> {
    let command = command.trim();
    if command.is_empty() {
        return Err(AppError::BadRequest("Command must not be empty".to_string()));
    }

    if Firewall::find_by_id(firewall_id).one(db).await?.is_none() {
        return Err(AppError::NotFound(format!(
            "Firewall {} not found",
            firewall_id
        )));
    }

    let entry = firewall_command::ActiveModel {
        firewall_id: Set(firewall_id),
        command: Set(command.to_string()),
        description: Set(description.map(str::to_string)),
        status: Set(CommandStatus::Pending),
        is_update_command: Set(channel.is_update()),
        created_at: Set(Utc::now()),
        sent_at: Set(None),
        completed_at: Set(None),
        result: Set(None),
        ..Default::default()
    };

    let model = entry.insert(db).await?;
    tracing::info!(
        firewall_id,
        command_id = model.id,
        channel = %channel,
        "Command queued"
    );
    Ok(model)
}

/// Claim up to `max_batch` pending commands for one channel, oldest first,
/// and mark them sent.
///
/// Each candidate is claimed with an update conditioned on it still being
/// pending, so two concurrent check-ins for the same firewall can never both
/// receive the same command.
pub async fn lease_commands(
    db: &DbConn,
    firewall_id: i64,
    channel: CommandChannel,
    max_batch: u64,
    now: DateTime<Utc>,
) -> Result<Vec<firewall_command::Model>> {
    if max_batch == 0 {
        return Ok(Vec::new());
    }

    let txn = db.begin().await?;

    let candidates = FirewallCommand::find()
        .filter(firewall_command::Column::FirewallId.eq(firewall_id))
        .filter(firewall_command::Column::Status.eq(CommandStatus::Pending))
        .filter(firewall_command::Column::IsUpdateCommand.eq(channel.is_update()))
        .order_by_asc(firewall_command::Column::CreatedAt)
        .order_by_asc(firewall_command::Column::Id)
        .limit(max_batch)
        .all(&txn)
        .await?;

    let mut leased = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let claimed = FirewallCommand::update_many()
            .col_expr(
                firewall_command::Column::Status,
                Expr::value(CommandStatus::Sent.to_value()),
            )
            .col_expr(firewall_command::Column::SentAt, Expr::value(now))
            .filter(firewall_command::Column::Id.eq(candidate.id))
            .filter(firewall_command::Column::Status.eq(CommandStatus::Pending))
            .exec(&txn)
            .await?;

        if claimed.rows_affected == 1 {
            leased.push(firewall_command::Model {
                status: CommandStatus::Sent,
                sent_at: Some(now),
                ..candidate
            });
        }
    }

    txn.commit().await?;

    if !leased.is_empty() {
        tracing::info!(
            firewall_id,
            channel = %channel,
            leased = leased.len(),
            "Leased commands"
        );
    }

    Ok(leased)
}

/// Return every command of this channel leased longer than `lease_timeout`
/// ago without a result back to pending. Returns how many were reclaimed.
pub async fn reclaim_stale(
    db: &DbConn,
    firewall_id: i64,
    channel: CommandChannel,
    lease_timeout: Duration,
    now: DateTime<Utc>,
) -> Result<u64> {
    let timeout = chrono::Duration::from_std(lease_timeout)
        .map_err(|e| AppError::Internal(format!("Invalid lease timeout: {}", e)))?;
    let cutoff = now - timeout;

    let result = FirewallCommand::update_many()
        .col_expr(
            firewall_command::Column::Status,
            Expr::value(CommandStatus::Pending.to_value()),
        )
        .col_expr(
            firewall_command::Column::SentAt,
            Expr::value(Option::<DateTime<Utc>>::None),
        )
        .filter(firewall_command::Column::FirewallId.eq(firewall_id))
        .filter(firewall_command::Column::IsUpdateCommand.eq(channel.is_update()))
        .filter(firewall_command::Column::Status.eq(CommandStatus::Sent))
        .filter(firewall_command::Column::SentAt.lt(cutoff))
        .exec(db)
        .await?;

    if result.rows_affected > 0 {
        tracing::warn!(
            firewall_id,
            channel = %channel,
            reclaimed = result.rows_affected,
            "Reclaimed stale command leases"
        );
    }

    Ok(result.rows_affected)
}

/// Record the outcome of a command reported by the firewall that owns it.
///
/// Resolving an already-resolved command overwrites its result; the
/// returned [`Resolution`] says whether that happened.
pub async fn resolve_command(
    db: &DbConn,
    firewall_id: i64,
    command_id: i64,
    status: CommandStatus,
    result: Option<String>,
    now: DateTime<Utc>,
) -> Result<Resolution> {
    if !status.is_resolved() {
        return Err(AppError::BadRequest(format!(
            "Invalid result status '{}'",
            status
        )));
    }

    let existing = FirewallCommand::find_by_id(command_id)
        .filter(firewall_command::Column::FirewallId.eq(firewall_id))
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Command {} not found", command_id)))?;

    let duplicate = existing.status.is_resolved();

    let mut active: firewall_command::ActiveModel = existing.into();
    active.status = Set(status);
    active.result = Set(result);
    active.completed_at = Set(Some(now));
    let command = active.update(db).await?;

    if duplicate {
        tracing::info!(
            firewall_id,
            command_id,
            "Duplicate result submission, overwriting previous result"
        );
    } else {
        tracing::info!(firewall_id, command_id, status = %status, "Command resolved");
    }

    Ok(Resolution { command, duplicate })
}

/// Look up a single command
pub async fn get_command(db: &DbConn, command_id: i64) -> Result<firewall_command::Model> {
    FirewallCommand::find_by_id(command_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Command {} not found", command_id)))
}

/// Most recent commands of a firewall, newest first
pub async fn list_commands(
    db: &DbConn,
    firewall_id: i64,
    limit: u64,
) -> Result<Vec<firewall_command::Model>> {
    let commands = FirewallCommand::find()
        .filter(firewall_command::Column::FirewallId.eq(firewall_id))
        .order_by_desc(firewall_command::Column::CreatedAt)
        .order_by_desc(firewall_command::Column::Id)
        .limit(limit.clamp(1, 500))
        .all(db)
        .await?;

    Ok(commands)
}

/// Delete resolved commands older than `cutoff`. Pending and in-flight
/// commands are never touched.
pub async fn purge_resolved_before(db: &DbConn, cutoff: DateTime<Utc>) -> Result<u64> {
    let result = FirewallCommand::delete_many()
        .filter(
            firewall_command::Column::Status
                .is_in([CommandStatus::Completed, CommandStatus::Failed]),
        )
        .filter(firewall_command::Column::CompletedAt.lt(cutoff))
        .exec(db)
        .await?;

    Ok(result.rows_affected)
}
