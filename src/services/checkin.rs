//! Check-in handler.
//!
//! One endpoint serves two request shapes. A body carrying `command_id` is a
//! result submission and only touches the ledger. Anything else is a poll:
//! telemetry is stored, stale leases are reclaimed, a batch of work is
//! leased, update decisions are made and pending proxy requests drained.
//!
//! After identity resolution and validation, every step of a poll is
//! isolated. A failing step is logged and leaves its part of the response
//! empty; the agent will simply try again on its next cycle.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};

use crate::config::fleet::FleetConfig;
use crate::db::DbConn;
use crate::error::{AppError, Result};
use crate::models::audit_log::{AuditAction, ResourceType};
use crate::models::firewall;
use crate::models::firewall_command::{self, CommandChannel, CommandStatus};
use crate::schemas::{
    AgentReply, CheckinRequest, CheckinResponse, PendingProxyRequest, QueuedCommand, ResultAck,
};
use crate::services::audit::{AuditEvent, AuditService};
use crate::services::identity::{self, ResolvedBy};
use crate::services::orchestrator::UpdateOrchestrator;
use crate::services::{ledger, relay, telemetry};

#[derive(Clone)]
pub struct CheckinService {
    db: DbConn,
    config: Arc<FleetConfig>,
    orchestrator: UpdateOrchestrator,
    audit: AuditService,
}

impl CheckinService {
    pub fn new(db: DbConn, config: Arc<FleetConfig>, audit: AuditService) -> Self {
        let orchestrator = UpdateOrchestrator::new(&config, audit.clone());
        Self {
            db,
            config,
            orchestrator,
            audit,
        }
    }

    /// Entry point for everything an agent posts
    pub async fn handle(&self, req: CheckinRequest, now: DateTime<Utc>) -> Result<AgentReply> {
        let resolved =
            identity::resolve_firewall(&self.db, req.firewall_id, req.hardware_id.as_deref())
                .await?;

        let claimed_other_id = req.firewall_id.is_some_and(|id| id != 0);
        if resolved.resolved_by == ResolvedBy::HardwareId && claimed_other_id {
            let event = AuditEvent::new(AuditAction::FirewallReidentified, ResourceType::Firewall)
                .resource(resolved.firewall.id)
                .firewall(resolved.firewall.id)
                .details(serde_json::json!({ "claimed_id": req.firewall_id }));
            self.audit.record(event).await;
        }

        if req.is_result_submission() {
            let ack = self.submit_result(&resolved.firewall, &req, now).await?;
            Ok(AgentReply::Result(ack))
        } else {
            let response = self.checkin(resolved.firewall, &req, now).await?;
            Ok(AgentReply::Checkin(Box::new(response)))
        }
    }

    /// Record the outcome of a command the agent executed
    pub async fn submit_result(
        &self,
        firewall: &firewall::Model,
        req: &CheckinRequest,
        now: DateTime<Utc>,
    ) -> Result<ResultAck> {
        let command_id = req
            .command_id
            .ok_or_else(|| AppError::BadRequest("command_id is required".to_string()))?;
        let raw_status = req.status.as_deref().ok_or_else(|| {
            AppError::BadRequest("status is required with command_id".to_string())
        })?;
        let status = CommandStatus::from_result(raw_status).ok_or_else(|| {
            AppError::BadRequest(format!(
                "Invalid status '{}', expected 'completed' or 'failed'",
                raw_status
            ))
        })?;

        let result = req.result.as_deref().map(decode_result);
        let resolution =
            ledger::resolve_command(&self.db, firewall.id, command_id, status, result, now).await?;

        if resolution.command.is_speedtest() {
            if status == CommandStatus::Completed {
                self.store_bandwidth_test(&resolution.command, now).await;
            } else if resolution.duplicate {
                self.discard_bandwidth_test(&resolution.command).await;
            }
        }

        let event = AuditEvent::new(AuditAction::CommandResolved, ResourceType::Command)
            .resource(command_id)
            .firewall(firewall.id)
            .details(serde_json::json!({
                "status": status,
                "duplicate": resolution.duplicate,
            }));
        self.audit.record(event).await;

        let message = if resolution.duplicate {
            "Result already recorded, overwritten"
        } else {
            "Result recorded"
        };

        Ok(ResultAck {
            success: true,
            message: message.to_string(),
            command_id,
            status: status.to_string(),
        })
    }

    async fn store_bandwidth_test(&self, command: &firewall_command::Model, now: DateTime<Utc>) {
        let Some(result) = command.result.as_deref() else {
            tracing::warn!(command_id = command.id, "Speedtest completed without a result");
            return;
        };
        if let Err(e) =
            telemetry::record_bandwidth_test(&self.db, command.firewall_id, command.id, result, now)
                .await
        {
            tracing::error!(command_id = command.id, error = %e, "Failed to store bandwidth test");
        }
    }

    async fn discard_bandwidth_test(&self, command: &firewall_command::Model) {
        if let Err(e) = telemetry::discard_bandwidth_test(&self.db, command.id).await {
            tracing::error!(command_id = command.id, error = %e, "Failed to discard bandwidth test");
        }
    }

    /// Handle a regular poll and assemble the consolidated response
    pub async fn checkin(
        &self,
        firewall: firewall::Model,
        req: &CheckinRequest,
        now: DateTime<Utc>,
    ) -> Result<CheckinResponse> {
        let agent_version = req
            .agent_version
            .as_deref()
            .ok_or_else(|| AppError::BadRequest("agent_version is required".to_string()))?;
        let channel = req.agent_type.channel();

        tracing::debug!(
            firewall_id = firewall.id,
            channel = %channel,
            agent_version,
            "Check-in received"
        );

        let recorded = match channel {
            CommandChannel::Primary => {
                telemetry::record_checkin(&self.db, &firewall, req, now).await
            }
            CommandChannel::Update => {
                telemetry::record_update_agent_checkin(&self.db, &firewall, agent_version, now)
                    .await
            }
        };
        if let Err(e) = recorded {
            tracing::error!(firewall_id = firewall.id, error = %e, "Failed to record check-in telemetry");
        }

        let interval = match channel {
            CommandChannel::Primary => self.config.primary_checkin_interval_secs,
            CommandChannel::Update => self.config.update_checkin_interval_secs,
        };
        let mut response = CheckinResponse::new(firewall.id, interval, now.to_rfc3339());

        response.queued_commands = self
            .next_commands(firewall.id, channel, now)
            .await
            .into_iter()
            .map(QueuedCommand::from)
            .collect();

        if channel == CommandChannel::Primary {
            self.apply_agent_update(&mut response, agent_version);
            self.apply_system_update(&mut response, &firewall, req, now).await;
        }

        match relay::drain_proxy_requests(&self.db, firewall.id, self.config.proxy_batch_size, now)
            .await
        {
            Ok(requests) => {
                response.pending_requests =
                    requests.into_iter().map(PendingProxyRequest::from).collect();
            }
            Err(e) => {
                tracing::error!(firewall_id = firewall.id, error = %e, "Failed to drain proxy requests");
            }
        }

        Ok(response)
    }

    /// Reclaim stale leases, then lease the next batch for this channel
    async fn next_commands(
        &self,
        firewall_id: i64,
        channel: CommandChannel,
        now: DateTime<Utc>,
    ) -> Vec<firewall_command::Model> {
        match ledger::reclaim_stale(&self.db, firewall_id, channel, self.config.lease_timeout(), now)
            .await
        {
            Ok(0) => {}
            Ok(reclaimed) => {
                let event = AuditEvent::new(AuditAction::CommandsReclaimed, ResourceType::Command)
                    .firewall(firewall_id)
                    .details(serde_json::json!({
                        "channel": channel,
                        "reclaimed": reclaimed,
                    }));
                self.audit.record(event).await;
            }
            Err(e) => {
                tracing::error!(firewall_id, channel = %channel, error = %e, "Failed to reclaim stale commands");
            }
        }

        ledger::lease_commands(
            &self.db,
            firewall_id,
            channel,
            self.config.command_batch_size,
            now,
        )
        .await
        .unwrap_or_else(|e| {
            tracing::error!(firewall_id, channel = %channel, error = %e, "Failed to lease commands");
            Vec::new()
        })
    }

    fn apply_agent_update(&self, response: &mut CheckinResponse, agent_version: &str) {
        response.latest_agent_version = Some(self.orchestrator.latest_agent_version().to_string());

        match self.orchestrator.agent_update(agent_version) {
            Some(instruction) => {
                tracing::info!(
                    firewall_id = response.firewall_id,
                    agent_version,
                    rule = instruction.rule,
                    "Agent update available"
                );
                response.agent_update_available = Some(true);
                response.agent_update_command = Some(instruction.command);
                response.agent_update_url = Some(instruction.url);
            }
            None => response.agent_update_available = Some(false),
        }
    }

    async fn apply_system_update(
        &self,
        response: &mut CheckinResponse,
        firewall: &firewall::Model,
        req: &CheckinRequest,
        now: DateTime<Utc>,
    ) {
        let outcome = match self
            .orchestrator
            .reconcile_system(&self.db, firewall, req.opnsense_updates.as_ref(), now)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(firewall_id = firewall.id, error = %e, "Firmware update reconciliation failed");
                return;
            }
        };

        if outcome.check_performed {
            response.update_check_performed = Some(true);
        }
        response.updates_available = outcome.updates_available;
        if let Some(command) = outcome.update_command {
            response.opnsense_update_requested = Some(true);
            response.opnsense_update_command = Some(command);
        }
    }
}

/// Agents may base64-encode results to survive shell quoting.
///
/// Text that is already JSON, or contains spaces or tabs, is kept as is.
/// Otherwise line breaks are dropped and a strict standard base64 decode is
/// tried. The decoded text is used only if it is valid UTF-8 without control
/// characters other than line breaks and tabs.
pub fn decode_result(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed.contains([' ', '\t'])
        || serde_json::from_str::<serde_json::Value>(trimmed).is_ok()
    {
        return raw.to_string();
    }

    let compact: String = trimmed.chars().filter(|c| *c != '\n' && *c != '\r').collect();
    STANDARD
        .decode(compact.as_bytes())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .filter(|text| is_printable(text))
        .unwrap_or_else(|| raw.to_string())
}

fn is_printable(text: &str) -> bool {
    text.chars()
        .all(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
}
