//! Update orchestration.
//!
//! Two independent decisions are made on every primary check-in:
//!
//! * **Agent binary**: the reported agent version is compared against the
//!   published one. Older agents get a remediation instruction chosen from
//!   an ordered rule table, because historical releases were installed in
//!   incompatible ways.
//! * **Firmware**: at most once per check interval the agent's own report of
//!   pending firmware updates is stored, and a firewall in `updating` is
//!   moved back to `online` once it has converged. An operator request
//!   (`update_requested`) is turned into exactly one update instruction.

use std::cmp::Ordering;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveEnum, ColumnTrait, EntityTrait, QueryFilter};

use crate::config::fleet::FleetConfig;
use crate::db::DbConn;
use crate::error::{AppError, Result};
use crate::models::audit_log::{AuditAction, ResourceType};
use crate::models::firewall::{self, LifecycleStatus};
use crate::models::prelude::*;
use crate::schemas::UpdateReport;
use crate::services::audit::{AuditEvent, AuditService};

// ============================================================================
// Version handling
// ============================================================================

/// Keep only digits and dots: `"v2.1.2-beta"` becomes `"2.1.2"`.
pub fn normalize_version(version: &str) -> String {
    version
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect::<String>()
        .trim_matches('.')
        .to_string()
}

/// Compare two versions segment by segment after normalization.
/// Missing or empty segments count as zero, so `"3"` equals `"3.0.0"`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |v: &str| -> Vec<u64> {
        normalize_version(v)
            .split('.')
            .map(|s| s.parse().unwrap_or(0))
            .collect()
    };
    let (a, b) = (parse(a), parse(b));

    for i in 0..a.len().max(b.len()) {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

// ============================================================================
// Agent remediation rules
// ============================================================================

/// One entry of the remediation table: the first rule whose predicate
/// matches the reported (normalized) version supplies the instruction.
pub struct RemediationRule {
    pub name: &'static str,
    matches: fn(&str) -> bool,
    /// `{base_url}` and `{version}` are substituted
    command_template: &'static str,
    url_template: &'static str,
}

impl RemediationRule {
    fn render(template: &str, base_url: &str, version: &str) -> String {
        template
            .replace("{base_url}", base_url)
            .replace("{version}", version)
    }
}

/// Ordered remediation table. Add new legacy cases above the catch-all.
pub fn remediation_rules() -> Vec<RemediationRule> {
    vec![
        RemediationRule {
            name: "legacy_v1_reinstall",
            matches: |v| v == "1" || v.starts_with("1."),
            command_template: "pkg delete -y opnfleet-agent; pkg add -f {base_url}/downloads/opnfleet-agent-{version}.pkg && service opnfleet_agent restart",
            url_template: "{base_url}/downloads/opnfleet-agent-{version}.pkg",
        },
        RemediationRule {
            name: "v2_1_2_self_heal",
            matches: |v| v == "2.1.2",
            command_template: "fetch -o /tmp/opnfleet_selfheal.sh {base_url}/downloads/agent_selfheal_2.1.2.sh && sh /tmp/opnfleet_selfheal.sh",
            url_template: "{base_url}/downloads/agent_selfheal_2.1.2.sh",
        },
        RemediationRule {
            name: "standard_replace",
            matches: |_| true,
            command_template: "fetch -o /usr/local/bin/opnfleet_agent.sh {base_url}/downloads/opnfleet_agent_v{version}.sh && chmod +x /usr/local/bin/opnfleet_agent.sh && service opnfleet_agent restart",
            url_template: "{base_url}/downloads/opnfleet_agent_v{version}.sh",
        },
    ]
}

/// Instruction telling an outdated agent how to upgrade itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentUpdateInstruction {
    pub rule: &'static str,
    pub latest_version: String,
    pub command: String,
    pub url: String,
}

// ============================================================================
// Firmware update outcome
// ============================================================================

/// What the firmware half of the orchestrator decided for one check-in
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemUpdateOutcome {
    pub check_performed: bool,
    pub updates_available: Option<bool>,
    /// Set only on the check-in that consumes an operator request
    pub update_command: Option<String>,
}

/// Lifecycle after a firmware check, given the status before it.
///
/// Only `updating` is re-evaluated: with nothing left to install, or with a
/// strictly newer version installed, the firewall is back `online`.
pub fn converge_status(
    current: LifecycleStatus,
    previous_version: Option<&str>,
    reported_version: Option<&str>,
    updates_available: bool,
) -> LifecycleStatus {
    if current != LifecycleStatus::Updating {
        return current;
    }
    if !updates_available || version_increased(previous_version, reported_version) {
        LifecycleStatus::Online
    } else {
        LifecycleStatus::Updating
    }
}

fn version_increased(previous: Option<&str>, reported: Option<&str>) -> bool {
    match (previous, reported) {
        (Some(prev), Some(new)) => compare_versions(new, prev) == Ordering::Greater,
        _ => false,
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

#[derive(Clone)]
pub struct UpdateOrchestrator {
    latest_agent_version: String,
    public_url: String,
    system_update_command: String,
    check_interval: Duration,
    audit: AuditService,
}

impl UpdateOrchestrator {
    pub fn new(config: &FleetConfig, audit: AuditService) -> Self {
        Self {
            latest_agent_version: config.latest_agent_version.clone(),
            public_url: config.public_url.clone(),
            system_update_command: config.system_update_command.clone(),
            check_interval: config.update_check_interval(),
            audit,
        }
    }

    pub fn latest_agent_version(&self) -> &str {
        &self.latest_agent_version
    }

    /// Decide whether the reporting agent must upgrade, and how
    pub fn agent_update(&self, reported_version: &str) -> Option<AgentUpdateInstruction> {
        if compare_versions(reported_version, &self.latest_agent_version) != Ordering::Less {
            return None;
        }

        let normalized = normalize_version(reported_version);
        let latest = normalize_version(&self.latest_agent_version);
        let rules = remediation_rules();
        let rule = rules.iter().find(|r| (r.matches)(&normalized))?;

        Some(AgentUpdateInstruction {
            rule: rule.name,
            latest_version: latest.clone(),
            command: RemediationRule::render(rule.command_template, &self.public_url, &latest),
            url: RemediationRule::render(rule.url_template, &self.public_url, &latest),
        })
    }

    /// Whether the firmware check cadence allows a check now
    pub fn check_due(&self, last_check: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match last_check {
            None => true,
            Some(last) => (now - last)
                .to_std()
                .map(|elapsed| elapsed >= self.check_interval)
                .unwrap_or(false),
        }
    }

    /// Reconcile firmware update state for one check-in.
    ///
    /// `firewall` is the record as loaded at the start of the check-in.
    pub async fn reconcile_system(
        &self,
        db: &DbConn,
        firewall: &firewall::Model,
        report: Option<&UpdateReport>,
        now: DateTime<Utc>,
    ) -> Result<SystemUpdateOutcome> {
        let mut outcome = SystemUpdateOutcome::default();

        if let Some(report) = report.filter(|_| self.check_due(firewall.last_update_check, now)) {
            self.record_update_check(db, firewall, report, now).await?;
            outcome.check_performed = true;
            outcome.updates_available = Some(report.updates_available);
        }

        if firewall.update_requested {
            outcome.update_command = self.dispatch_requested_update(db, firewall.id, now).await?;
            if outcome.update_command.is_some() {
                outcome.updates_available = Some(false);
            }
        }

        Ok(outcome)
    }

    async fn record_update_check(
        &self,
        db: &DbConn,
        firewall: &firewall::Model,
        report: &UpdateReport,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let reported_version = report
            .current_version
            .clone()
            .or_else(|| firewall.current_version.clone());
        let next_status = converge_status(
            firewall.lifecycle_status,
            firewall.current_version.as_deref(),
            reported_version.as_deref(),
            report.updates_available,
        );

        Firewall::update_many()
            .col_expr(firewall::Column::CurrentVersion, Expr::value(reported_version.clone()))
            .col_expr(
                firewall::Column::AvailableVersion,
                Expr::value(report.available_version.clone()),
            )
            .col_expr(
                firewall::Column::UpdatesAvailable,
                Expr::value(report.updates_available),
            )
            .col_expr(firewall::Column::LastUpdateCheck, Expr::value(now))
            .col_expr(firewall::Column::UpdatedAt, Expr::value(now))
            .filter(firewall::Column::Id.eq(firewall.id))
            .exec(db)
            .await?;

        // The snapshot may be stale: an operator can request an update while
        // this check-in runs. Only move the status if it is still the one
        // the decision was based on.
        let transitioned = next_status != firewall.lifecycle_status
            && Firewall::update_many()
                .col_expr(
                    firewall::Column::LifecycleStatus,
                    Expr::value(next_status.to_value()),
                )
                .filter(firewall::Column::Id.eq(firewall.id))
                .filter(firewall::Column::LifecycleStatus.eq(firewall.lifecycle_status))
                .exec(db)
                .await?
                .rows_affected
                == 1;

        tracing::debug!(
            firewall_id = firewall.id,
            updates_available = report.updates_available,
            current_version = ?reported_version,
            "Firmware update check recorded"
        );

        if transitioned && next_status == LifecycleStatus::Online {
            let details = serde_json::json!({
                "previous_version": firewall.current_version,
                "current_version": reported_version,
                "updates_available": report.updates_available,
            });
            let action = if report.updates_available {
                tracing::info!(
                    firewall_id = firewall.id,
                    "Firmware update made progress, more updates remain"
                );
                AuditAction::UpdatePartialProgress
            } else {
                tracing::info!(firewall_id = firewall.id, "Firmware update completed");
                AuditAction::UpdateConverged
            };
            self.audit
                .record(
                    AuditEvent::new(action, ResourceType::Firewall)
                        .resource(firewall.id)
                        .firewall(firewall.id)
                        .details(details),
                )
                .await;
        }

        Ok(())
    }

    /// Consume an operator update request. The flag is cleared with a
    /// conditional update so only one check-in ever receives the command.
    async fn dispatch_requested_update(
        &self,
        db: &DbConn,
        firewall_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let cleared = Firewall::update_many()
            .col_expr(firewall::Column::UpdateRequested, Expr::value(false))
            .col_expr(
                firewall::Column::LifecycleStatus,
                Expr::value(LifecycleStatus::Updating.to_value()),
            )
            .col_expr(firewall::Column::UpdatesAvailable, Expr::value(false))
            .col_expr(
                firewall::Column::LastUpdateCheck,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .col_expr(firewall::Column::RebootRequired, Expr::value(true))
            .col_expr(firewall::Column::UpdatedAt, Expr::value(now))
            .filter(firewall::Column::Id.eq(firewall_id))
            .filter(firewall::Column::UpdateRequested.eq(true))
            .exec(db)
            .await?;

        if cleared.rows_affected != 1 {
            return Ok(None);
        }

        tracing::info!(firewall_id, "Dispatching requested firmware update");
        self.audit
            .record(
                AuditEvent::new(AuditAction::UpdateDispatched, ResourceType::Firewall)
                    .resource(firewall_id)
                    .firewall(firewall_id)
                    .details(serde_json::json!({ "command": self.system_update_command })),
            )
            .await;

        Ok(Some(self.system_update_command.clone()))
    }
}

/// Record an operator's request for a firmware update; the next primary
/// check-in of the firewall picks it up.
///
/// A firewall still `updating` can be asked again: an update that never
/// makes progress would otherwise leave it there for good.
pub async fn request_system_update(
    db: &DbConn,
    audit: &AuditService,
    firewall_id: i64,
) -> Result<firewall::Model> {
    let firewall = Firewall::find_by_id(firewall_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Firewall {} not found", firewall_id)))?;

    if firewall.lifecycle_status == LifecycleStatus::Updating {
        tracing::warn!(firewall_id, "Re-requesting firmware update for a firewall still updating");
    }

    let now = Utc::now();
    Firewall::update_many()
        .col_expr(firewall::Column::UpdateRequested, Expr::value(true))
        .col_expr(
            firewall::Column::LifecycleStatus,
            Expr::value(LifecycleStatus::UpdatePending.to_value()),
        )
        .col_expr(firewall::Column::UpdatedAt, Expr::value(now))
        .filter(firewall::Column::Id.eq(firewall_id))
        .exec(db)
        .await?;

    audit
        .record(
            AuditEvent::new(AuditAction::UpdateRequested, ResourceType::Firewall)
                .resource(firewall_id)
                .firewall(firewall_id)
                .details(serde_json::json!({ "previous_status": firewall.lifecycle_status })),
        )
        .await;

    Firewall::find_by_id(firewall_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Firewall {} not found", firewall_id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_non_numeric() {
        assert_eq!(normalize_version("v2.1.2"), "2.1.2");
        assert_eq!(normalize_version("3.0.0-beta1"), "3.0.01");
        assert_eq!(normalize_version("OPNsense 24.7"), "24.7");
        assert_eq!(normalize_version(""), "");
    }

    #[test]
    fn test_compare_versions_numeric_segments() {
        assert_eq!(compare_versions("2.10.0", "2.9.9"), Ordering::Greater);
        assert_eq!(compare_versions("v3", "3.0.0"), Ordering::Equal);
        assert_eq!(compare_versions("2.1.2", "3.0.0"), Ordering::Less);
        assert_eq!(compare_versions("24.7.1", "24.7"), Ordering::Greater);
    }

    #[test]
    fn test_rules_are_ordered_with_catch_all_last() {
        let rules = remediation_rules();
        let last = rules.last().unwrap();
        assert!((last.matches)("anything"));
        assert_eq!(last.name, "standard_replace");
    }

    #[test]
    fn test_converge_status_only_touches_updating() {
        assert_eq!(
            converge_status(LifecycleStatus::Online, None, None, true),
            LifecycleStatus::Online
        );
        assert_eq!(
            converge_status(LifecycleStatus::UpdatePending, None, None, false),
            LifecycleStatus::UpdatePending
        );
    }

    #[test]
    fn test_converge_status_updating_cases() {
        // Nothing left to install
        assert_eq!(
            converge_status(LifecycleStatus::Updating, Some("24.7"), Some("24.7"), false),
            LifecycleStatus::Online
        );
        // Partial progress
        assert_eq!(
            converge_status(LifecycleStatus::Updating, Some("24.7"), Some("24.7.1"), true),
            LifecycleStatus::Online
        );
        // No progress yet
        assert_eq!(
            converge_status(LifecycleStatus::Updating, Some("24.7"), Some("24.7"), true),
            LifecycleStatus::Updating
        );
        // Unknown previous version cannot prove progress
        assert_eq!(
            converge_status(LifecycleStatus::Updating, None, Some("24.7"), true),
            LifecycleStatus::Updating
        );
    }
}
