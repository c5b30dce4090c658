use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, utoipa::ToSchema)]
#[schema(as = AuditLogEntry)]
#[sea_orm(table_name = "audit_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[schema(value_type = String)]
    pub timestamp: DateTimeUtc,
    pub firewall_id: Option<i64>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    /// Event-specific JSON, stored as text
    pub details: Option<String>,
    pub success: bool,
    pub error_message: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Recorded as the snake_case string from [`AuditAction::as_str`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    FirewallEnrolled,
    /// Agent reported a stale id and was matched by hardware id instead
    FirewallReidentified,
    CommandEnqueued,
    CommandResolved,
    CommandsReclaimed,
    UpdateRequested,
    UpdateDispatched,
    UpdateConverged,
    UpdatePartialProgress,
    ProxyRequestQueued,
}

impl AuditAction {
    pub const fn as_str(self) -> &'static str {
        use AuditAction::*;
        match self {
            FirewallEnrolled => "firewall_enrolled",
            FirewallReidentified => "firewall_reidentified",
            CommandEnqueued => "command_enqueued",
            CommandResolved => "command_resolved",
            CommandsReclaimed => "commands_reclaimed",
            UpdateRequested => "update_requested",
            UpdateDispatched => "update_dispatched",
            UpdateConverged => "update_converged",
            UpdatePartialProgress => "update_partial_progress",
            ProxyRequestQueued => "proxy_request_queued",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Firewall,
    Command,
    ProxyRequest,
}

impl ResourceType {
    pub const fn as_str(self) -> &'static str {
        match self {
            ResourceType::Firewall => "firewall",
            ResourceType::Command => "command",
            ResourceType::ProxyRequest => "proxy_request",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
