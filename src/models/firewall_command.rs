use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Delivery state of a queued command
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, utoipa::ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "sent")]
    Sent,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl CommandStatus {
    pub fn is_resolved(self) -> bool {
        matches!(self, CommandStatus::Completed | CommandStatus::Failed)
    }

    /// Parse a status reported by an agent. Only terminal states are accepted.
    pub fn from_result(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "completed" | "success" => Some(CommandStatus::Completed),
            "failed" | "error" => Some(CommandStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandStatus::Pending => write!(f, "pending"),
            CommandStatus::Sent => write!(f, "sent"),
            CommandStatus::Completed => write!(f, "completed"),
            CommandStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Queue partition a command belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CommandChannel {
    #[default]
    Primary,
    Update,
}

impl CommandChannel {
    pub fn is_update(self) -> bool {
        matches!(self, CommandChannel::Update)
    }
}

impl std::fmt::Display for CommandChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandChannel::Primary => write!(f, "primary"),
            CommandChannel::Update => write!(f, "update"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, utoipa::ToSchema)]
#[schema(as = FirewallCommand)]
#[sea_orm(table_name = "firewall_commands")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub firewall_id: i64,
    /// Shell instruction executed by the agent
    #[sea_orm(column_type = "Text")]
    pub command: String,
    pub description: Option<String>,
    pub status: CommandStatus,
    /// Reserved for the update agent rather than the primary agent
    pub is_update_command: bool,
    #[schema(value_type = String)]
    pub created_at: DateTimeUtc,
    #[schema(value_type = Option<String>)]
    pub sent_at: Option<DateTimeUtc>,
    #[schema(value_type = Option<String>)]
    pub completed_at: Option<DateTimeUtc>,
    #[sea_orm(column_type = "Text", nullable)]
    pub result: Option<String>,
}

impl Model {
    pub fn channel(&self) -> CommandChannel {
        if self.is_update_command {
            CommandChannel::Update
        } else {
            CommandChannel::Primary
        }
    }

    /// Whether this command runs the connectivity benchmark
    pub fn is_speedtest(&self) -> bool {
        let matches = |s: &str| s.to_ascii_lowercase().contains("speedtest");
        matches(&self.command) || self.description.as_deref().is_some_and(matches)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::firewall::Entity",
        from = "Column::FirewallId",
        to = "super::firewall::Column::Id",
        on_delete = "Cascade"
    )]
    Firewall,
}

impl Related<super::firewall::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Firewall.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
