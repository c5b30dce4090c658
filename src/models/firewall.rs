use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Stored lifecycle of a firewall with respect to firmware updates.
///
/// Online/offline as shown to operators is derived from `last_checkin`
/// at read time; only the update flow writes this column.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, utoipa::ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    #[sea_orm(string_value = "online")]
    Online,
    #[sea_orm(string_value = "offline")]
    Offline,
    #[sea_orm(string_value = "updating")]
    Updating,
    #[sea_orm(string_value = "update_pending")]
    UpdatePending,
}

impl std::fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleStatus::Online => write!(f, "online"),
            LifecycleStatus::Offline => write!(f, "offline"),
            LifecycleStatus::Updating => write!(f, "updating"),
            LifecycleStatus::UpdatePending => write!(f, "update_pending"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "firewalls")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    /// Stable hardware fingerprint reported by the agent
    #[sea_orm(unique)]
    pub hardware_id: Option<String>,
    pub description: Option<String>,
    pub last_checkin: Option<DateTimeUtc>,
    pub agent_version: Option<String>,
    pub update_agent_version: Option<String>,
    pub update_agent_last_checkin: Option<DateTimeUtc>,
    pub wan_ip: Option<String>,
    pub lan_ip: Option<String>,
    pub ipv6_address: Option<String>,
    pub wan_netmask: Option<String>,
    pub wan_gateway: Option<String>,
    pub wan_dns_primary: Option<String>,
    pub wan_dns_secondary: Option<String>,
    pub lan_netmask: Option<String>,
    pub lan_network: Option<String>,
    pub uptime: Option<String>,
    pub lifecycle_status: LifecycleStatus,
    pub update_requested: bool,
    pub current_version: Option<String>,
    pub available_version: Option<String>,
    pub updates_available: bool,
    pub last_update_check: Option<DateTimeUtc>,
    pub reboot_required: bool,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::firewall_command::Entity")]
    Commands,
    #[sea_orm(has_many = "super::proxy_request::Entity")]
    ProxyRequests,
    #[sea_orm(has_many = "super::bandwidth_test::Entity")]
    BandwidthTests,
    #[sea_orm(has_many = "super::telemetry_sample::Entity")]
    TelemetrySamples,
}

impl Related<super::firewall_command::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Commands.def()
    }
}

impl Related<super::proxy_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProxyRequests.def()
    }
}

impl Related<super::bandwidth_test::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BandwidthTests.def()
    }
}

impl Related<super::telemetry_sample::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TelemetrySamples.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
