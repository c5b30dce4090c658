use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::firewall::{self, LifecycleStatus};

#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct CreateFirewall {
    pub name: String,
    pub hardware_id: Option<String>,
    pub description: Option<String>,
}

/// Operator-facing view of a firewall.
///
/// `status` is the effective status: the stored update lifecycle when an
/// update is in flight, otherwise online/offline by check-in recency.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct FirewallResponse {
    pub id: i64,
    pub name: String,
    pub hardware_id: Option<String>,
    pub description: Option<String>,
    pub status: LifecycleStatus,
    #[schema(value_type = Option<String>)]
    pub last_checkin: Option<DateTime<Utc>>,
    pub agent_version: Option<String>,
    pub update_agent_version: Option<String>,
    pub wan_ip: Option<String>,
    pub lan_ip: Option<String>,
    pub ipv6_address: Option<String>,
    pub uptime: Option<String>,
    pub current_version: Option<String>,
    pub available_version: Option<String>,
    pub updates_available: bool,
    pub update_requested: bool,
    pub reboot_required: bool,
    #[schema(value_type = Option<String>)]
    pub last_update_check: Option<DateTime<Utc>>,
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
}

impl FirewallResponse {
    pub fn from_model(firewall: firewall::Model, status: LifecycleStatus) -> Self {
        Self {
            id: firewall.id,
            name: firewall.name,
            hardware_id: firewall.hardware_id,
            description: firewall.description,
            status,
            last_checkin: firewall.last_checkin,
            agent_version: firewall.agent_version,
            update_agent_version: firewall.update_agent_version,
            wan_ip: firewall.wan_ip,
            lan_ip: firewall.lan_ip,
            ipv6_address: firewall.ipv6_address,
            uptime: firewall.uptime,
            current_version: firewall.current_version,
            available_version: firewall.available_version,
            updates_available: firewall.updates_available,
            update_requested: firewall.update_requested,
            reboot_required: firewall.reboot_required,
            last_update_check: firewall.last_update_check,
            created_at: firewall.created_at,
        }
    }
}
