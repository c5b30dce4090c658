//! Wire format spoken by the firewall agents.
//!
//! Agents are shell scripts of varying age, so the request side is lenient:
//! every field is optional, numbers may arrive as strings and booleans as
//! `0`/`1`. Anything an older agent leaves out is simply absent.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::models::firewall_command::{self, CommandChannel};
use crate::models::proxy_request;

/// Which of the two agents on a firewall is calling in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    #[default]
    Primary,
    Update,
}

impl AgentType {
    pub fn channel(self) -> CommandChannel {
        match self {
            AgentType::Primary => CommandChannel::Primary,
            AgentType::Update => CommandChannel::Update,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckinRequest {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub firewall_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub hardware_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub agent_version: Option<String>,
    #[serde(default)]
    pub agent_type: AgentType,

    // Network telemetry
    #[serde(default, deserialize_with = "lenient_string")]
    pub wan_ip: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub lan_ip: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub ipv6_address: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub wan_netmask: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub wan_gateway: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub wan_dns_primary: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub wan_dns_secondary: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub lan_netmask: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub lan_network: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub uptime: Option<String>,

    pub traffic_stats: Option<TrafficStats>,
    pub system_stats: Option<SystemStats>,
    pub latency_stats: Option<LatencyStats>,
    pub opnsense_updates: Option<UpdateReport>,

    // Result submission
    #[serde(default, deserialize_with = "lenient_i64")]
    pub command_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: Option<String>,
    /// Command output exactly as sent; may be base64
    #[serde(default, deserialize_with = "verbatim_string")]
    pub result: Option<String>,
}

impl CheckinRequest {
    /// A request carrying a `command_id` reports a result instead of polling
    pub fn is_result_submission(&self) -> bool {
        self.command_id.is_some()
    }

    pub fn has_stats(&self) -> bool {
        self.traffic_stats.is_some() || self.system_stats.is_some() || self.latency_stats.is_some()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrafficStats {
    #[serde(default, deserialize_with = "lenient_string")]
    pub interface: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub bytes_in: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub bytes_out: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub packets_in: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub packets_out: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SystemStats {
    #[serde(default, alias = "cpu_usage", deserialize_with = "lenient_f64")]
    pub cpu_percent: Option<f64>,
    #[serde(default, alias = "memory_usage", deserialize_with = "lenient_f64")]
    pub memory_percent: Option<f64>,
    #[serde(default, alias = "disk_usage", deserialize_with = "lenient_f64")]
    pub disk_percent: Option<f64>,
    #[serde(default, alias = "load_avg", deserialize_with = "lenient_f64")]
    pub load_average: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LatencyStats {
    #[serde(default, alias = "avg_latency", deserialize_with = "lenient_f64")]
    pub latency_ms: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub packet_loss: Option<f64>,
}

/// The agent's own view of pending firmware updates
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateReport {
    #[serde(default, deserialize_with = "lenient_bool")]
    pub updates_available: bool,
    #[serde(default, deserialize_with = "lenient_string")]
    pub current_version: Option<String>,
    #[serde(
        default,
        alias = "latest_version",
        alias = "new_version",
        deserialize_with = "lenient_string"
    )]
    pub available_version: Option<String>,
}

/// Reply to a regular poll
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct CheckinResponse {
    pub success: bool,
    pub firewall_id: i64,
    /// Seconds until the agent should poll again
    pub checkin_interval: u64,
    pub server_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_check_performed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updates_available: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_update_available: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_agent_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_update_command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_update_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opnsense_update_requested: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opnsense_update_command: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub queued_commands: Vec<QueuedCommand>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pending_requests: Vec<PendingProxyRequest>,
}

impl CheckinResponse {
    pub fn new(firewall_id: i64, checkin_interval: u64, server_time: String) -> Self {
        Self {
            success: true,
            firewall_id,
            checkin_interval,
            server_time,
            update_check_performed: None,
            updates_available: None,
            agent_update_available: None,
            latest_agent_version: None,
            agent_update_command: None,
            agent_update_url: None,
            opnsense_update_requested: None,
            opnsense_update_command: None,
            queued_commands: Vec::new(),
            pending_requests: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct QueuedCommand {
    pub id: i64,
    pub command: String,
    pub description: Option<String>,
}

impl From<firewall_command::Model> for QueuedCommand {
    fn from(cmd: firewall_command::Model) -> Self {
        Self {
            id: cmd.id,
            command: cmd.command,
            description: cmd.description,
        }
    }
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct PendingProxyRequest {
    pub id: i64,
    pub tunnel_port: i32,
    pub client_id: String,
    pub method: String,
    pub path: String,
    #[schema(value_type = Object)]
    pub headers: Value,
    pub body: Option<String>,
}

impl From<proxy_request::Model> for PendingProxyRequest {
    fn from(req: proxy_request::Model) -> Self {
        let headers = serde_json::from_str(&req.headers)
            .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
        Self {
            id: req.id,
            tunnel_port: req.tunnel_port,
            client_id: req.client_id,
            method: req.method,
            path: req.path,
            headers,
            body: req.body,
        }
    }
}

/// Reply to a command result submission
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct ResultAck {
    pub success: bool,
    pub message: String,
    pub command_id: i64,
    pub status: String,
}

/// Either shape the agent endpoint can answer with
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum AgentReply {
    Checkin(Box<CheckinResponse>),
    Result(ResultAck),
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Some(other) => Some(other.to_string()),
    })
}

/// Like [`lenient_string`] but never trims or drops blank text
fn verbatim_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("expected an integer, got {}", n))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("expected an integer, got {:?}", s))),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected an integer, got {}",
            other
        ))),
    }
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    })
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Bool(b)) => b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
        Some(Value::String(s)) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes"
        ),
        _ => false,
    })
}
