use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct EnqueueCommand {
    pub command: String,
    pub description: Option<String>,
    /// Route the command to the update agent instead of the primary agent
    #[serde(default)]
    pub update_channel: bool,
}

#[derive(Debug, Clone, Deserialize, utoipa::IntoParams)]
pub struct CommandListQuery {
    pub limit: Option<u64>,
}
