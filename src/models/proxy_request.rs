use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, utoipa::ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum ProxyRequestStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "delivered")]
    Delivered,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, utoipa::ToSchema)]
#[schema(as = ProxyRequestRecord)]
#[sea_orm(table_name = "proxy_requests")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub firewall_id: i64,
    /// Correlation token of the tunnel session waiting for the response
    pub client_id: String,
    pub tunnel_port: i32,
    pub method: String,
    pub path: String,
    /// JSON object of header name to value
    #[sea_orm(column_type = "Text")]
    pub headers: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub body: Option<String>,
    pub status: ProxyRequestStatus,
    #[schema(value_type = String)]
    pub created_at: DateTimeUtc,
    #[schema(value_type = Option<String>)]
    pub delivered_at: Option<DateTimeUtc>,
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
