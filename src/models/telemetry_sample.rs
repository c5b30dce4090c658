use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One check-in's worth of traffic, system and latency statistics
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "telemetry_samples")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub firewall_id: i64,
    pub recorded_at: DateTimeUtc,
    pub interface: Option<String>,
    pub bytes_in: Option<i64>,
    pub bytes_out: Option<i64>,
    pub packets_in: Option<i64>,
    pub packets_out: Option<i64>,
    pub cpu_percent: Option<f64>,
    pub memory_percent: Option<f64>,
    pub disk_percent: Option<f64>,
    pub load_average: Option<f64>,
    pub latency_ms: Option<f64>,
    pub packet_loss: Option<f64>,
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
