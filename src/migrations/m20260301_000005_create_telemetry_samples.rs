//! Migration: Create telemetry_samples table

use sea_orm_migration::prelude::*;

use super::m20260301_000001_create_firewalls::Firewalls;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TelemetrySamples::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TelemetrySamples::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TelemetrySamples::FirewallId).big_integer().not_null())
                    .col(
                        ColumnDef::new(TelemetrySamples::RecordedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(TelemetrySamples::Interface).string().null())
                    .col(ColumnDef::new(TelemetrySamples::BytesIn).big_integer().null())
                    .col(ColumnDef::new(TelemetrySamples::BytesOut).big_integer().null())
                    .col(ColumnDef::new(TelemetrySamples::PacketsIn).big_integer().null())
                    .col(ColumnDef::new(TelemetrySamples::PacketsOut).big_integer().null())
                    .col(ColumnDef::new(TelemetrySamples::CpuPercent).double().null())
                    .col(ColumnDef::new(TelemetrySamples::MemoryPercent).double().null())
                    .col(ColumnDef::new(TelemetrySamples::DiskPercent).double().null())
                    .col(ColumnDef::new(TelemetrySamples::LoadAverage).double().null())
                    .col(ColumnDef::new(TelemetrySamples::LatencyMs).double().null())
                    .col(ColumnDef::new(TelemetrySamples::PacketLoss).double().null())
                    .foreign_key(
                        ForeignKey::create()
                            .from(TelemetrySamples::Table, TelemetrySamples::FirewallId)
                            .to(Firewalls::Table, Firewalls::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_telemetry_samples_firewall_time")
                    .table(TelemetrySamples::Table)
                    .col(TelemetrySamples::FirewallId)
                    .col(TelemetrySamples::RecordedAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(TelemetrySamples::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await
    }
}

#[derive(Iden)]
#[iden = "telemetry_samples"]
enum TelemetrySamples {
    Table,
    Id,
    #[iden = "firewall_id"]
    FirewallId,
    #[iden = "recorded_at"]
    RecordedAt,
    Interface,
    #[iden = "bytes_in"]
    BytesIn,
    #[iden = "bytes_out"]
    BytesOut,
    #[iden = "packets_in"]
    PacketsIn,
    #[iden = "packets_out"]
    PacketsOut,
    #[iden = "cpu_percent"]
    CpuPercent,
    #[iden = "memory_percent"]
    MemoryPercent,
    #[iden = "disk_percent"]
    DiskPercent,
    #[iden = "load_average"]
    LoadAverage,
    #[iden = "latency_ms"]
    LatencyMs,
    #[iden = "packet_loss"]
    PacketLoss,
}
