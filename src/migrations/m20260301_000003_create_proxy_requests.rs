//! Migration: Create proxy_requests table

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
                    .table(ProxyRequests::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProxyRequests::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ProxyRequests::FirewallId).big_integer().not_null())
                    .col(ColumnDef::new(ProxyRequests::ClientId).string().not_null())
                    .col(ColumnDef::new(ProxyRequests::TunnelPort).integer().not_null())
                    .col(ColumnDef::new(ProxyRequests::Method).string_len(16).not_null())
                    .col(ColumnDef::new(ProxyRequests::Path).text().not_null())
                    .col(ColumnDef::new(ProxyRequests::Headers).text().not_null())
                    .col(ColumnDef::new(ProxyRequests::Body).text().null())
                    .col(
                        ColumnDef::new(ProxyRequests::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(ProxyRequests::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProxyRequests::DeliveredAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(ProxyRequests::Table, ProxyRequests::FirewallId)
                            .to(Firewalls::Table, Firewalls::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_proxy_requests_queue")
                    .table(ProxyRequests::Table)
                    .col(ProxyRequests::FirewallId)
                    .col(ProxyRequests::Status)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ProxyRequests::Table).if_exists().to_owned())
            .await
    }
}

#[derive(Iden)]
#[iden = "proxy_requests"]
enum ProxyRequests {
    Table,
    Id,
    #[iden = "firewall_id"]
    FirewallId,
    #[iden = "client_id"]
    ClientId,
    #[iden = "tunnel_port"]
    TunnelPort,
    Method,
    Path,
    Headers,
    Body,
    Status,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "delivered_at"]
    DeliveredAt,
}
