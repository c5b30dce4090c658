//! Migration: Create firewall_commands table

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
                    .table(FirewallCommands::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FirewallCommands::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(FirewallCommands::FirewallId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(FirewallCommands::Command).text().not_null())
                    .col(ColumnDef::new(FirewallCommands::Description).string().null())
                    .col(
                        ColumnDef::new(FirewallCommands::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(FirewallCommands::IsUpdateCommand)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(FirewallCommands::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FirewallCommands::SentAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(FirewallCommands::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(FirewallCommands::Result).text().null())
                    .foreign_key(
                        ForeignKey::create()
                            .from(FirewallCommands::Table, FirewallCommands::FirewallId)
                            .to(Firewalls::Table, Firewalls::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Lease and reclaim both scan one firewall's queue by status
        manager
            .create_index(
                Index::create()
                    .name("idx_firewall_commands_queue")
                    .table(FirewallCommands::Table)
                    .col(FirewallCommands::FirewallId)
                    .col(FirewallCommands::Status)
                    .col(FirewallCommands::IsUpdateCommand)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_firewall_commands_created_at")
                    .table(FirewallCommands::Table)
                    .col(FirewallCommands::CreatedAt)
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
                    .table(FirewallCommands::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await
    }
}

#[derive(Iden)]
#[iden = "firewall_commands"]
enum FirewallCommands {
    Table,
    Id,
    #[iden = "firewall_id"]
    FirewallId,
    Command,
    Description,
    Status,
    #[iden = "is_update_command"]
    IsUpdateCommand,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "sent_at"]
    SentAt,
    #[iden = "completed_at"]
    CompletedAt,
    Result,
}
