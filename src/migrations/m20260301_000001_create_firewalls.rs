//! Migration: Create firewalls table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Firewalls::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Firewalls::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Firewalls::Name).string().not_null())
                    .col(
                        ColumnDef::new(Firewalls::HardwareId)
                            .string()
                            .null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Firewalls::Description).string().null())
                    .col(
                        ColumnDef::new(Firewalls::LastCheckin)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Firewalls::AgentVersion).string().null())
                    .col(ColumnDef::new(Firewalls::UpdateAgentVersion).string().null())
                    .col(
                        ColumnDef::new(Firewalls::UpdateAgentLastCheckin)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Firewalls::WanIp).string().null())
                    .col(ColumnDef::new(Firewalls::LanIp).string().null())
                    .col(ColumnDef::new(Firewalls::Ipv6Address).string().null())
                    .col(ColumnDef::new(Firewalls::WanNetmask).string().null())
                    .col(ColumnDef::new(Firewalls::WanGateway).string().null())
                    .col(ColumnDef::new(Firewalls::WanDnsPrimary).string().null())
                    .col(ColumnDef::new(Firewalls::WanDnsSecondary).string().null())
                    .col(ColumnDef::new(Firewalls::LanNetmask).string().null())
                    .col(ColumnDef::new(Firewalls::LanNetwork).string().null())
                    .col(ColumnDef::new(Firewalls::Uptime).string().null())
                    .col(
                        ColumnDef::new(Firewalls::LifecycleStatus)
                            .string_len(16)
                            .not_null()
                            .default("online"),
                    )
                    .col(
                        ColumnDef::new(Firewalls::UpdateRequested)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Firewalls::CurrentVersion).string().null())
                    .col(ColumnDef::new(Firewalls::AvailableVersion).string().null())
                    .col(
                        ColumnDef::new(Firewalls::UpdatesAvailable)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Firewalls::LastUpdateCheck)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Firewalls::RebootRequired)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Firewalls::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Firewalls::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Firewalls::Table).if_exists().to_owned())
            .await
    }
}

#[derive(Iden)]
#[iden = "firewalls"]
pub enum Firewalls {
    Table,
    Id,
    Name,
    #[iden = "hardware_id"]
    HardwareId,
    Description,
    #[iden = "last_checkin"]
    LastCheckin,
    #[iden = "agent_version"]
    AgentVersion,
    #[iden = "update_agent_version"]
    UpdateAgentVersion,
    #[iden = "update_agent_last_checkin"]
    UpdateAgentLastCheckin,
    #[iden = "wan_ip"]
    WanIp,
    #[iden = "lan_ip"]
    LanIp,
    #[iden = "ipv6_address"]
    Ipv6Address,
    #[iden = "wan_netmask"]
    WanNetmask,
    #[iden = "wan_gateway"]
    WanGateway,
    #[iden = "wan_dns_primary"]
    WanDnsPrimary,
    #[iden = "wan_dns_secondary"]
    WanDnsSecondary,
    #[iden = "lan_netmask"]
    LanNetmask,
    #[iden = "lan_network"]
    LanNetwork,
    Uptime,
    #[iden = "lifecycle_status"]
    LifecycleStatus,
    #[iden = "update_requested"]
    UpdateRequested,
    #[iden = "current_version"]
    CurrentVersion,
    #[iden = "available_version"]
    AvailableVersion,
    #[iden = "updates_available"]
    UpdatesAvailable,
    #[iden = "last_update_check"]
    LastUpdateCheck,
    #[iden = "reboot_required"]
    RebootRequired,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "updated_at"]
    UpdatedAt,
}
