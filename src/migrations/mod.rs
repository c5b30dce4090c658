pub use sea_orm_migration::prelude::*;

mod m20260301_000001_create_firewalls;
mod m20260301_000002_create_firewall_commands;
mod m20260301_000003_create_proxy_requests;
mod m20260301_000005_create_telemetry_samples;
mod m20260301_000006_create_audit_logs;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_000001_create_firewalls::Migration),
            Box::new(m20260301_000002_create_firewall_commands::Migration),
            Box::new(m20260301_000003_create_proxy_requests::Migration),
            Box::new(m20260301_000004_create_bandwidth_tests::Migration),
            Box::new(m20260301_000005_create_telemetry_samples::Migration),
            Box::new(m20260301_000006_create_audit_logs::Migration),
        ]
    }
}
