pub mod audit_log;
pub mod firewall;
pub mod firewall_command;
pub mod proxy_request;
pub mod telemetry_sample;

#[allow(unused_imports)]
pub mod prelude {
    pub use super::audit_log::{self, Entity as AuditLog};
    pub use super::bandwidth_test::{self, Entity as BandwidthTest};
    pub use super::firewall::{self, Entity as Firewall};
    pub use super::firewall_command::{self, Entity as FirewallCommand};
    pub use super::proxy_request::{self, Entity as ProxyRequest};
    pub use super::telemetry_sample::{self, Entity as TelemetrySample};
}
