use super::{env_parse, env_string};
use std::time::Duration;

/// Tunables for the check-in and dispatch core, shared by the services
/// behind an `Arc`.
#[derive(Debug, Clone)]
pub struct FleetConfig {
    /// Newest agent release; older agents are told to upgrade.
    pub latest_agent_version: String,
    /// Base URL agents fetch installers and repair scripts from.
    pub public_url: String,
    pub primary_checkin_interval_secs: u64,
    pub update_checkin_interval_secs: u64,
    /// A command leased longer than this without a result goes back to pending.
    pub lease_timeout_secs: u64,
    pub command_batch_size: u64,
    pub proxy_batch_size: u64,
    /// Minimum spacing between firmware update checks for one firewall.
    pub update_check_interval_secs: u64,
    /// A firewall not seen for longer than this is reported offline.
    pub offline_threshold_secs: u64,
    pub system_update_command: String,
    /// Queued by the dashboard's bandwidth test action; must print the
    /// result as JSON.
    pub speedtest_command: String,
    pub retention_days: i64,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            latest_agent_version: "3.0.0".to_string(),
            public_url: "https://opnfleet.local".to_string(),
            primary_checkin_interval_secs: 120,
            update_checkin_interval_secs: 300,
            lease_timeout_secs: 600,
            command_batch_size: 5,
            proxy_batch_size: 10,
            update_check_interval_secs: 5 * 60 * 60,
            offline_threshold_secs: 600,
            system_update_command: "/usr/local/etc/rc.firmware upgrade".to_string(),
            speedtest_command: "/usr/local/bin/opnfleet_speedtest.sh --json".to_string(),
            retention_days: 30,
        }
    }
}

impl FleetConfig {
    pub fn from_env() -> Self {
        let d = Self::default();

        Self {
            latest_agent_version: env_string(
                "OPNFLEET_LATEST_AGENT_VERSION",
                &d.latest_agent_version,
            ),
            public_url: env_string("OPNFLEET_PUBLIC_URL", &d.public_url)
                .trim_end_matches('/')
                .to_string(),
            primary_checkin_interval_secs: env_parse(
                "OPNFLEET_CHECKIN_INTERVAL",
                d.primary_checkin_interval_secs,
            ),
            update_checkin_interval_secs: env_parse(
                "OPNFLEET_UPDATE_AGENT_CHECKIN_INTERVAL",
                d.update_checkin_interval_secs,
            ),
            lease_timeout_secs: env_parse("OPNFLEET_LEASE_TIMEOUT", d.lease_timeout_secs),
            command_batch_size: env_parse("OPNFLEET_COMMAND_BATCH_SIZE", d.command_batch_size),
            proxy_batch_size: env_parse("OPNFLEET_PROXY_BATCH_SIZE", d.proxy_batch_size),
            update_check_interval_secs: env_parse(
                "OPNFLEET_UPDATE_CHECK_INTERVAL",
                d.update_check_interval_secs,
            ),
            offline_threshold_secs: env_parse(
                "OPNFLEET_OFFLINE_THRESHOLD",
                d.offline_threshold_secs,
            ),
            system_update_command: env_string(
                "OPNFLEET_SYSTEM_UPDATE_COMMAND",
                &d.system_update_command,
            ),
            speedtest_command: env_string("OPNFLEET_SPEEDTEST_COMMAND", &d.speedtest_command),
            retention_days: env_parse("OPNFLEET_RETENTION_DAYS", d.retention_days),
        }
    }

    pub fn lease_timeout(&self) -> Duration {
        Duration::from_secs(self.lease_timeout_secs)
    }

    pub fn update_check_interval(&self) -> Duration {
        Duration::from_secs(self.update_check_interval_secs)
    }

    pub fn offline_threshold(&self) -> Duration {
        Duration::from_secs(self.offline_threshold_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_protocol_constants() {
        let config = FleetConfig::default();
        assert_eq!(config.command_batch_size, 5);
        assert_eq!(config.proxy_batch_size, 10);
        assert_eq!(config.lease_timeout(), Duration::from_secs(600));
        assert_eq!(config.update_check_interval(), Duration::from_secs(18_000));
        assert!(config.primary_checkin_interval_secs < config.update_checkin_interval_secs);
    }
}
