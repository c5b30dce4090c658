use std::env;
use std::time::Duration;

use super::env_parse;

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub database_url: String,
    /// Pool size. Every check-in holds a connection briefly while leasing.
    pub max_connections: u32,
    pub connect_timeout: Duration,
}

impl DatabaseConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("OPNFLEET_DATABASE_URL")
                .or_else(|_| env::var("DATABASE_URL"))
                .unwrap_or_else(|_| "sqlite://opnfleet.db?mode=rwc".to_string()),
            max_connections: env_parse("OPNFLEET_DATABASE_MAX_CONNECTIONS", 10),
            connect_timeout: Duration::from_secs(env_parse("OPNFLEET_DATABASE_TIMEOUT", 30)),
        }
    }

    pub fn is_sqlite(&self) -> bool {
        self.database_url.starts_with("sqlite:")
    }
}
