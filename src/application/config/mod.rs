//! Process configuration, read from `OPNFLEET_*` environment variables once
//! at first use.

pub mod database;
pub mod fleet;
pub mod server;

use once_cell::sync::Lazy;
use std::env;
use std::str::FromStr;

pub use database::DatabaseConfig;
pub use fleet::FleetConfig;
pub use server::ServerConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub fleet: FleetConfig,
    pub build: BuildInfo,
    /// Default filter level for the `opnfleet` target when `RUST_LOG` is unset
    pub log_level: String,
    /// `json` for one JSON object per line, anything else for plain text
    pub log_format: String,
}

/// Reported by the version endpoint
#[derive(Debug, Clone)]
pub struct BuildInfo {
    pub version: &'static str,
    pub commit_hash: String,
    pub build_time: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig::from_env(),
            database: DatabaseConfig::from_env(),
            fleet: FleetConfig::from_env(),
            build: BuildInfo {
                version: env!("CARGO_PKG_VERSION"),
                commit_hash: env_string("COMMIT_HASH", "unknown"),
                build_time: env_string("BUILD_TIME", "unknown"),
            },
            log_level: env_string("OPNFLEET_LOG_LEVEL", "info"),
            log_format: env_string("OPNFLEET_LOG_FORMAT", "text"),
        }
    }
}

pub static CONFIG: Lazy<Config> = Lazy::new(Config::from_env);

pub(crate) fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parsed value of `key`; unset or unparseable falls back to `default`
pub(crate) fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Ignoring unparseable setting");
            default
        }),
        Err(_) => default,
    }
}
