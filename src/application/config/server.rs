use std::env;

use super::{env_parse, env_string};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins for the dashboard, parsed from
    /// `OPNFLEET_ALLOWED_ORIGINS` (comma-separated). Empty means any origin.
    pub allowed_origins: Vec<String>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let allowed_origins = env::var("OPNFLEET_ALLOWED_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            host: env_string("OPNFLEET_API_HOST", "0.0.0.0"),
            port: env_parse("OPNFLEET_API_PORT", 8000),
            allowed_origins,
        }
    }
}
