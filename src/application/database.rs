//! Database connection setup. Migrations always run before the pool is
//! handed out, so every process sees the same schema.

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;

use crate::config::database::DatabaseConfig;
use crate::config::CONFIG;
use crate::error::{AppError, Result};
use crate::migrations::Migrator;

pub type DbConn = DatabaseConnection;

/// Connect using the process configuration
pub async fn connect() -> Result<DbConn> {
    connect_with(&CONFIG.database).await
}

/// Connect to a specific URL with default pool settings
pub async fn connect_with_url(database_url: &str) -> Result<DbConn> {
    let mut config = DatabaseConfig::from_env();
    config.database_url = database_url.to_string();
    connect_with(&config).await
}

pub async fn connect_with(config: &DatabaseConfig) -> Result<DbConn> {
    tracing::info!(sqlite = config.is_sqlite(), "Connecting to database");

    let db = Database::connect(connect_options(config))
        .await
        .map_err(|e| AppError::Internal(format!("Failed to connect to database: {}", e)))?;

    Migrator::up(&db, None)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to run migrations: {}", e)))?;
    tracing::info!("Database schema is up to date");

    Ok(db)
}

fn connect_options(config: &DatabaseConfig) -> ConnectOptions {
    // A SQLite file has a single writer; more connections only add lock waits
    let max_connections = if config.is_sqlite() {
        1
    } else {
        config.max_connections.max(1)
    };

    let mut opts = ConnectOptions::new(config.database_url.clone());
    opts.max_connections(max_connections)
        .min_connections(1)
        .connect_timeout(config.connect_timeout)
        .sqlx_logging(false);
    opts
}
