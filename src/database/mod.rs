//! Database connection and schema management.
//!
//! SeaORM over Postgres in production, SQLite in tests.

pub mod config;
mod m20250301_000001_create_billing_tables;
pub mod migration;

pub use config::{DatabaseConfig, redact_database_url};
pub use m20250301_000001_create_billing_tables::SENT_PERIOD_INDEX;
pub use migration::{Migrator, rollback_migration, run_migrations};

use crate::error::{AppError, Result};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::time::Duration;

/// Open a pooled connection from config.
///
/// The URL is logged in redacted form only.
pub async fn connect(config: &DatabaseConfig) -> Result<DatabaseConnection> {
    let mut opt = ConnectOptions::new(&config.url);
    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(Duration::from_secs(config.connect_timeout))
        .sqlx_logging(false);
    if config.idle_timeout > 0 {
        opt.idle_timeout(Duration::from_secs(config.idle_timeout));
    }

    let conn = Database::connect(opt)
        .await
        .map_err(|e| AppError::internal(format!("Failed to connect to database: {}", e)))?;

    tracing::info!(
        url = %redact_database_url(&config.url),
        max_connections = config.max_connections,
        "Database connected"
    );

    Ok(conn)
}
