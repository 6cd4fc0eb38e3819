use crate::error::{AppError, Result};
use sea_orm_migration::{MigrationTrait, MigratorTrait};

use super::m20250301_000001_create_billing_tables;

/// Migrator for the tables owned by this service.
///
/// CRM tables (workspaces, companies, contacts, ...) belong to the CRM and
/// are only read here.
pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20250301_000001_create_billing_tables::Migration)]
    }
}

/// Run pending migrations
///
/// # Example
///
/// ```rust,ignore
/// use crm_billing::database::{Migrator, run_migrations};
///
/// run_migrations::<Migrator>(&db).await?;
/// ```
pub async fn run_migrations<M: MigratorTrait>(db: &sea_orm::DatabaseConnection) -> Result<()> {
    M::up(db, None)
        .await
        .map_err(|e| AppError::internal(format!("Migration failed: {}", e)))?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}

/// Rollback the last `steps` migrations (default one)
pub async fn rollback_migration<M: MigratorTrait>(
    db: &sea_orm::DatabaseConnection,
    steps: Option<u32>,
) -> Result<()> {
    M::down(db, steps)
        .await
        .map_err(|e| AppError::internal(format!("Rollback failed: {}", e)))?;

    tracing::info!("Rolled back {} migration(s)", steps.unwrap_or(1));
    Ok(())
}
