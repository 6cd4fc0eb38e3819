//! SQLite test database with the billing schema and the CRM tables.
//!
//! Billing tables come from the real migrations. CRM tables are owned by
//! the CRM in production, so here they are created from the read-only
//! entities the directory queries.
//!
//! # Example
//!
//! ```rust,ignore
//! let db = TestDb::new().await?;
//! db.seed(&["INSERT INTO companies (id, workspace_id, name, status) VALUES ('c1', 'w1', 'Acme', 'active_client')"]).await?;
//! let store = SeaOrmBillingStore::new(db.connection());
//! ```

use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, EntityTrait, Schema,
};
use sea_orm_migration::MigratorTrait;

use crate::billing::sea_orm_directory::entity::{company, company_user, contact, project, workspace};
use crate::database::Migrator;

/// An isolated in-memory database.
///
/// Each instance gets its own SQLite memory database; the pool holds a
/// single connection so the database lives as long as the `TestDb`.
pub struct TestDb {
    pub connection: DatabaseConnection,
}

impl TestDb {
    /// Migrated billing schema plus CRM tables.
    pub async fn new() -> Result<Self, DbErr> {
        let db = Self::empty().await?;
        Migrator::up(&db.connection, None).await?;
        db.create_crm_tables().await?;
        Ok(db)
    }

    /// Connection without any schema.
    pub async fn empty() -> Result<Self, DbErr> {
        let mut opt = ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1).min_connections(1).sqlx_logging(false);

        let connection = Database::connect(opt).await?;
        connection
            .execute_unprepared("PRAGMA busy_timeout=5000;")
            .await?;

        Ok(Self { connection })
    }

    async fn create_crm_tables(&self) -> Result<(), DbErr> {
        self.create_table(workspace::Entity).await?;
        self.create_table(company::Entity).await?;
        self.create_table(contact::Entity).await?;
        self.create_table(project::Entity).await?;
        self.create_table(company_user::Entity).await
    }

    async fn create_table<E: EntityTrait>(&self, entity: E) -> Result<(), DbErr> {
        let backend = self.connection.get_database_backend();
        let schema = Schema::new(backend);
        let statement = schema.create_table_from_entity(entity);
        self.connection.execute(backend.build(&statement)).await?;
        Ok(())
    }

    /// Get a clone of the database connection
    pub fn connection(&self) -> DatabaseConnection {
        self.connection.clone()
    }

    /// Execute raw SQL statements, in order.
    pub async fn seed(&self, statements: &[&str]) -> Result<(), DbErr> {
        for statement in statements {
            self.connection.execute_unprepared(statement).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::Statement;

    #[tokio::test]
    async fn test_schema_is_created() {
        let db = TestDb::new().await.unwrap();

        let rows = db
            .connection
            .query_all(Statement::from_string(
                db.connection.get_database_backend(),
                "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
            ))
            .await
            .unwrap();
        let tables: Vec<String> = rows
            .iter()
            .filter_map(|row| row.try_get::<String>("", "name").ok())
            .collect();

        for expected in ["billing_history", "billing_items", "billing_profiles", "companies", "contacts"] {
            assert!(tables.iter().any(|t| t == expected), "missing table {expected}");
        }
    }

    #[tokio::test]
    async fn test_instances_are_isolated() {
        let first = TestDb::new().await.unwrap();
        let second = TestDb::new().await.unwrap();

        first
            .seed(&["INSERT INTO projects (id, company_id, status) VALUES ('p1', 'c1', 'active')"])
            .await
            .unwrap();

        let rows = second
            .connection
            .query_all(Statement::from_string(
                second.connection.get_database_backend(),
                "SELECT id FROM projects",
            ))
            .await
            .unwrap();
        assert!(rows.is_empty());
    }
}
