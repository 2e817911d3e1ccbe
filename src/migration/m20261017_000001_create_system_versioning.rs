//! Migration: Create system_versioning table.
//!
//! One row per applied Schema/Data script. Scripts insert their own row, so
//! the identity is the script id rather than a generated value.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE TABLE IF NOT EXISTS system_versioning (
                    scriptid INT PRIMARY KEY,
                    name VARCHAR(250) NOT NULL,
                    version INT NOT NULL,
                    creationday TIMESTAMP NOT NULL,
                    impactedday TIMESTAMP NOT NULL
                );
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TABLE IF EXISTS system_versioning;")
            .await?;

        Ok(())
    }
}
