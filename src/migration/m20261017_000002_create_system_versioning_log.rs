//! Migration: Create system_versioning_log table.
//!
//! Audit trail of validation problems and executed scripts.
//! logtype: 0 = info, 1 = warning, 2 = error.

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
                CREATE TABLE IF NOT EXISTS system_versioning_log (
                    id SERIAL PRIMARY KEY,
                    message VARCHAR(500) NOT NULL,
                    detailedmessage TEXT,
                    logtype INT NOT NULL DEFAULT 0,
                    relatedscriptid INT,
                    date TIMESTAMP NOT NULL DEFAULT NOW()
                );

                CREATE INDEX IF NOT EXISTS idx_system_versioning_log_relatedscriptid
                    ON system_versioning_log(relatedscriptid);
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TABLE IF EXISTS system_versioning_log;")
            .await?;

        Ok(())
    }
}
