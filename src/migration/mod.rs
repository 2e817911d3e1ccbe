//! SeaORM migrations for the versioning bookkeeping tables.

pub use sea_orm_migration::prelude::*;

mod m20261017_000001_create_system_versioning;
mod m20261017_000002_create_system_versioning_log;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261017_000001_create_system_versioning::Migration),
            Box::new(m20261017_000002_create_system_versioning_log::Migration),
        ]
    }
}
