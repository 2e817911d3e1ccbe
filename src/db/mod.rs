//! Database module providing connection management, command execution and
//! the generic entity persistence layer.

pub mod broker;
pub mod executor;
pub mod mapping;
pub mod params;
pub mod system_versioning;
pub mod system_versioning_log;

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use tracing::info;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::migration::Migrator;

pub use broker::EntityBroker;
pub use executor::{CommandExecutor, ScriptMode};
pub use mapping::{Entity, EntityState, EntityStatus, MappingRegistry, Record};
pub use params::{ParamValue, Params};

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct DbPool {
    conn: DatabaseConnection,
}

impl DbPool {
    /// Connect using the configured URL and pool size.
    pub async fn new(config: &Config) -> AppResult<Self> {
        let mut opts = ConnectOptions::new(config.database.url.clone());
        opts.max_connections(config.database.max_connections)
            .connect_timeout(config.database.command_timeout())
            .sqlx_logging(false);

        let conn = Database::connect(opts)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to database: {}", e)))?;

        Ok(Self { conn })
    }

    /// Wrap an existing connection (mock connections in tests).
    pub fn from_connection(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Create the versioning bookkeeping tables when missing.
    pub async fn run_migrations(&self) -> AppResult<()> {
        Migrator::up(&self.conn, None)
            .await
            .map_err(|e| AppError::Database(format!("Failed to run migrations: {}", e)))?;
        info!("Versioning tables are up to date");
        Ok(())
    }
}
