//! Database administration facility: existence checks and descriptive info.
//!
//! Whole-database administration (create, backup, restore) stays outside the
//! engine; only the read-only queries the orchestrator needs live here.

use async_trait::async_trait;
use sea_orm::DbBackend;

use crate::db::system_versioning::MAPPING as VERSIONING_MAPPING;
use crate::db::{CommandExecutor, Params};
use crate::error::AppResult;
use crate::models::{DatabaseInfo, DatabaseServerInfo, VersioningRecordView};

#[async_trait]
pub trait DatabaseAdmin: Send + Sync {
    async fn database_exists(&self, name: &str) -> AppResult<bool>;

    async fn database_info(&self, name: &str) -> AppResult<DatabaseInfo>;

    async fn server_info(&self) -> AppResult<DatabaseServerInfo>;
}

/// [`DatabaseAdmin`] over the versioning connection, using the backend's
/// catalog views.
#[derive(Clone)]
pub struct SqlDatabaseAdmin {
    executor: CommandExecutor,
}

impl SqlDatabaseAdmin {
    pub fn new(executor: CommandExecutor) -> Self {
        Self { executor }
    }

    async fn text_column(&self, command: &str, params: &Params) -> AppResult<Vec<String>> {
        self.executor
            .execute_reader(self.executor.connection(), command, params, |rows| {
                rows.iter().map(|row| row.try_get_by_index::<String>(0)).collect()
            })
            .await
    }

    async fn tables(&self) -> AppResult<Vec<String>> {
        let command = match self.executor.backend() {
            DbBackend::Sqlite => {
                "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name"
            }
            DbBackend::MySql => {
                "SELECT table_name FROM information_schema.tables WHERE table_schema = DATABASE() ORDER BY table_name"
            }
            _ => {
                "SELECT table_name FROM information_schema.tables WHERE table_schema = current_schema() ORDER BY table_name"
            }
        };
        self.text_column(command, &Params::new()).await
    }

    async fn versioning_history(&self) -> AppResult<Vec<VersioningRecordView>> {
        let command = format!(
            "SELECT scriptid, name, version FROM {} ORDER BY scriptid",
            VERSIONING_MAPPING.table
        );
        self.executor
            .execute_reader(self.executor.connection(), &command, &Params::new(), |rows| {
                rows.iter()
                    .map(|row| {
                        Ok(VersioningRecordView {
                            script_id: row.try_get("", "scriptid")?,
                            name: row.try_get("", "name")?,
                            version: row.try_get("", "version")?,
                        })
                    })
                    .collect()
            })
            .await
    }
}

#[async_trait]
impl DatabaseAdmin for SqlDatabaseAdmin {
    async fn database_exists(&self, name: &str) -> AppResult<bool> {
        let command = match self.executor.backend() {
            // The connection itself is the database file.
            DbBackend::Sqlite => return Ok(true),
            DbBackend::MySql => {
                "SELECT 1 FROM information_schema.schemata WHERE schema_name = @name"
            }
            _ => "SELECT 1 FROM pg_database WHERE datname = @name",
        };
        let params = Params::new().with("name", name);

        let found: Option<i32> = self
            .executor
            .execute_scalar(self.executor.connection(), command, &params)
            .await?;
        Ok(found.is_some())
    }

    async fn database_info(&self, name: &str) -> AppResult<DatabaseInfo> {
        let mut info = DatabaseInfo {
            name: name.to_string(),
            ..Default::default()
        };

        if self.executor.backend() == DbBackend::Postgres {
            let command = "SELECT datcollate::text AS collation, \
                (SELECT count(*) FROM pg_stat_activity WHERE datname = @name) AS active_connections, \
                pg_database_size(@name) / 1048576 AS size_mb \
                FROM pg_database WHERE datname = @name";
            let params = Params::new().with("name", name);

            let details = self
                .executor
                .execute_reader(self.executor.connection(), command, &params, |rows| {
                    rows.first()
                        .map(|row| -> Result<_, sea_orm::DbErr> {
                            Ok((
                                row.try_get::<Option<String>>("", "collation")?,
                                row.try_get::<Option<i64>>("", "active_connections")?,
                                row.try_get::<Option<i64>>("", "size_mb")?,
                            ))
                        })
                        .transpose()
                })
                .await?;

            if let Some((collation, active_connections, size_mb)) = details {
                info.collation = collation;
                info.active_connections = active_connections;
                info.size_mb = size_mb;
            }
        }

        info.tables = self.tables().await?;
        if info
            .tables
            .iter()
            .any(|t| t.eq_ignore_ascii_case(VERSIONING_MAPPING.table))
        {
            info.versioning_history = self.versioning_history().await?;
        }

        Ok(info)
    }

    async fn server_info(&self) -> AppResult<DatabaseServerInfo> {
        let (version_query, name_query, databases_query) = match self.executor.backend() {
            DbBackend::Sqlite => (
                "SELECT sqlite_version()",
                "SELECT 'sqlite'",
                "SELECT name FROM pragma_database_list ORDER BY name",
            ),
            DbBackend::MySql => (
                "SELECT version()",
                "SELECT @@hostname",
                "SELECT schema_name FROM information_schema.schemata ORDER BY schema_name",
            ),
            _ => (
                "SELECT version()",
                "SELECT COALESCE(inet_server_addr()::text, 'local')",
                "SELECT datname FROM pg_database WHERE NOT datistemplate ORDER BY datname",
            ),
        };

        let params = Params::new();
        let conn = self.executor.connection();
        let version: Option<String> = self.executor.execute_scalar(conn, version_query, &params).await?;
        let name: Option<String> = self.executor.execute_scalar(conn, name_query, &params).await?;

        Ok(DatabaseServerInfo {
            name: name.unwrap_or_default(),
            version: version.unwrap_or_default(),
            databases: self.text_column(databases_query, &params).await?,
        })
    }
}
