//! Versioning service: status DTOs and the execute-then-recheck workflow used
//! by the HTTP API and the CLI.

use std::sync::Arc;

use tracing::info;

use super::database_admin::SqlDatabaseAdmin;
use super::resources::DirectoryScriptSource;
use super::status_controller::StatusController;
use crate::config::Config;
use crate::db::{CommandExecutor, DbPool};
use crate::error::AppResult;
use crate::models::{
    AuditLogView, FailureKind, OperationResult, ScriptView, StatusInfo, StatusSnapshot,
    VersioningStatus,
};

pub const DATABASE_MISSING_MESSAGE: &str = "Database does not exist";
pub const DATABASE_NEEDS_UPDATE_MESSAGE: &str = "Database needs to be updated.";
pub const DATABASE_UP_TO_DATE_MESSAGE: &str = "Database is up to date.";

#[derive(Clone)]
pub struct VersioningService {
    controller: Arc<StatusController>,
    status_info: Arc<StatusInfo>,
}

impl VersioningService {
    pub fn new(controller: Arc<StatusController>, status_info: Arc<StatusInfo>) -> Self {
        Self {
            controller,
            status_info,
        }
    }

    /// Wire the engine over the configured scripts directory and the
    /// versioning connection.
    pub fn from_config(
        pool: &DbPool,
        config: &Config,
        application_server: impl Into<String>,
    ) -> AppResult<Self> {
        let status_info = Arc::new(StatusInfo::new(application_server));
        let admin = Arc::new(SqlDatabaseAdmin::new(CommandExecutor::new(
            pool,
            config.database.command_timeout(),
        )));
        let source = Arc::new(DirectoryScriptSource::new(config.scripts.dir.clone()));
        let controller =
            StatusController::new(pool, config, source, admin, status_info.clone())?;
        Ok(Self::new(Arc::new(controller), status_info))
    }

    pub fn controller(&self) -> &StatusController {
        &self.controller
    }

    /// Load the status, publish it to the shared status context and describe it.
    pub async fn check_versioning_status(&self) -> AppResult<OperationResult<VersioningStatus>> {
        let status = self.controller.load_status().await?;
        self.status_info.set_versioning_status(status.clone()).await;

        let result = if status.database_does_not_exist {
            OperationResult::failure(FailureKind::DatabaseMissing, DATABASE_MISSING_MESSAGE)
        } else if status.database_needs_update {
            OperationResult::ok(DATABASE_NEEDS_UPDATE_MESSAGE)
        } else {
            OperationResult::ok(DATABASE_UP_TO_DATE_MESSAGE)
        };
        info!("{}", result.info);
        Ok(result.with_data(status))
    }

    pub async fn execute_schema_updates(&self) -> AppResult<OperationResult> {
        let result = self.controller.execute_schema_updates().await?;
        self.check_versioning_status().await?;
        Ok(result)
    }

    pub async fn execute_data_scripts(&self) -> AppResult<OperationResult> {
        let result = self.controller.execute_data_scripts().await?;
        self.check_versioning_status().await?;
        Ok(result)
    }

    pub async fn execute_all_pending_scripts(&self) -> AppResult<OperationResult> {
        let result = self.controller.execute_all_pending_scripts().await?;
        self.check_versioning_status().await?;
        Ok(result)
    }

    pub async fn execute_integrity_scripts(&self) -> AppResult<OperationResult> {
        let result = self.controller.execute_integrity_scripts().await?;
        self.check_versioning_status().await?;
        Ok(result)
    }

    /// Run one script; the status is only re-checked when it succeeded.
    pub async fn execute_script(&self, file_name: &str) -> AppResult<OperationResult<Vec<String>>> {
        let result = self.controller.execute_script(file_name).await?;
        if result.success {
            self.check_versioning_status().await?;
        }
        Ok(result)
    }

    pub async fn scripts(&self) -> AppResult<Vec<ScriptView>> {
        Ok(self
            .controller
            .get_scripts()
            .await?
            .iter()
            .map(ScriptView::from)
            .collect())
    }

    pub async fn audit_log(&self, limit: i64) -> AppResult<Vec<AuditLogView>> {
        Ok(self
            .controller
            .audit_log(limit)
            .await?
            .iter()
            .map(AuditLogView::from)
            .collect())
    }

    pub async fn flush_logs(&self) -> AppResult<usize> {
        self.controller.flush_logs().await
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        self.status_info.snapshot().await
    }
}
