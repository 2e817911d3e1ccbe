//! Descriptive database and server information, and the shared status context.

use serde::Serialize;
use tokio::sync::RwLock;
use utoipa::ToSchema;

use super::script::VersioningStatus;

/// Descriptive information about the target database.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct DatabaseInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_connections: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_mb: Option<i64>,
    pub tables: Vec<String>,
    /// Applied scripts as (script id, name), ascending by id.
    pub versioning_history: Vec<VersioningRecordView>,
}

/// Applied script as recorded in the versioning table.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VersioningRecordView {
    pub script_id: i32,
    pub name: String,
    pub version: i32,
}

/// Descriptive information about the database server.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct DatabaseServerInfo {
    pub name: String,
    pub version: String,
    pub databases: Vec<String>,
}

/// Snapshot of everything known about the target database.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct StatusSnapshot {
    pub application_server: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_info: Option<DatabaseInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_info: Option<DatabaseServerInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub versioning_status: Option<VersioningStatus>,
}

/// Shared status context, refreshed by the orchestrator and read by the API.
#[derive(Debug, Default)]
pub struct StatusInfo {
    state: RwLock<StatusSnapshot>,
}

impl StatusInfo {
    pub fn new(application_server: impl Into<String>) -> Self {
        Self {
            state: RwLock::new(StatusSnapshot {
                application_server: application_server.into(),
                ..Default::default()
            }),
        }
    }

    pub async fn set_database_info(&self, database: DatabaseInfo, server: DatabaseServerInfo) {
        let mut state = self.state.write().await;
        state.database_info = Some(database);
        state.server_info = Some(server);
    }

    pub async fn set_versioning_status(&self, status: VersioningStatus) {
        self.state.write().await.versioning_status = Some(status);
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        self.state.read().await.clone()
    }
}
