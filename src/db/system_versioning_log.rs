//! Audit trail rows written while loading and executing scripts.

use chrono::{NaiveDateTime, Utc};
use sea_orm::{DbErr, QueryResult};
use serde::Serialize;
use utoipa::ToSchema;

use super::broker::EntityBroker;
use super::mapping::{ColumnMapping, Entity, EntityMapping, EntityState, Record};
use super::params::{ParamValue, Params};
use crate::error::AppResult;

pub static MAPPING: EntityMapping = EntityMapping {
    type_name: SystemVersioningLog::TYPE_NAME,
    table: "system_versioning_log",
    id_column: "id",
    columns: &[
        ColumnMapping::new("Id").column("id").identity(),
        ColumnMapping::new("Message").column("message"),
        ColumnMapping::new("DetailedMessage").column("detailedmessage"),
        ColumnMapping::new("LogType").column("logtype"),
        ColumnMapping::new("RelatedScriptId").column("relatedscriptid"),
        ColumnMapping::new("Date").column("date"),
    ],
    children: &[],
};

/// Severity persisted in `logtype`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    Info,
    Warning,
    Error,
}

impl LogSeverity {
    pub fn code(&self) -> i32 {
        match self {
            LogSeverity::Info => 0,
            LogSeverity::Warning => 1,
            LogSeverity::Error => 2,
        }
    }

    /// Unknown codes read back as Info.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => LogSeverity::Warning,
            2 => LogSeverity::Error,
            _ => LogSeverity::Info,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SystemVersioningLog {
    state: EntityState,
    pub message: String,
    pub detailed_message: String,
    pub severity: LogSeverity,
    pub related_script_id: Option<i32>,
    pub date: NaiveDateTime,
}

impl SystemVersioningLog {
    /// New, unsaved entry stamped with the current time.
    pub fn new(
        message: impl Into<String>,
        detailed_message: impl Into<String>,
        severity: LogSeverity,
        related_script_id: Option<i32>,
    ) -> Self {
        Self {
            state: EntityState::default(),
            message: message.into(),
            detailed_message: detailed_message.into(),
            severity,
            related_script_id,
            date: Utc::now().naive_utc(),
        }
    }
}

impl Record for SystemVersioningLog {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn state(&self) -> &EntityState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut EntityState {
        &mut self.state
    }

    fn values(&self) -> Vec<(&'static str, ParamValue)> {
        vec![
            ("Id", self.id().into()),
            ("Message", self.message.clone().into()),
            ("DetailedMessage", self.detailed_message.clone().into()),
            ("LogType", self.severity.code().into()),
            ("RelatedScriptId", self.related_script_id.into()),
            ("Date", self.date.into()),
        ]
    }
}

impl Entity for SystemVersioningLog {
    const TYPE_NAME: &'static str = "SystemVersioningLog";

    fn from_row(row: &QueryResult) -> Result<Self, DbErr> {
        Ok(Self {
            state: EntityState::new(row.try_get("", "id")?),
            message: row.try_get("", "message")?,
            detailed_message: row
                .try_get::<Option<String>>("", "detailedmessage")?
                .unwrap_or_default(),
            severity: LogSeverity::from_code(row.try_get("", "logtype")?),
            related_script_id: row.try_get("", "relatedscriptid")?,
            date: row.try_get("", "date")?,
        })
    }
}

pub type SystemVersioningLogBroker = EntityBroker<SystemVersioningLog>;

impl EntityBroker<SystemVersioningLog> {
    /// Most recent entries first.
    pub async fn latest(&self, limit: i64) -> AppResult<Vec<SystemVersioningLog>> {
        let command = format!(
            "SELECT * FROM {} ORDER BY {} DESC LIMIT @limit",
            MAPPING.table, MAPPING.id_column
        );
        let params = Params::new().with("limit", limit);

        self.executor()
            .execute_reader(self.executor().connection(), &command, &params, |rows| {
                rows.iter().map(SystemVersioningLog::from_row).collect()
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    use sea_orm::{DatabaseBackend, MockDatabase, Value};

    use super::*;
    use crate::db::{CommandExecutor, DbPool, EntityStatus, MappingRegistry};

    fn broker(db: MockDatabase) -> SystemVersioningLogBroker {
        let pool = DbPool::from_connection(db.into_connection());
        EntityBroker::new(
            CommandExecutor::new(&pool, Duration::from_secs(5)),
            Arc::new(MappingRegistry::standard()),
        )
    }

    #[test]
    fn test_severity_codes() {
        assert_eq!(LogSeverity::Info.code(), 0);
        assert_eq!(LogSeverity::Warning.code(), 1);
        assert_eq!(LogSeverity::Error.code(), 2);
        assert_eq!(LogSeverity::from_code(2), LogSeverity::Error);
        assert_eq!(LogSeverity::from_code(7), LogSeverity::Info);
    }

    #[test]
    fn test_new_entry_is_insert_pending() {
        let entry = SystemVersioningLog::new("msg", "detail", LogSeverity::Warning, Some(12));
        assert_eq!(entry.status(), EntityStatus::InsertPending);
    }

    #[tokio::test]
    async fn test_save_assigns_generated_id() {
        let broker = broker(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![BTreeMap::from([("id", Value::from(15i32))])]]),
        );

        let mut entry = SystemVersioningLog::new("msg", "", LogSeverity::Info, None);
        let result = broker.save(&mut entry).await.unwrap();
        assert!(result.success);
        assert_eq!(entry.id(), 15);
    }

    #[tokio::test]
    async fn test_latest_reads_nullable_columns() {
        let now = Utc::now().naive_utc();
        let broker = broker(MockDatabase::new(DatabaseBackend::Postgres).append_query_results([
            vec![BTreeMap::from([
                ("id", Value::from(3i32)),
                ("message", Value::from("The Name parameter is missing.")),
                ("detailedmessage", Value::from(None::<String>)),
                ("logtype", Value::from(1i32)),
                ("relatedscriptid", Value::from(None::<i32>)),
                ("date", Value::from(now)),
            ])],
        ]));

        let entries = broker.latest(10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].severity, LogSeverity::Warning);
        assert_eq!(entries[0].related_script_id, None);
        assert_eq!(entries[0].detailed_message, "");
    }
}
