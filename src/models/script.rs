//! Versioning script domain models and DTOs.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::system_versioning_log::{LogSeverity, SystemVersioningLog};

/// Script category, derived from the resource name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScriptKind {
    /// Structural change, applied once.
    Schema,
    /// Data change, applied once.
    Data,
    /// Read-only consistency check, run on demand.
    Integrity,
}

impl ScriptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Schema => "schema",
            Self::Data => "data",
            Self::Integrity => "integrity",
        }
    }

    /// Schema and Data scripts register themselves once executed.
    pub fn is_versioned(&self) -> bool {
        !matches!(self, Self::Integrity)
    }
}

impl std::fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// A cataloged script with its parsed header and runtime state.
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub id: i32,
    pub name: String,
    pub version: i32,
    pub creation_date: Option<NaiveDate>,
    pub impacted_date: Option<NaiveDateTime>,
    pub kind: ScriptKind,
    pub file_name: String,
    pub body: String,
    pub messages: Vec<String>,
    pub warnings: Vec<String>,
    pub execution_required: bool,
}

impl Script {
    pub fn new(file_name: impl Into<String>, kind: ScriptKind) -> Self {
        Self {
            id: 0,
            name: String::new(),
            version: 0,
            creation_date: None,
            impacted_date: None,
            kind,
            file_name: file_name.into(),
            body: String::new(),
            messages: Vec::new(),
            warnings: Vec::new(),
            execution_required: false,
        }
    }

    pub fn has_messages(&self) -> bool {
        !self.messages.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn script_ref(&self) -> ScriptRef {
        ScriptRef {
            file_name: self.file_name.clone(),
            id: self.id,
            name: self.name.clone(),
        }
    }
}

impl std::fmt::Display for Script {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}", self.file_name)?;
        } else {
            write!(f, "{}", self.name)?;
        }
        if let Some(date) = self.creation_date {
            write!(f, " | {}", date.format("%Y-%m-%d"))?;
        }
        Ok(())
    }
}

/// Identity of the script a log entry refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ScriptRef {
    pub file_name: String,
    pub id: i32,
    pub name: String,
}

/// Validation or execution problem recorded against a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLog {
    pub script: ScriptRef,
    pub message: String,
    /// Raised by a warning-level check rather than a validation error.
    pub warning: bool,
}

/// Script as returned by the API.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ScriptView {
    pub id: i32,
    pub name: String,
    pub version: i32,
    pub creation_date: Option<NaiveDate>,
    pub impacted_date: Option<NaiveDateTime>,
    pub kind: ScriptKind,
    pub file_name: String,
    /// Script body as executed, header lines included.
    pub sql_code: String,
    pub execution_required: bool,
    pub has_messages: bool,
    pub has_warnings: bool,
    pub messages: Vec<String>,
    pub warnings: Vec<String>,
}

impl From<&Script> for ScriptView {
    fn from(script: &Script) -> Self {
        Self {
            id: script.id,
            name: script.name.clone(),
            version: script.version,
            creation_date: script.creation_date,
            impacted_date: script.impacted_date,
            kind: script.kind,
            file_name: script.file_name.clone(),
            sql_code: script.body.clone(),
            execution_required: script.execution_required,
            has_messages: script.has_messages(),
            has_warnings: script.has_warnings(),
            messages: script.messages.clone(),
            warnings: script.warnings.clone(),
        }
    }
}

/// Script log entry as returned by the API.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ScriptLogView {
    pub message: String,
    pub script: ScriptRef,
    pub warning: bool,
}

impl From<&ScriptLog> for ScriptLogView {
    fn from(log: &ScriptLog) -> Self {
        Self {
            message: log.message.clone(),
            script: log.script.clone(),
            warning: log.warning,
        }
    }
}

/// Versioning status of the target database.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct VersioningStatus {
    pub database_does_not_exist: bool,
    pub database_needs_update: bool,
    pub has_warnings: bool,
    pub status_loaded: bool,
    pub scripts_logs: Vec<ScriptLogView>,
    pub scripts: Vec<ScriptView>,
}

/// Request to execute a single cataloged script.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ExecuteScriptRequest {
    /// Resource name of the script, as listed by the scripts endpoint.
    pub file_name: String,
}

/// Persisted audit log entry as returned by the API.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuditLogView {
    pub id: i32,
    pub message: String,
    pub detailed_message: String,
    pub severity: LogSeverity,
    pub related_script_id: Option<i32>,
    pub date: NaiveDateTime,
}

impl From<&SystemVersioningLog> for AuditLogView {
    fn from(log: &SystemVersioningLog) -> Self {
        use crate::db::Record;

        Self {
            id: log.id(),
            message: log.message.clone(),
            detailed_message: log.detailed_message.clone(),
            severity: log.severity,
            related_script_id: log.related_script_id,
            date: log.date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefers_name() {
        let mut script = Script::new("App.Resources.DB.1234.AddTable.Schema.Create.sql", ScriptKind::Schema);
        assert_eq!(script.to_string(), "App.Resources.DB.1234.AddTable.Schema.Create.sql");

        script.name = "Create Table Foo".to_string();
        script.creation_date = NaiveDate::from_ymd_opt(2023, 1, 15);
        assert_eq!(script.to_string(), "Create Table Foo | 2023-01-15");
    }

    #[test]
    fn test_view_flags() {
        let mut script = Script::new("x", ScriptKind::Integrity);
        script.warnings.push("orphans".to_string());
        let view = ScriptView::from(&script);
        assert!(view.has_warnings);
        assert!(!view.has_messages);
        assert_eq!(view.kind, ScriptKind::Integrity);
    }

    #[test]
    fn test_kind_versioned() {
        assert!(ScriptKind::Schema.is_versioned());
        assert!(ScriptKind::Data.is_versioned());
        assert!(!ScriptKind::Integrity.is_versioned());
    }
}
