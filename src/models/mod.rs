//! Domain models for the versioning engine.

pub mod database_info;
pub mod operation;
pub mod script;

// Re-export commonly used types
pub use database_info::{
    DatabaseInfo, DatabaseServerInfo, StatusInfo, StatusSnapshot, VersioningRecordView,
};
pub use operation::{FailureKind, OperationResult};
pub use script::{
    AuditLogView, ExecuteScriptRequest, Script, ScriptKind, ScriptLog, ScriptLogView, ScriptRef,
    ScriptView, VersioningStatus,
};
