//! Per-load validation log and pending audit rows.

use tracing::warn;

use super::script_parser::ValidationIssue;
use crate::db::system_versioning_log::{LogSeverity, SystemVersioningLog, SystemVersioningLogBroker};
use crate::error::AppResult;
use crate::models::{Script, ScriptLog};

/// Collects script problems for the current load and the audit rows still to
/// be written to `system_versioning_log`.
#[derive(Debug, Default)]
pub struct ScriptLogger {
    entries: Vec<ScriptLog>,
    pending: Vec<SystemVersioningLog>,
}

fn related_id(script: &Script) -> Option<i32> {
    (script.id > 0).then_some(script.id)
}

impl ScriptLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a header validation problem; the script leaves the catalog.
    pub fn log_issue(&mut self, script: &Script, issue: ValidationIssue) {
        warn!("Script {} rejected: {}", script.file_name, issue);
        self.entries.push(ScriptLog {
            script: script.script_ref(),
            message: issue.message().to_string(),
            warning: false,
        });
        self.pending.push(SystemVersioningLog::new(
            issue.message(),
            script.file_name.clone(),
            LogSeverity::Info,
            related_id(script),
        ));
    }

    /// Record a failed execution against a script.
    pub fn add_error(&mut self, script: &Script, message: impl Into<String>, warning: bool) {
        let message = message.into();
        self.entries.push(ScriptLog {
            script: script.script_ref(),
            message: message.clone(),
            warning,
        });
        self.pending.push(SystemVersioningLog::new(
            message,
            script.body.clone(),
            LogSeverity::Error,
            related_id(script),
        ));
    }

    /// Queue an informational audit row.
    pub fn add_message(
        &mut self,
        message: impl Into<String>,
        detail: impl Into<String>,
        related_script_id: Option<i32>,
    ) {
        self.pending.push(SystemVersioningLog::new(
            message,
            detail,
            LogSeverity::Info,
            related_script_id,
        ));
    }

    /// Whether anything was logged for the resource.
    pub fn has_errors(&self, file_name: &str) -> bool {
        self.entries.iter().any(|e| e.script.file_name == file_name)
    }

    pub fn entries(&self) -> &[ScriptLog] {
        &self.entries
    }

    pub fn pending(&self) -> &[SystemVersioningLog] {
        &self.pending
    }

    /// Forget the previous load's entries. Unsaved audit rows are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drop unsaved audit rows, used when there is no database to write to.
    pub fn discard_pending(&mut self) {
        self.pending.clear();
    }

    /// Write pending audit rows. Rows that fail to save are dropped with a
    /// warning; returns how many were written.
    ///
    /// On an error the current row and every row after it stay pending.
    pub async fn flush(&mut self, broker: &SystemVersioningLogBroker) -> AppResult<usize> {
        let mut saved = 0;
        let mut rows = std::mem::take(&mut self.pending).into_iter();
        while let Some(mut row) = rows.next() {
            match broker.save(&mut row).await {
                Ok(result) if result.success => saved += 1,
                Ok(result) => {
                    warn!("Audit entry '{}' was not saved: {}", row.message, result.info)
                }
                Err(e) => {
                    self.pending.push(row);
                    self.pending.extend(rows);
                    return Err(e);
                }
            }
        }
        Ok(saved)
    }
}
