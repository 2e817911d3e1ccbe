//! Uniform success/failure result returned by persistence and orchestration calls.

use serde::Serialize;
use utoipa::ToSchema;

/// Why an operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// SQL execution error or a write that affected no rows
    Execution,
    /// Requested script or record does not exist
    NotFound,
    /// Target database does not exist
    DatabaseMissing,
    /// Request was not acceptable (e.g. mismatched entities)
    Invalid,
}

/// Outcome of an operation with a message and an optional payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationResult<T = ()> {
    pub success: bool,
    pub info: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detailed_info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> OperationResult<T> {
    pub fn ok(info: impl Into<String>) -> Self {
        Self {
            success: true,
            info: info.into(),
            detailed_info: None,
            failure: None,
            data: None,
        }
    }

    pub fn failed(info: impl Into<String>) -> Self {
        Self::failure(FailureKind::Execution, info)
    }

    pub fn not_found(info: impl Into<String>) -> Self {
        Self::failure(FailureKind::NotFound, info)
    }

    pub fn failure(kind: FailureKind, info: impl Into<String>) -> Self {
        Self {
            success: false,
            info: info.into(),
            detailed_info: None,
            failure: Some(kind),
            data: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detailed_info = Some(detail.into());
        self
    }

    pub fn with_data(mut self, data: T) -> Self {
        self.data = Some(data);
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.failure == Some(FailureKind::NotFound)
    }

    /// Same outcome with the payload replaced.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> OperationResult<U> {
        OperationResult {
            success: self.success,
            info: self.info,
            detailed_info: self.detailed_info,
            failure: self.failure,
            data: self.data.map(f),
        }
    }

    /// Same outcome without the payload.
    pub fn discard_data(self) -> OperationResult {
        OperationResult {
            success: self.success,
            info: self.info,
            detailed_info: self.detailed_info,
            failure: self.failure,
            data: None,
        }
    }
}
