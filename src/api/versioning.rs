//! Versioning API handlers: status, script catalog, audit log and execution.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, get, post, web};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::AdminAuth;
use crate::error::AppResult;
use crate::models::{
    AuditLogView, ExecuteScriptRequest, FailureKind, OperationResult, ScriptView, StatusSnapshot,
    VersioningStatus,
};
use crate::services::VersioningService;

const DEFAULT_LOG_LIMIT: i64 = 100;
const MAX_LOG_LIMIT: i64 = 1000;

/// Versioning status with its summary message.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub success: bool,
    /// "Database does not exist", "Database needs to be updated." or "Database is up to date."
    pub message: String,
    pub status: VersioningStatus,
}

/// Outcome of a script execution request.
#[derive(Debug, Serialize, ToSchema)]
pub struct ExecutionResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    /// Rows emitted by the script (single-script execution only).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub output: Vec<String>,
}

impl ExecutionResponse {
    fn build<T>(result: OperationResult<T>, output: impl FnOnce(T) -> Vec<String>) -> Self {
        Self {
            success: result.success,
            message: result.info,
            detail: result.detailed_info,
            failure: result.failure,
            output: result.data.map(output).unwrap_or_default(),
        }
    }
}

impl From<OperationResult> for ExecutionResponse {
    fn from(result: OperationResult) -> Self {
        Self::build(result, |()| Vec::new())
    }
}

impl From<OperationResult<Vec<String>>> for ExecutionResponse {
    fn from(result: OperationResult<Vec<String>>) -> Self {
        Self::build(result, |lines| lines)
    }
}

/// Cataloged scripts in execution order.
#[derive(Debug, Serialize, ToSchema)]
pub struct ScriptListResponse {
    pub scripts: Vec<ScriptView>,
    pub total: usize,
}

/// Persisted audit entries, newest first.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuditLogResponse {
    pub entries: Vec<AuditLogView>,
    pub limit: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AuditLogQuery {
    /// Entries to return (default 100, max 1000).
    pub limit: Option<i64>,
}

fn execution_status(failure: Option<FailureKind>) -> StatusCode {
    match failure {
        None => StatusCode::OK,
        Some(FailureKind::NotFound) => StatusCode::NOT_FOUND,
        Some(FailureKind::DatabaseMissing) => StatusCode::CONFLICT,
        Some(FailureKind::Execution) | Some(FailureKind::Invalid) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
    }
}

fn execution_response(response: ExecutionResponse) -> HttpResponse {
    HttpResponse::build(execution_status(response.failure)).json(response)
}

/// Load the versioning status of the target database.
#[utoipa::path(
    get,
    path = "/api/v1/versioning/status",
    tag = "Versioning",
    responses(
        (status = 200, description = "Versioning status", body = StatusResponse),
        (status = 500, description = "Database or configuration fault", body = crate::error::ErrorResponse)
    )
)]
#[get("/versioning/status")]
pub async fn get_status(service: web::Data<VersioningService>) -> AppResult<HttpResponse> {
    let result = service.check_versioning_status().await?;
    let success = result.success;
    let message = result.info;
    let status = result.data.unwrap_or_default();

    Ok(HttpResponse::Ok().json(StatusResponse {
        success,
        message,
        status,
    }))
}

/// Last known database, server and versioning info.
#[utoipa::path(
    get,
    path = "/api/v1/versioning/info",
    tag = "Versioning",
    responses(
        (status = 200, description = "Status snapshot", body = StatusSnapshot)
    )
)]
#[get("/versioning/info")]
pub async fn get_info(service: web::Data<VersioningService>) -> HttpResponse {
    HttpResponse::Ok().json(service.snapshot().await)
}

/// List cataloged scripts: Schema and Data by id, then Integrity.
#[utoipa::path(
    get,
    path = "/api/v1/versioning/scripts",
    tag = "Versioning",
    responses(
        (status = 200, description = "Cataloged scripts", body = ScriptListResponse)
    )
)]
#[get("/versioning/scripts")]
pub async fn list_scripts(service: web::Data<VersioningService>) -> AppResult<HttpResponse> {
    let scripts = service.scripts().await?;
    Ok(HttpResponse::Ok().json(ScriptListResponse {
        total: scripts.len(),
        scripts,
    }))
}

/// Read the persisted audit log.
#[utoipa::path(
    get,
    path = "/api/v1/versioning/logs",
    tag = "Versioning",
    params(
        ("limit" = Option<i64>, Query, description = "Entries to return (default 100, max 1000)")
    ),
    responses(
        (status = 200, description = "Audit log entries", body = AuditLogResponse)
    )
)]
#[get("/versioning/logs")]
pub async fn list_logs(
    service: web::Data<VersioningService>,
    query: web::Query<AuditLogQuery>,
) -> AppResult<HttpResponse> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LOG_LIMIT)
        .clamp(1, MAX_LOG_LIMIT);
    let entries = service.audit_log(limit).await?;
    Ok(HttpResponse::Ok().json(AuditLogResponse { entries, limit }))
}

/// Execute pending Schema scripts.
#[utoipa::path(
    post,
    path = "/api/v1/versioning/execute/schema",
    tag = "Versioning",
    responses(
        (status = 200, description = "Scripts executed", body = ExecutionResponse),
        (status = 401, description = "Missing or invalid admin key"),
        (status = 409, description = "Database does not exist", body = ExecutionResponse),
        (status = 422, description = "A script failed", body = ExecutionResponse)
    ),
    security(("admin_key" = []))
)]
#[post("/versioning/execute/schema")]
pub async fn execute_schema(
    _auth: AdminAuth,
    service: web::Data<VersioningService>,
) -> AppResult<HttpResponse> {
    let result = service.execute_schema_updates().await?;
    Ok(execution_response(result.into()))
}

/// Execute pending Data scripts.
#[utoipa::path(
    post,
    path = "/api/v1/versioning/execute/data",
    tag = "Versioning",
    responses(
        (status = 200, description = "Scripts executed", body = ExecutionResponse),
        (status = 401, description = "Missing or invalid admin key"),
        (status = 409, description = "Database does not exist", body = ExecutionResponse),
        (status = 422, description = "A script failed", body = ExecutionResponse)
    ),
    security(("admin_key" = []))
)]
#[post("/versioning/execute/data")]
pub async fn execute_data(
    _auth: AdminAuth,
    service: web::Data<VersioningService>,
) -> AppResult<HttpResponse> {
    let result = service.execute_data_scripts().await?;
    Ok(execution_response(result.into()))
}

/// Run every Integrity script.
#[utoipa::path(
    post,
    path = "/api/v1/versioning/execute/integrity",
    tag = "Versioning",
    responses(
        (status = 200, description = "Checks executed", body = ExecutionResponse),
        (status = 401, description = "Missing or invalid admin key"),
        (status = 409, description = "Database does not exist", body = ExecutionResponse),
        (status = 422, description = "A check failed", body = ExecutionResponse)
    ),
    security(("admin_key" = []))
)]
#[post("/versioning/execute/integrity")]
pub async fn execute_integrity(
    _auth: AdminAuth,
    service: web::Data<VersioningService>,
) -> AppResult<HttpResponse> {
    let result = service.execute_integrity_scripts().await?;
    Ok(execution_response(result.into()))
}

/// Execute every pending Schema and Data script by ascending id.
#[utoipa::path(
    post,
    path = "/api/v1/versioning/execute/pending",
    tag = "Versioning",
    responses(
        (status = 200, description = "Scripts executed", body = ExecutionResponse),
        (status = 401, description = "Missing or invalid admin key"),
        (status = 409, description = "Database does not exist", body = ExecutionResponse),
        (status = 422, description = "A script failed", body = ExecutionResponse)
    ),
    security(("admin_key" = []))
)]
#[post("/versioning/execute/pending")]
pub async fn execute_pending(
    _auth: AdminAuth,
    service: web::Data<VersioningService>,
) -> AppResult<HttpResponse> {
    let result = service.execute_all_pending_scripts().await?;
    Ok(execution_response(result.into()))
}

/// Execute one cataloged script by resource name.
#[utoipa::path(
    post,
    path = "/api/v1/versioning/execute/script",
    tag = "Versioning",
    request_body = ExecuteScriptRequest,
    responses(
        (status = 200, description = "Script executed", body = ExecutionResponse),
        (status = 401, description = "Missing or invalid admin key"),
        (status = 404, description = "No cataloged script with that name", body = ExecutionResponse),
        (status = 409, description = "Database does not exist", body = ExecutionResponse),
        (status = 422, description = "The script failed", body = ExecutionResponse)
    ),
    security(("admin_key" = []))
)]
#[post("/versioning/execute/script")]
pub async fn execute_script(
    _auth: AdminAuth,
    service: web::Data<VersioningService>,
    body: web::Json<ExecuteScriptRequest>,
) -> AppResult<HttpResponse> {
    let result = service.execute_script(&body.file_name).await?;
    Ok(execution_response(result.into()))
}

/// Configure versioning routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(get_status)
        .service(get_info)
        .service(list_scripts)
        .service(list_logs)
        .service(execute_schema)
        .service(execute_data)
        .service(execute_integrity)
        .service(execute_pending)
        .service(execute_script);
}
