//! Liveness and readiness endpoints.

use actix_web::{HttpResponse, get, web};
use chrono::Utc;
use sea_orm::{ConnectionTrait, Statement};
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::DbPool;
use crate::error::ErrorResponse;
use crate::models::VersioningStatus;
use crate::services::VersioningService;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    timestamp: String,
}

/// Versioning state as of the last status load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VersioningState {
    NotLoaded,
    DatabaseMissing,
    NeedsUpdate,
    UpToDate,
}

impl From<Option<&VersioningStatus>> for VersioningState {
    fn from(status: Option<&VersioningStatus>) -> Self {
        match status {
            Some(s) if s.database_does_not_exist => Self::DatabaseMissing,
            Some(s) if s.database_needs_update => Self::NeedsUpdate,
            Some(s) if s.status_loaded => Self::UpToDate,
            _ => Self::NotLoaded,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ReadyResponse {
    status: &'static str,
    database: &'static str,
    versioning: VersioningState,
}

/// Liveness: the process is up.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Readiness: the versioning connection answers, with the last known
/// versioning state. A pending update does not make the service unready.
#[utoipa::path(
    get,
    path = "/api/v1/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service is ready", body = ReadyResponse),
        (status = 503, description = "Versioning database unreachable", body = ErrorResponse)
    )
)]
#[get("/ready")]
pub async fn ready(
    pool: web::Data<DbPool>,
    service: web::Data<VersioningService>,
) -> HttpResponse {
    let conn = pool.connection();
    let probe = Statement::from_string(conn.get_database_backend(), "SELECT 1".to_owned());
    if conn.query_one_raw(probe).await.is_err() {
        return HttpResponse::ServiceUnavailable().json(ErrorResponse {
            error: "NOT_READY".to_string(),
            message: "Versioning database connection failed".to_string(),
        });
    }

    let snapshot = service.snapshot().await;
    HttpResponse::Ok().json(ReadyResponse {
        status: "ready",
        database: "connected",
        versioning: VersioningState::from(snapshot.versioning_status.as_ref()),
    })
}

pub fn configure_health_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health).service(ready);
}
