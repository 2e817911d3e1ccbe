//! OpenAPI documentation configuration.

use utoipa::OpenApi;

use crate::{api, error, models};

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Database Versioning Server",
        version = "0.1.0",
        description = "Discovers, validates and applies versioned SQL scripts to the target database"
    ),
    servers(
        (url = "/", description = "Local server")
    ),
    paths(
        // Health endpoints
        api::health::health,
        api::health::ready,
        // Versioning endpoints
        api::versioning::get_status,
        api::versioning::get_info,
        api::versioning::list_scripts,
        api::versioning::list_logs,
        api::versioning::execute_schema,
        api::versioning::execute_data,
        api::versioning::execute_integrity,
        api::versioning::execute_pending,
        api::versioning::execute_script,
    ),
    components(
        schemas(
            // Common
            error::ErrorResponse,
            models::FailureKind,
            // Health
            api::health::HealthResponse,
            api::health::ReadyResponse,
            api::health::VersioningState,
            // Versioning
            models::ScriptKind,
            models::ScriptRef,
            models::ScriptView,
            models::ScriptLogView,
            models::VersioningStatus,
            models::ExecuteScriptRequest,
            models::AuditLogView,
            models::DatabaseInfo,
            models::DatabaseServerInfo,
            models::VersioningRecordView,
            models::StatusSnapshot,
            crate::db::system_versioning_log::LogSeverity,
            api::versioning::StatusResponse,
            api::versioning::ExecutionResponse,
            api::versioning::ScriptListResponse,
            api::versioning::AuditLogResponse,
            api::versioning::AuditLogQuery,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Versioning", description = "Script catalog, status and execution")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Add admin key security scheme.
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "admin_key",
                utoipa::openapi::security::SecurityScheme::ApiKey(
                    utoipa::openapi::security::ApiKey::Header(
                        utoipa::openapi::security::ApiKeyValue::new(
                            crate::config::ADMIN_KEY_HEADER,
                        ),
                    ),
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_versioning_paths() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        assert!(paths.iter().any(|p| p.as_str() == "/api/v1/versioning/status"));
        assert!(paths.iter().any(|p| p.as_str() == "/api/v1/versioning/execute/script"));
    }
}
