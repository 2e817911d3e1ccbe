//! Actix-web extractor requiring the admin key header.

use std::future::{Ready, ready};

use actix_web::dev::Payload;
use actix_web::http::StatusCode;
use actix_web::{FromRequest, HttpRequest, HttpResponse, ResponseError, web};
use secrecy::{ExposeSecret, SecretString};
use tracing::warn;

use super::AdminKey;
use crate::config::ADMIN_KEY_HEADER;
use crate::error::ErrorResponse;

fn extract_secret_header(req: &HttpRequest, header_name: &str) -> Option<SecretString> {
    req.headers()
        .get(header_name)
        .and_then(|v| v.to_str().ok())
        .map(|s| SecretString::from(s.to_string()))
}

/// Authentication error for extractors.
#[derive(Debug)]
pub struct AuthError {
    status: StatusCode,
    message: String,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl ResponseError for AuthError {
    fn status_code(&self) -> StatusCode {
        self.status
    }

    fn error_response(&self) -> HttpResponse {
        let error = if self.status == StatusCode::FORBIDDEN {
            "FORBIDDEN"
        } else {
            "UNAUTHORIZED"
        };
        HttpResponse::build(self.status).json(ErrorResponse {
            error: error.to_string(),
            message: self.message.clone(),
        })
    }
}

/// Guard for handlers that change the database:
/// ```ignore
/// async fn execute(_auth: AdminAuth, service: web::Data<VersioningService>) -> ... {}
/// ```
pub struct AdminAuth;

impl FromRequest for AdminAuth {
    type Error = AuthError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let Some(stored) = req
            .app_data::<web::Data<AdminKey>>()
            .filter(|key| key.is_configured())
        else {
            return ready(Err(AuthError {
                status: StatusCode::FORBIDDEN,
                message: "Script execution is disabled: no admin key configured".to_string(),
            }));
        };

        match extract_secret_header(req, ADMIN_KEY_HEADER) {
            Some(provided) if stored.verify(provided.expose_secret()) => ready(Ok(AdminAuth)),
            Some(_) => {
                warn!(path = %req.path(), "Rejected invalid admin key");
                ready(Err(AuthError {
                    status: StatusCode::UNAUTHORIZED,
                    message: "Invalid admin key".to_string(),
                }))
            }
            None => ready(Err(AuthError {
                status: StatusCode::UNAUTHORIZED,
                message: format!("Missing admin key. Provide {} header.", ADMIN_KEY_HEADER),
            })),
        }
    }
}
