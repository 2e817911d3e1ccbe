//! Request logging middleware.
//!
//! Every request gets one completion line. Calls to the execute endpoints are
//! also logged when they arrive, since they change the target database.

use std::future::{Ready, ready};
use std::time::{Duration, Instant};

use actix_web::Error;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready};
use actix_web::http::StatusCode;
use futures_util::future::LocalBoxFuture;
use tracing::{error, info, warn};

use crate::config::ADMIN_KEY_HEADER;

const EXECUTE_PATH: &str = "/versioning/execute/";

/// What gets logged about a request, captured before it is handed on.
struct RequestInfo {
    method: String,
    path: String,
    remote_addr: String,
    admin_key: bool,
}

impl RequestInfo {
    fn from_request(req: &ServiceRequest) -> Self {
        Self {
            method: req.method().to_string(),
            path: req.path().to_string(),
            remote_addr: req
                .connection_info()
                .realip_remote_addr()
                .unwrap_or("unknown")
                .to_string(),
            admin_key: req.headers().contains_key(ADMIN_KEY_HEADER),
        }
    }

    fn is_execution(&self) -> bool {
        self.path.contains(EXECUTE_PATH)
    }

    fn log_completion(&self, status: StatusCode, elapsed: Duration) {
        let duration_ms = elapsed.as_millis() as u64;
        let status = status.as_u16();
        match status {
            500.. => error!(
                target: "api",
                method = %self.method,
                path = %self.path,
                status,
                duration_ms,
                "Request failed"
            ),
            400.. => warn!(
                target: "api",
                method = %self.method,
                path = %self.path,
                status,
                duration_ms,
                "Request rejected"
            ),
            _ => info!(
                target: "api",
                method = %self.method,
                path = %self.path,
                status,
                duration_ms,
                "Request completed"
            ),
        }
    }
}

/// Request logger middleware factory.
pub struct RequestLogger;

impl<S, B> Transform<S, ServiceRequest> for RequestLogger
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestLoggerMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestLoggerMiddleware { service }))
    }
}

pub struct RequestLoggerMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for RequestLoggerMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start = Instant::now();
        let request = RequestInfo::from_request(&req);

        if request.is_execution() {
            info!(
                target: "api",
                path = %request.path,
                remote_addr = %request.remote_addr,
                admin_key = request.admin_key,
                "Script execution requested"
            );
        }

        let fut = self.service.call(req);

        Box::pin(async move {
            let res = fut.await?;
            request.log_completion(res.status(), start.elapsed());
            Ok(res)
        })
    }
}
