//! API endpoint modules.

pub mod health;
pub mod openapi;
pub mod versioning;

pub use health::configure_health_routes;
pub use openapi::ApiDoc;
pub use versioning::configure_routes as configure_versioning_routes;
