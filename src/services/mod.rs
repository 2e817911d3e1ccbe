//! Migration engine services.

pub mod database_admin;
pub mod resources;
pub mod script_log;
pub mod script_parser;
pub mod status_controller;
pub mod versioning;

pub use database_admin::{DatabaseAdmin, SqlDatabaseAdmin};
pub use resources::{DirectoryScriptSource, MemoryScriptSource, ScriptPatterns, ScriptSource};
pub use script_log::ScriptLogger;
pub use status_controller::StatusController;
pub use versioning::VersioningService;
