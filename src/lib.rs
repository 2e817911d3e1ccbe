//! Database versioning engine library.
//!
//! Discovers versioned SQL scripts, decides which ones the target database
//! still needs, applies them and keeps an audit trail. Also exposes the generic
//! entity persistence layer the engine's bookkeeping is built on.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod migration;
pub mod models;
pub mod services;
