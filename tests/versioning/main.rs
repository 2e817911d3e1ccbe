//! Versioning engine test suite.
//!
//! Drives the orchestrator and the HTTP API against mock database connections
//! and in-memory script resources; no running database is needed.
//!
//! Run with: cargo test --test versioning

mod test_helpers;

mod test_api;
mod test_catalog;
mod test_lifecycle;
