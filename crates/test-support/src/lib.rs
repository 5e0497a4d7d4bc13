//! Shared test utilities: in-memory SQLite schema setup and tracing init,
//! used by integration tests across the workspace.

pub mod logging;
pub mod sqlite;

pub use logging::init_tracing_once;
pub use sqlite::{current_state_store, entity_db, fresh_entity_db, with_savepoint};
