/// Storage layer
///
/// The engine consumes two narrow traits: [`TargetRegistry`] for the
/// monitored-target list and [`ResultSink`] for durable results. The libsql
/// implementation backs both for the running service; tests substitute
/// scripted fakes.
pub mod migrations;
pub mod models;
pub mod repository;

pub use repository::{LibsqlStore, ResultSink, TargetRegistry};

use anyhow::Result;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}
