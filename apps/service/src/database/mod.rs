/// Database abstraction layer
///
/// Check results live in a local libSQL (SQLite) file, reached through a
/// pooled connection manager.

pub mod migrations;
pub mod models;
pub mod repository;

pub use models::StoredCheck;
pub use repository::{Database, DatabaseImpl};

use anyhow::Result;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}
