//! Schema definition and migrations

use super::{lock_conn, Database, SCHEMA_VERSION};
use crate::error::AppError;
use rusqlite::Connection;

impl Database {
    pub(crate) fn create_tables(&self) -> Result<(), AppError> {
        let conn = lock_conn!(self.conn);
        Self::create_tables_on_conn(&conn)
    }

    pub(crate) fn create_tables_on_conn(conn: &Connection) -> Result<(), AppError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    /// Current `user_version`. Fails without touching the file when it is
    /// newer than `SCHEMA_VERSION`.
    pub(crate) fn check_schema_version(&self) -> Result<i32, AppError> {
        let conn = lock_conn!(self.conn);
        let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version > SCHEMA_VERSION {
            return Err(AppError::Database(format!(
                "database schema version {version} is newer than supported {SCHEMA_VERSION}"
            )));
        }
        Ok(version)
    }

    /// Bring `user_version` up to `SCHEMA_VERSION` from `version`.
    pub(crate) fn apply_schema_migrations(&self, version: i32) -> Result<(), AppError> {
        let conn = lock_conn!(self.conn);
        if version < SCHEMA_VERSION {
            log::info!("[Database] Migrating schema {version} -> {SCHEMA_VERSION}");
            // v0 -> v1: kv_store only, created above
            conn.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))?;
        }
        Ok(())
    }
}
