//! Local persistence
//!
//! A flat, namespaced key-value store on SQLite. Usage records, health-check
//! results and the cost table share one table and are told apart by key
//! prefix.

mod dao;
mod schema;

use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Mutex;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::usage::UsageRecord;

pub(crate) const SCHEMA_VERSION: i32 = 1;

pub const USAGE_KEY_PREFIX: &str = "usage_";
pub const HEALTH_KEY_PREFIX: &str = "health_";
pub const COST_CONFIG_KEY: &str = "cost_config";

/// Lock the connection mutex, mapping poisoning to `AppError::Database`.
macro_rules! lock_conn {
    ($mutex:expr) => {
        $mutex
            .lock()
            .map_err(|e| $crate::error::AppError::Database(format!("Mutex lock failed: {e}")))?
    };
}
pub(crate) use lock_conn;

pub struct Database {
    pub(crate) conn: Mutex<Connection>,
}

/// Write side of the store as seen by the capture path.
pub trait UsageSink: Send + Sync {
    fn save_usage_record(&self, record: &UsageRecord) -> Result<(), AppError>;
}

impl UsageSink for Database {
    fn save_usage_record(&self, record: &UsageRecord) -> Result<(), AppError> {
        Database::save_usage_record(self, record)
    }
}

impl Database {
    /// Open the database at the configured location, creating it if needed.
    pub fn init() -> Result<Self, AppError> {
        let config = AppConfig::load()?;
        Self::open(&config.database_path())
    }

    pub fn open(path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::io(parent, e))?;
        }
        let conn = Connection::open(path)?;
        log::debug!("[Database] Opened {}", path.display());
        Self::from_connection(conn)
    }

    /// In-memory database, mainly for tests.
    pub fn memory() -> Result<Self, AppError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, AppError> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        let version = db.check_schema_version()?;
        db.create_tables()?;
        db.apply_schema_migrations(version)?;
        Ok(db)
    }

    pub(crate) fn kv_set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), AppError> {
        let json = serde_json::to_string(value)?;
        let now = chrono::Utc::now().timestamp_millis();
        let conn = lock_conn!(self.conn);
        conn.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at",
            params![key, json, now],
        )?;
        Ok(())
    }

    pub(crate) fn kv_get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError> {
        let conn = lock_conn!(self.conn);
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        drop(conn);

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// All values whose key starts with `prefix`, in key order.
    ///
    /// Entries that no longer decode as `T` are skipped with a warning.
    pub(crate) fn kv_scan_prefix<T: DeserializeOwned>(
        &self,
        prefix: &str,
    ) -> Result<Vec<T>, AppError> {
        let rows: Vec<(String, String)> = {
            let conn = lock_conn!(self.conn);
            let mut stmt = conn.prepare(
                "SELECT key, value FROM kv_store
                 WHERE substr(key, 1, length(?1)) = ?1
                 ORDER BY key ASC",
            )?;
            let iter = stmt.query_map(params![prefix], |row| Ok((row.get(0)?, row.get(1)?)))?;
            iter.collect::<Result<Vec<_>, _>>()?
        };

        let mut values = Vec::with_capacity(rows.len());
        for (key, json) in rows {
            match serde_json::from_str(&json) {
                Ok(value) => values.push(value),
                Err(e) => log::warn!("[Database] Skipping undecodable entry {key}: {e}"),
            }
        }
        Ok(values)
    }

    /// Delete every key starting with `prefix`. Returns the number removed.
    pub(crate) fn kv_delete_prefix(&self, prefix: &str) -> Result<usize, AppError> {
        let conn = lock_conn!(self.conn);
        let removed = conn.execute(
            "DELETE FROM kv_store WHERE substr(key, 1, length(?1)) = ?1",
            params![prefix],
        )?;
        Ok(removed)
    }
}
