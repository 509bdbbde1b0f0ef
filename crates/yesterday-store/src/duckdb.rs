//! `DuckDB`-backed storage.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use ::duckdb::{Connection, ToSql};
use tracing::debug;

use crate::{KeyValueStore, StoreConfig, StoreError, StoreFuture};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv_store (\
     key TEXT PRIMARY KEY, \
     value TEXT NOT NULL, \
     updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP)";

/// [`KeyValueStore`] persisted in a single `kv_store` table.
///
/// `DuckDB` calls are synchronous, so every operation runs on the blocking
/// pool with the connection mutex held only inside that closure.
#[derive(Clone)]
pub struct DuckDbStore {
    db_path: Option<PathBuf>,
    connection: Arc<Mutex<Connection>>,
}

impl DuckDbStore {
    /// Open (or create) the database described by `config`.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let connection = Connection::open(config.db_path.as_path())?;
        Self::initialize(connection, Some(config.db_path))
    }

    /// In-memory database; contents vanish with the store.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::initialize(Connection::open_in_memory()?, None)
    }

    fn initialize(connection: Connection, db_path: Option<PathBuf>) -> Result<Self, StoreError> {
        connection.execute_batch("PRAGMA disable_progress_bar;")?;
        connection.execute_batch(SCHEMA)?;
        debug!(path = ?db_path, "opened duckdb store");
        Ok(Self {
            db_path,
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Path of the database file, `None` for in-memory stores.
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    async fn run_blocking<T, F>(&self, operation: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, ::duckdb::Error> + Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        tokio::task::spawn_blocking(move || {
            let guard = connection.lock().unwrap_or_else(PoisonError::into_inner);
            operation(&guard).map_err(StoreError::from)
        })
        .await
        .map_err(|error| StoreError::Task(error.to_string()))?
    }
}

impl KeyValueStore for DuckDbStore {
    fn read<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        let key = key.to_owned();
        Box::pin(self.run_blocking(move |connection| {
            let params: [&dyn ToSql; 1] = [&key];
            match connection.query_row(
                "SELECT value FROM kv_store WHERE key = ?",
                params.as_slice(),
                |row| row.get::<_, String>(0),
            ) {
                Ok(value) => Ok(Some(value)),
                Err(::duckdb::Error::QueryReturnedNoRows) => Ok(None),
                Err(error) => Err(error),
            }
        }))
    }

    fn write<'a>(&'a self, key: &'a str, value: &'a str) -> StoreFuture<'a, ()> {
        let key = key.to_owned();
        let value = value.to_owned();
        Box::pin(self.run_blocking(move |connection| {
            let params: [&dyn ToSql; 2] = [&key, &value];
            connection.execute(
                "INSERT OR REPLACE INTO kv_store (key, value, updated_at) \
                 VALUES (?, ?, CURRENT_TIMESTAMP)",
                params.as_slice(),
            )?;
            Ok(())
        }))
    }

    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        let key = key.to_owned();
        Box::pin(self.run_blocking(move |connection| {
            let params: [&dyn ToSql; 1] = [&key];
            connection.execute("DELETE FROM kv_store WHERE key = ?", params.as_slice())?;
            Ok(())
        }))
    }

    fn keys<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<String>> {
        let prefix = prefix.to_owned();
        Box::pin(self.run_blocking(move |connection| {
            let mut statement = connection
                .prepare("SELECT key FROM kv_store WHERE starts_with(key, ?) ORDER BY key")?;
            let params: [&dyn ToSql; 1] = [&prefix];
            let rows = statement.query_map(params.as_slice(), |row| row.get::<_, String>(0))?;
            rows.collect()
        }))
    }
}
