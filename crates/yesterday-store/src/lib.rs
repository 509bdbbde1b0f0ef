//! # Yesterday Store
//!
//! Persistent key-value storage used by the historical-events cache.
//!
//! ## Overview
//!
//! The cache layer only needs three primitives from its backing store:
//! read a text value, write a text value, and remove a key. This crate
//! defines that contract as [`KeyValueStore`] and ships two backends:
//!
//! | Backend | Description |
//! |---------|-------------|
//! | [`MemoryStore`] | Process-local map, used by tests and `--ephemeral` runs |
//! | [`DuckDbStore`] | Single-table DuckDB database on disk |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use yesterday_store::{DuckDbStore, KeyValueStore, StoreConfig};
//!
//! # async fn demo() -> Result<(), yesterday_store::StoreError> {
//! let store = DuckDbStore::open(StoreConfig::default())?;
//! store.write("historical_events_07-20", "{}").await?;
//! assert_eq!(store.read("historical_events_07-20").await?.as_deref(), Some("{}"));
//! # Ok(())
//! # }
//! ```

pub mod duckdb;
pub mod memory;

use std::env;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use thiserror::Error;

pub use crate::duckdb::DuckDbStore;
pub use crate::memory::MemoryStore;

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error while preparing the database location.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The blocking storage task panicked or was cancelled.
    #[error("storage task failed: {0}")]
    Task(String),

    /// The store was configured to reject operations.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Boxed future returned by [`KeyValueStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Text key-value storage with scoped acquisition per call.
pub trait KeyValueStore: Send + Sync {
    fn read<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;
    fn write<'a>(&'a self, key: &'a str, value: &'a str) -> StoreFuture<'a, ()>;
    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;
    /// Lists keys starting with `prefix`, in ascending order.
    fn keys<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<String>>;
}

/// Location of the on-disk store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Root directory for yesterday data.
    pub yesterday_home: PathBuf,
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let yesterday_home = resolve_yesterday_home();
        let db_path = yesterday_home.join("cache").join("events.duckdb");
        Self {
            yesterday_home,
            db_path,
        }
    }
}

impl StoreConfig {
    /// Store rooted at an explicit home directory.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        let yesterday_home = home.into();
        let db_path = yesterday_home.join("cache").join("events.duckdb");
        Self {
            yesterday_home,
            db_path,
        }
    }
}

fn resolve_yesterday_home() -> PathBuf {
    if let Some(path) = env::var_os("YESTERDAY_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".yesterday");
    }

    PathBuf::from(".yesterday")
}
