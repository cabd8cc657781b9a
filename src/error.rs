//! Error types shared by the drivers, the cache stores and the caching layer.

use thiserror::Error;

/// Errors surfaced by an execution driver or a row cursor.
#[derive(Debug, Error)]
pub enum DriverError {
  #[error("sqlite: {0}")]
  Sqlite(String),
  #[error("postgres: {0}")]
  Postgres(String),
  /// `scan` was called with no current row.
  #[error("sql: no rows in result set")]
  NoRows,
  #[error("{0} is not supported")]
  Unsupported(&'static str),
  #[error("expected {expected} destination values, got {got}")]
  ColumnCount { expected: usize, got: usize },
  #[error("converting column {column}: {source}")]
  Convert {
    column: usize,
    #[source]
    source: ConvertError,
  },
  #[error("query deadline exceeded")]
  Timeout,
  #[error("rows are closed")]
  Closed,
  #[error(transparent)]
  Other(#[from] anyhow::Error),
}

#[cfg(feature = "sqlite")]
impl From<tokio_rusqlite::Error> for DriverError {
  fn from(e: tokio_rusqlite::Error) -> Self {
    DriverError::Sqlite(e.to_string())
  }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for DriverError {
  fn from(e: rusqlite::Error) -> Self {
    DriverError::Sqlite(e.to_string())
  }
}

#[cfg(feature = "postgres")]
impl From<tokio_postgres::Error> for DriverError {
  fn from(e: tokio_postgres::Error) -> Self {
    DriverError::Postgres(e.to_string())
  }
}

/// Errors returned by a [`CacheStore`](crate::cache::CacheStore).
#[derive(Debug, Clone, Error)]
pub enum StoreError {
  /// The miss sentinel. Not a fault.
  #[error("cache: entry not found")]
  NotFound,
  #[error("OOM: out of memory")]
  OutOfMemory,
  #[error("serialization: {0}")]
  Serialization(String),
  #[error("backend: {0}")]
  Backend(String),
  #[error("cache store deadline exceeded")]
  Timeout,
}

impl StoreError {
  pub fn is_not_found(&self) -> bool {
    matches!(self, StoreError::NotFound)
  }
}

/// Key derivation failure. The caller falls back to an uncached query.
#[derive(Debug, Clone, Error)]
#[error("cannot derive cache key: {0}")]
pub struct KeyError(pub String);

/// A driver value could not be assigned into a destination.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConvertError {
  #[error("cannot assign NULL into {0}")]
  Null(&'static str),
  #[error("value {value} overflows {target}")]
  Overflow { value: String, target: &'static str },
  #[error("cannot convert {from} {value:?} into {target}")]
  Invalid {
    from: &'static str,
    value: String,
    target: &'static str,
  },
}

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("reading config: {0}")]
  Io(#[from] std::io::Error),
  #[error("parsing config: {0}")]
  Parse(#[from] serde_yaml::Error),
  #[error("invalid config: {0}")]
  Invalid(String),
}
