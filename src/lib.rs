//! Read-through / write-invalidate result cache for SQL drivers.
//!
//! [`CachingDriver`] wraps any [`Driver`] and serves repeated SELECTs from a
//! [`CacheStore`]. Mutations reported through a [`ChangeNotifier`] mark
//! entities dirty so that queries tied to them are refreshed.

pub mod cache;
pub mod config;
pub mod db;
pub mod driver;
pub mod error;

pub use cache::{CacheStore, Entry, EvictionPolicy, Key, MemoryStore, SkipMode, TieredStore};
pub use config::{DriverConfig, RowCacheConfig};
pub use db::{Destination, Driver, ExecResult, FromValue, MemoryRows, Rows, SqlDialect, Value};
pub use driver::{
  CachingDriver, CachingDriverBuilder, ChangeNotifier, ChangeSet, DefaultKeyDeriver,
  DriverRegistry, KeyDeriver, Mutation, MutationOp, QueryContext, QueryOptions, Stats,
};
pub use error::{ConfigError, ConvertError, DriverError, KeyError, StoreError};

#[cfg(feature = "postgres")]
pub use db::PostgresDriver;
#[cfg(feature = "sqlite")]
pub use db::SqliteDriver;
