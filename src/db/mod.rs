//! SQL execution drivers and the value/cursor types they exchange.

pub mod backend;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod rows;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod value;

pub use backend::{with_deadline, Driver, ExecResult, SqlDialect};
#[cfg(feature = "postgres")]
pub use postgres::PostgresDriver;
pub use rows::{ColumnScanner, ColumnType, MemoryRows, Rows};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDriver;
pub use value::{assign, Destination, FromValue, Value};
