use async_trait::async_trait;
use rusqlite::types::{ToSqlOutput, Type, ValueRef};
use rusqlite::{params_from_iter, ToSql};
use tokio_rusqlite::Connection;

use super::backend::{with_deadline, Driver, ExecResult, SqlDialect};
use super::rows::{ColumnType, MemoryRows, Rows};
use super::value::Value;
use crate::driver::QueryContext;
use crate::error::DriverError;

const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA cache_size = -64000;
PRAGMA temp_store = MEMORY;
PRAGMA mmap_size = 268435456;
PRAGMA foreign_keys = ON;
"#;

const MEMORY: &str = ":memory:";

/// SQLite execution driver.
///
/// Statements run on the connection's background thread; result sets are
/// materialized there and handed back as a [`MemoryRows`] cursor.
pub struct SqliteDriver {
  conn: Connection,
}

impl SqliteDriver {
  pub async fn new(path: &str) -> Result<Self, DriverError> {
    let conn = if path == MEMORY {
      Connection::open_in_memory().await?
    } else {
      let conn = Connection::open(path).await?;
      conn
        .call(|conn| conn.execute_batch(PRAGMAS).map_err(|e| e.into()))
        .await?;
      conn
    };

    tracing::debug!(path, "SQLite connection opened");
    Ok(Self { conn })
  }

  pub async fn in_memory() -> Result<Self, DriverError> {
    Self::new(MEMORY).await
  }

  /// Run a batch of semicolon-separated statements, e.g. a schema file.
  pub async fn execute_batch(&self, sql: &str) -> Result<(), DriverError> {
    let sql = sql.to_string();
    self
      .conn
      .call(move |conn| conn.execute_batch(&sql).map_err(|e| e.into()))
      .await?;
    tracing::info!("SQLite batch executed");
    Ok(())
  }
}

#[async_trait]
impl Driver for SqliteDriver {
  fn dialect(&self) -> SqlDialect {
    SqlDialect::Sqlite
  }

  async fn exec(
    &self,
    ctx: &mut QueryContext,
    query: &str,
    args: &[Value],
  ) -> Result<ExecResult, DriverError> {
    let sql = query.to_string();
    let args = args.to_vec();

    let call = async {
      self
        .conn
        .call(move |conn| {
          let changed = conn.execute(&sql, params_from_iter(args.iter()))?;
          Ok(ExecResult {
            rows_affected: changed as u64,
            last_insert_id: Some(conn.last_insert_rowid()),
          })
        })
        .await
        .map_err(DriverError::from)
    };
    with_deadline(ctx.deadline(), call).await
  }

  async fn query(
    &self,
    ctx: &mut QueryContext,
    query: &str,
    args: &[Value],
  ) -> Result<Rows, DriverError> {
    let sql = query.to_string();
    let args = args.to_vec();

    let call = async {
      self
        .conn
        .call(move |conn| {
          let mut stmt = conn.prepare_cached(&sql)?;
          let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
          let width = columns.len();

          let mut rows = stmt.query(params_from_iter(args.iter()))?;
          let mut out = Vec::new();
          while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
              values.push(from_sql(i, row.get_ref(i)?)?);
            }
            out.push(values);
          }
          Ok((columns, out))
        })
        .await
        .map_err(DriverError::from)
    };
    let (columns, rows) = with_deadline(ctx.deadline(), call).await?;

    let types = ColumnType::infer(columns.len(), &rows);
    Ok(Rows::new(MemoryRows::with_types(columns, types, rows)))
  }

  async fn close(&self) -> Result<(), DriverError> {
    self.conn.clone().close().await?;
    tracing::info!("SQLite connection closed");
    Ok(())
  }
}

impl ToSql for Value {
  fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
    Ok(match self {
      Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
      Value::Bool(b) => ToSqlOutput::Borrowed(ValueRef::Integer(i64::from(*b))),
      Value::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
      Value::Real(f) => ToSqlOutput::Borrowed(ValueRef::Real(*f)),
      Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
      Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
    })
  }
}

/// TEXT that is not valid UTF-8 fails the row instead of being rewritten.
fn from_sql(column: usize, value: ValueRef<'_>) -> rusqlite::Result<Value> {
  Ok(match value {
    ValueRef::Null => Value::Null,
    ValueRef::Integer(i) => Value::Integer(i),
    ValueRef::Real(f) => Value::Real(f),
    ValueRef::Text(t) => match std::str::from_utf8(t) {
      Ok(text) => Value::Text(text.to_string()),
      Err(e) => {
        return Err(rusqlite::Error::FromSqlConversionFailure(
          column,
          Type::Text,
          Box::new(e),
        ))
      }
    },
    ValueRef::Blob(b) => Value::Blob(b.to_vec()),
  })
}
