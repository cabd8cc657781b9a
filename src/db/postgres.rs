use async_trait::async_trait;
use bytes::BytesMut;
use chrono::{DateTime, NaiveDateTime, Utc};
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use postgres_types::{to_sql_checked, IsNull, ToSql, Type};
use tokio_postgres::{NoTls, Row};

use super::backend::{with_deadline, Driver, ExecResult, SqlDialect};
use super::rows::{ColumnType, MemoryRows, Rows};
use super::value::Value;
use crate::driver::QueryContext;
use crate::error::DriverError;

/// PostgreSQL execution driver backed by a deadpool connection pool.
pub struct PostgresDriver {
  pool: Pool,
}

impl PostgresDriver {
  pub fn new(url: &str, max_connections: usize) -> Result<Self, DriverError> {
    let mut cfg = Config::new();
    cfg.url = Some(url.into());
    cfg.manager = Some(ManagerConfig {
      recycling_method: RecyclingMethod::Fast,
    });
    cfg.pool = Some(PoolConfig::new(max_connections.max(1)));
    let pool = cfg
      .create_pool(Some(Runtime::Tokio1), NoTls)
      .map_err(|e| DriverError::Postgres(e.to_string()))?;
    Ok(Self { pool })
  }

  async fn client(&self) -> Result<deadpool_postgres::Client, DriverError> {
    self
      .pool
      .get()
      .await
      .map_err(|e| DriverError::Postgres(e.to_string()))
  }
}

fn params(args: &[Value]) -> Vec<&(dyn ToSql + Sync)> {
  args.iter().map(|a| a as &(dyn ToSql + Sync)).collect()
}

#[async_trait]
impl Driver for PostgresDriver {
  fn dialect(&self) -> SqlDialect {
    SqlDialect::Postgres
  }

  async fn exec(
    &self,
    ctx: &mut QueryContext,
    query: &str,
    args: &[Value],
  ) -> Result<ExecResult, DriverError> {
    let call = async {
      let client = self.client().await?;
      let stmt = client.prepare_cached(query).await?;
      let changed = client.execute(&stmt, &params(args)).await?;
      Ok::<_, DriverError>(ExecResult {
        rows_affected: changed,
        last_insert_id: None,
      })
    };
    with_deadline(ctx.deadline(), call).await
  }

  async fn query(
    &self,
    ctx: &mut QueryContext,
    query: &str,
    args: &[Value],
  ) -> Result<Rows, DriverError> {
    let call = async {
      let client = self.client().await?;
      let stmt = client.prepare_cached(query).await?;
      let rows = client.query(&stmt, &params(args)).await?;

      let columns: Vec<String> = stmt.columns().iter().map(|c| c.name().to_string()).collect();
      let types = stmt
        .columns()
        .iter()
        .map(|c| column_type(c.type_()))
        .collect::<Result<Vec<_>, _>>()?;

      let mut out = Vec::with_capacity(rows.len());
      for row in &rows {
        out.push(row_values(row)?);
      }
      Ok::<_, DriverError>((columns, types, out))
    };
    let (columns, types, rows) = with_deadline(ctx.deadline(), call).await?;
    Ok(Rows::new(MemoryRows::with_types(columns, types, rows)))
  }

  async fn close(&self) -> Result<(), DriverError> {
    self.pool.close();
    tracing::info!("PostgreSQL pool closed");
    Ok(())
  }
}

fn unsupported(ty: &Type) -> DriverError {
  DriverError::Postgres(format!("unsupported column type {}", ty))
}

fn column_type(ty: &Type) -> Result<ColumnType, DriverError> {
  let t = if *ty == Type::BOOL {
    ColumnType::Bool
  } else if *ty == Type::INT2 || *ty == Type::INT4 || *ty == Type::INT8 || *ty == Type::OID {
    ColumnType::Integer
  } else if *ty == Type::FLOAT4 || *ty == Type::FLOAT8 {
    ColumnType::Real
  } else if *ty == Type::BYTEA {
    ColumnType::Blob
  } else if is_textual(ty) {
    ColumnType::Text
  } else {
    return Err(unsupported(ty));
  };
  Ok(t)
}

fn is_textual(ty: &Type) -> bool {
  [
    Type::TEXT,
    Type::VARCHAR,
    Type::BPCHAR,
    Type::NAME,
    Type::UNKNOWN,
    Type::JSON,
    Type::JSONB,
    Type::TIMESTAMP,
    Type::TIMESTAMPTZ,
  ]
  .contains(ty)
}

fn row_values(row: &Row) -> Result<Vec<Value>, DriverError> {
  let mut values = Vec::with_capacity(row.len());
  for (i, column) in row.columns().iter().enumerate() {
    let ty = column.type_();
    let value: Value = if *ty == Type::BOOL {
      row.try_get::<_, Option<bool>>(i)?.into()
    } else if *ty == Type::INT2 {
      row.try_get::<_, Option<i16>>(i)?.into()
    } else if *ty == Type::INT4 {
      row.try_get::<_, Option<i32>>(i)?.into()
    } else if *ty == Type::INT8 {
      row.try_get::<_, Option<i64>>(i)?.into()
    } else if *ty == Type::OID {
      row.try_get::<_, Option<u32>>(i)?.into()
    } else if *ty == Type::FLOAT4 {
      row.try_get::<_, Option<f32>>(i)?.into()
    } else if *ty == Type::FLOAT8 {
      row.try_get::<_, Option<f64>>(i)?.into()
    } else if *ty == Type::BYTEA {
      row.try_get::<_, Option<Vec<u8>>>(i)?.into()
    } else if *ty == Type::TIMESTAMPTZ {
      row.try_get::<_, Option<DateTime<Utc>>>(i)?.into()
    } else if *ty == Type::TIMESTAMP {
      row
        .try_get::<_, Option<NaiveDateTime>>(i)?
        .map(|ts| ts.and_utc())
        .into()
    } else if *ty == Type::JSON || *ty == Type::JSONB {
      row
        .try_get::<_, Option<serde_json::Value>>(i)?
        .map(|json| json.to_string())
        .into()
    } else if is_textual(ty) {
      row.try_get::<_, Option<String>>(i)?.into()
    } else {
      return Err(unsupported(ty));
    };
    values.push(value);
  }
  Ok(values)
}

impl ToSql for Value {
  fn to_sql(
    &self,
    ty: &Type,
    out: &mut BytesMut,
  ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
    match self {
      Value::Null => Ok(IsNull::Yes),
      Value::Bool(b) => b.to_sql(ty, out),
      Value::Integer(i) => {
        if *ty == Type::INT2 {
          i16::try_from(*i)?.to_sql(ty, out)
        } else if *ty == Type::INT4 {
          i32::try_from(*i)?.to_sql(ty, out)
        } else if *ty == Type::FLOAT8 {
          (*i as f64).to_sql(ty, out)
        } else {
          i.to_sql(ty, out)
        }
      }
      Value::Real(f) => {
        if *ty == Type::FLOAT4 {
          (*f as f32).to_sql(ty, out)
        } else {
          f.to_sql(ty, out)
        }
      }
      Value::Text(s) => s.to_sql(ty, out),
      Value::Blob(b) => b.to_sql(ty, out),
    }
  }

  fn accepts(_ty: &Type) -> bool {
    true
  }

  to_sql_checked!();
}
