use async_trait::async_trait;
use std::future::Future;
use tokio::time::Instant;

use super::rows::Rows;
use super::value::Value;
use crate::driver::QueryContext;
use crate::error::DriverError;

/// SQL dialect spoken by a driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
  Postgres,
  Sqlite,
}

impl SqlDialect {
  /// Positional placeholder for the 1-based argument `index`
  pub fn placeholder(&self, index: usize) -> String {
    match self {
      Self::Postgres => format!("${}", index),
      Self::Sqlite => format!("?{}", index),
    }
  }

  pub fn name(&self) -> &'static str {
    match self {
      Self::Postgres => "postgres",
      Self::Sqlite => "sqlite",
    }
  }
}

impl std::fmt::Display for SqlDialect {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.name())
  }
}

/// Outcome of a statement that returns no rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
  pub rows_affected: u64,
  pub last_insert_id: Option<i64>,
}

/// Abstract SQL execution driver
#[async_trait]
pub trait Driver: Send + Sync {
  fn dialect(&self) -> SqlDialect;

  async fn exec(
    &self,
    ctx: &mut QueryContext,
    query: &str,
    args: &[Value],
  ) -> Result<ExecResult, DriverError>;

  async fn query(
    &self,
    ctx: &mut QueryContext,
    query: &str,
    args: &[Value],
  ) -> Result<Rows, DriverError>;

  async fn close(&self) -> Result<(), DriverError>;
}

/// Run `fut` under the caller's deadline, if one is set.
pub async fn with_deadline<T, F>(deadline: Option<Instant>, fut: F) -> Result<T, DriverError>
where
  F: Future<Output = Result<T, DriverError>>,
{
  match deadline {
    Some(at) => tokio::time::timeout_at(at, fut)
      .await
      .map_err(|_| DriverError::Timeout)?,
    None => fut.await,
  }
}
