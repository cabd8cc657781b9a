#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use rowcache::{
  CacheStore, Driver, DriverError, Entry, ExecResult, Key, MemoryRows, QueryContext, Rows,
  SkipMode, SqlDialect, StoreError, Value,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Backend returning a fixed result set and counting the calls it serves.
pub struct MockDriver {
  columns: Vec<String>,
  rows: Mutex<Vec<Vec<Value>>>,
  queries: AtomicUsize,
  execs: AtomicUsize,
  failure: Mutex<Option<String>>,
  delay: Mutex<Option<Duration>>,
}

impl MockDriver {
  pub fn new(columns: &[&str], rows: Vec<Vec<Value>>) -> Arc<Self> {
    Arc::new(Self {
      columns: columns.iter().map(|c| c.to_string()).collect(),
      rows: Mutex::new(rows),
      queries: AtomicUsize::new(0),
      execs: AtomicUsize::new(0),
      failure: Mutex::new(None),
      delay: Mutex::new(None),
    })
  }

  /// `SELECT age FROM users` over three rows.
  pub fn ages() -> Arc<Self> {
    Self::new(
      &["age"],
      vec![
        vec![Value::Real(20.1)],
        vec![Value::Real(30.2)],
        vec![Value::Real(40.5)],
      ],
    )
  }

  pub fn queries(&self) -> usize {
    self.queries.load(Ordering::SeqCst)
  }

  pub fn execs(&self) -> usize {
    self.execs.load(Ordering::SeqCst)
  }

  pub fn set_rows(&self, rows: Vec<Vec<Value>>) {
    *self.rows.lock() = rows;
  }

  pub fn fail_with(&self, message: &str) {
    *self.failure.lock() = Some(message.to_string());
  }

  pub fn set_delay(&self, delay: Duration) {
    *self.delay.lock() = Some(delay);
  }

  async fn pause(&self) {
    let delay = *self.delay.lock();
    if let Some(delay) = delay {
      tokio::time::sleep(delay).await;
    }
  }
}

#[async_trait]
impl Driver for MockDriver {
  fn dialect(&self) -> SqlDialect {
    SqlDialect::Sqlite
  }

  async fn exec(
    &self,
    _ctx: &mut QueryContext,
    _query: &str,
    _args: &[Value],
  ) -> Result<ExecResult, DriverError> {
    self.execs.fetch_add(1, Ordering::SeqCst);
    self.pause().await;
    Ok(ExecResult {
      rows_affected: 1,
      last_insert_id: None,
    })
  }

  async fn query(
    &self,
    _ctx: &mut QueryContext,
    _query: &str,
    _args: &[Value],
  ) -> Result<Rows, DriverError> {
    self.queries.fetch_add(1, Ordering::SeqCst);
    self.pause().await;
    let failure = self.failure.lock().clone();
    if let Some(message) = failure {
      return Err(DriverError::Other(anyhow::anyhow!(message)));
    }
    Ok(Rows::new(MemoryRows::new(
      self.columns.clone(),
      self.rows.lock().clone(),
    )))
  }

  async fn close(&self) -> Result<(), DriverError> {
    Ok(())
  }
}

/// Store whose every operation faults.
pub struct FailingStore;

#[async_trait]
impl CacheStore for FailingStore {
  async fn get(&self, _key: &Key, _skip: SkipMode) -> Result<Arc<Entry>, StoreError> {
    Err(StoreError::Backend("connection refused".into()))
  }

  async fn set(
    &self,
    _key: &Key,
    _entry: Entry,
    _ttl: Option<Duration>,
    _skip: SkipMode,
  ) -> Result<(), StoreError> {
    Err(StoreError::Backend("connection refused".into()))
  }

  async fn has(&self, _key: &Key) -> Result<bool, StoreError> {
    Err(StoreError::Backend("connection refused".into()))
  }

  async fn del(&self, _key: &Key) -> Result<(), StoreError> {
    Err(StoreError::Backend("connection refused".into()))
  }
}

/// Store that never answers.
pub struct HangingStore;

#[async_trait]
impl CacheStore for HangingStore {
  async fn get(&self, _key: &Key, _skip: SkipMode) -> Result<Arc<Entry>, StoreError> {
    std::future::pending().await
  }

  async fn set(
    &self,
    _key: &Key,
    _entry: Entry,
    _ttl: Option<Duration>,
    _skip: SkipMode,
  ) -> Result<(), StoreError> {
    Ok(())
  }

  async fn has(&self, _key: &Key) -> Result<bool, StoreError> {
    Ok(false)
  }

  async fn del(&self, _key: &Key) -> Result<(), StoreError> {
    Ok(())
  }
}

/// Store that always misses and fails every write.
pub struct WriteFailingStore;

#[async_trait]
impl CacheStore for WriteFailingStore {
  async fn get(&self, _key: &Key, _skip: SkipMode) -> Result<Arc<Entry>, StoreError> {
    Err(StoreError::NotFound)
  }

  async fn set(
    &self,
    _key: &Key,
    _entry: Entry,
    _ttl: Option<Duration>,
    _skip: SkipMode,
  ) -> Result<(), StoreError> {
    Err(StoreError::Backend("READONLY replica".into()))
  }

  async fn has(&self, _key: &Key) -> Result<bool, StoreError> {
    Ok(false)
  }

  async fn del(&self, _key: &Key) -> Result<(), StoreError> {
    Ok(())
  }
}

/// Store that always misses and never finishes a write.
pub struct StalledWriteStore;

#[async_trait]
impl CacheStore for StalledWriteStore {
  async fn get(&self, _key: &Key, _skip: SkipMode) -> Result<Arc<Entry>, StoreError> {
    Err(StoreError::NotFound)
  }

  async fn set(
    &self,
    _key: &Key,
    _entry: Entry,
    _ttl: Option<Duration>,
    _skip: SkipMode,
  ) -> Result<(), StoreError> {
    std::future::pending().await
  }

  async fn has(&self, _key: &Key) -> Result<bool, StoreError> {
    Ok(false)
  }

  async fn del(&self, _key: &Key) -> Result<(), StoreError> {
    Ok(())
  }
}

/// Run a query to completion and return its rows.
pub async fn fetch(
  driver: &dyn Driver,
  ctx: &mut QueryContext,
  query: &str,
  args: &[Value],
) -> Vec<Vec<Value>> {
  driver
    .query(ctx, query, args)
    .await
    .unwrap()
    .collect_values()
    .await
    .unwrap()
}
