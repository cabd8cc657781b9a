//! Redis-backed store for sharing cached results between processes

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};
use std::sync::Arc;
use std::time::Duration;

use super::entry::{Entry, Key};
use super::store::{CacheStore, SkipMode};
use crate::error::StoreError;

/// Remote tier. Entries are MessagePack-encoded; TTLs are set in milliseconds.
pub struct RedisStore {
  connection: ConnectionManager,
  default_ttl: Option<Duration>,
}

impl RedisStore {
  pub async fn new(url: &str) -> Result<Self, StoreError> {
    let client = Client::open(url).map_err(backend)?;
    let connection = ConnectionManager::new(client).await.map_err(backend)?;
    tracing::info!("Connected to Redis cache store");
    Ok(Self {
      connection,
      default_ttl: None,
    })
  }

  pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
    self.default_ttl = Some(ttl);
    self
  }

  /// Test the connection to Redis
  pub async fn ping(&self) -> Result<(), StoreError> {
    let mut conn = self.connection.clone();
    redis::cmd("PING")
      .query_async::<()>(&mut conn)
      .await
      .map_err(backend)
  }
}

fn backend(e: RedisError) -> StoreError {
  StoreError::Backend(e.to_string())
}

#[async_trait]
impl CacheStore for RedisStore {
  async fn get(&self, key: &Key, skip: SkipMode) -> Result<Arc<Entry>, StoreError> {
    if skip.skips_remote() {
      return Err(StoreError::NotFound);
    }
    let mut conn = self.connection.clone();
    let raw: Option<Vec<u8>> = conn.get(key.as_str()).await.map_err(backend)?;
    let raw = raw.ok_or(StoreError::NotFound)?;
    let entry: Entry =
      rmp_serde::from_slice(&raw).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(Arc::new(entry))
  }

  async fn set(
    &self,
    key: &Key,
    entry: Entry,
    ttl: Option<Duration>,
    skip: SkipMode,
  ) -> Result<(), StoreError> {
    if skip.skips_remote() {
      return Ok(());
    }
    let raw =
      rmp_serde::to_vec_named(&entry).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let mut conn = self.connection.clone();
    match ttl.filter(|d| !d.is_zero()).or(self.default_ttl) {
      Some(ttl) => {
        let millis = ttl.as_millis().max(1) as u64;
        conn
          .pset_ex::<_, _, ()>(key.as_str(), raw, millis)
          .await
          .map_err(backend)
      }
      None => conn
        .set::<_, _, ()>(key.as_str(), raw)
        .await
        .map_err(backend),
    }
  }

  async fn has(&self, key: &Key) -> Result<bool, StoreError> {
    let mut conn = self.connection.clone();
    conn.exists(key.as_str()).await.map_err(backend)
  }

  async fn del(&self, key: &Key) -> Result<(), StoreError> {
    let mut conn = self.connection.clone();
    conn
      .del::<_, ()>(key.as_str())
      .await
      .map_err(backend)
  }
}
