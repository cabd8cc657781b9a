//! Two-tier store: an in-process tier in front of a shared remote tier.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::entry::{Entry, Key};
use super::store::{CacheStore, SkipMode};
use crate::error::StoreError;

/// Reads local then remote, writes both. Each tier honors the per-call
/// [`SkipMode`]; a remote hit is copied into the local tier.
pub struct TieredStore {
  local: Arc<dyn CacheStore>,
  remote: Arc<dyn CacheStore>,
  local_ttl: Option<Duration>,
}

impl TieredStore {
  pub fn new(local: Arc<dyn CacheStore>, remote: Arc<dyn CacheStore>) -> Self {
    Self {
      local,
      remote,
      local_ttl: None,
    }
  }

  /// TTL used when backfilling the local tier from a remote hit.
  pub fn with_local_ttl(mut self, ttl: Duration) -> Self {
    self.local_ttl = Some(ttl);
    self
  }
}

#[async_trait]
impl CacheStore for TieredStore {
  async fn get(&self, key: &Key, skip: SkipMode) -> Result<Arc<Entry>, StoreError> {
    if !skip.skips_local() {
      match self.local.get(key, SkipMode::None).await {
        Ok(entry) => return Ok(entry),
        Err(StoreError::NotFound) => {}
        Err(e) => return Err(e),
      }
    }
    if skip.skips_remote() {
      return Err(StoreError::NotFound);
    }

    let entry = self.remote.get(key, SkipMode::None).await?;
    if !skip.skips_local() {
      let backfill = self
        .local
        .set(key, (*entry).clone(), self.local_ttl, SkipMode::None)
        .await;
      if let Err(e) = backfill {
        tracing::warn!(key = %key, error = %e, "local backfill failed");
      }
    }
    Ok(entry)
  }

  async fn set(
    &self,
    key: &Key,
    entry: Entry,
    ttl: Option<Duration>,
    skip: SkipMode,
  ) -> Result<(), StoreError> {
    match (skip.skips_local(), skip.skips_remote()) {
      (true, true) => Ok(()),
      (true, false) => self.remote.set(key, entry, ttl, SkipMode::None).await,
      (false, true) => self.local.set(key, entry, ttl, SkipMode::None).await,
      (false, false) => {
        let local = self
          .local
          .set(key, entry.clone(), ttl, SkipMode::None)
          .await;
        self.remote.set(key, entry, ttl, SkipMode::None).await?;
        local
      }
    }
  }

  async fn has(&self, key: &Key) -> Result<bool, StoreError> {
    if self.local.has(key).await? {
      return Ok(true);
    }
    self.remote.has(key).await
  }

  async fn del(&self, key: &Key) -> Result<(), StoreError> {
    let local = self.local.del(key).await;
    self.remote.del(key).await?;
    local
  }
}
