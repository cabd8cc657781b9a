//! The caching layer: a [`Driver`] wrapper that serves SELECT results from a
//! [`CacheStore`] and records misses into it.
//!
//! Query flow for a cacheable statement:
//!
//! 1. take the per-call options (the entity key is consumed here)
//! 2. `SkipMode::All`, or a key that cannot be derived, runs the backend as is
//! 3. resolve invalidation against the [`ChangeSet`]
//! 4. unless evicted, look the key up; a hit replays the stored rows
//! 5. on a miss the backend cursor is recorded and stored on close
//! 6. any other store error is counted and the backend runs uncached

mod changeset;
mod hook;
mod key;
mod options;
mod recorder;
mod registry;
mod replayer;
mod resolve;

pub use changeset::{ChangeSet, GcHandle};
pub use hook::{ChangeNotifier, Mutation, MutationOp};
pub use key::{DefaultKeyDeriver, KeyDeriver};
pub use options::{QueryContext, QueryOptions};
pub use recorder::{OnComplete, Recorder};
pub use registry::DriverRegistry;
pub use replayer::Replayer;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::Instant;

use crate::cache::{CacheStore, Entry, MemoryStore};
use crate::config::DriverConfig;
use crate::db::{with_deadline, Driver, ExecResult, Rows, SqlDialect, Value};
use crate::error::{DriverError, StoreError};
use resolve::{resolve, Resolved};

/// Cumulative counters of one caching driver
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
  /// Cacheable queries observed
  pub gets: u64,
  pub hits: u64,
  /// Store faults, on read or write
  pub errors: u64,
}

impl Stats {
  pub fn hit_rate(&self) -> f64 {
    if self.gets == 0 {
      0.0
    } else {
      self.hits as f64 / self.gets as f64
    }
  }
}

#[derive(Debug, Default)]
struct Counters {
  gets: AtomicU64,
  hits: AtomicU64,
  errors: AtomicU64,
}

impl Counters {
  fn snapshot(&self) -> Stats {
    Stats {
      gets: self.gets.load(Ordering::Relaxed),
      hits: self.hits.load(Ordering::Relaxed),
      errors: self.errors.load(Ordering::Relaxed),
    }
  }
}

/// Everything a registry re-registration may replace.
struct DriverState {
  config: DriverConfig,
  inner: Arc<dyn Driver>,
  store: Arc<dyn CacheStore>,
  change_set: Arc<ChangeSet>,
  deriver: Arc<dyn KeyDeriver>,
}

/// Builder for [`CachingDriver`]
pub struct CachingDriverBuilder {
  inner: Arc<dyn Driver>,
  config: DriverConfig,
  store: Option<Arc<dyn CacheStore>>,
  change_set: Option<Arc<ChangeSet>>,
  deriver: Option<Arc<dyn KeyDeriver>>,
}

impl CachingDriverBuilder {
  pub fn config(mut self, config: DriverConfig) -> Self {
    self.config = config;
    self
  }

  pub fn name(mut self, name: impl Into<String>) -> Self {
    self.config.name = name.into();
    self
  }

  pub fn store(mut self, store: Arc<dyn CacheStore>) -> Self {
    self.store = Some(store);
    self
  }

  pub fn change_set(mut self, change_set: Arc<ChangeSet>) -> Self {
    self.change_set = Some(change_set);
    self
  }

  pub fn key_deriver(mut self, deriver: Arc<dyn KeyDeriver>) -> Self {
    self.deriver = Some(deriver);
    self
  }

  pub(crate) fn driver_name(&self) -> &str {
    &self.config.name
  }

  fn into_state(self, existing: Option<Arc<ChangeSet>>) -> DriverState {
    let gc_interval = self.config.gc_interval;
    DriverState {
      store: self
        .store
        .unwrap_or_else(|| Arc::new(MemoryStore::default())),
      change_set: self
        .change_set
        .or(existing)
        .unwrap_or_else(|| Arc::new(ChangeSet::new(gc_interval))),
      deriver: self.deriver.unwrap_or_else(|| Arc::new(DefaultKeyDeriver)),
      inner: self.inner,
      config: self.config,
    }
  }

  pub fn build(self) -> CachingDriver {
    CachingDriver {
      state: RwLock::new(Arc::new(self.into_state(None))),
      counters: Arc::new(Counters::default()),
      gc: Mutex::new(None),
    }
  }
}

/// SQL driver with a read-through, write-invalidate result cache
pub struct CachingDriver {
  state: RwLock<Arc<DriverState>>,
  counters: Arc<Counters>,
  gc: Mutex<Option<GcHandle>>,
}

impl CachingDriver {
  pub fn builder(inner: Arc<dyn Driver>) -> CachingDriverBuilder {
    CachingDriverBuilder {
      inner,
      config: DriverConfig::default(),
      store: None,
      change_set: None,
      deriver: None,
    }
  }

  /// Wrap `inner` with an in-memory store and the given settings.
  pub fn new(inner: Arc<dyn Driver>, config: DriverConfig) -> Self {
    Self::builder(inner).config(config).build()
  }

  fn state(&self) -> Arc<DriverState> {
    self.state.read().clone()
  }

  /// Replace configuration, backend, store and deriver in place. Counters
  /// are kept, and so is the change set unless the builder supplies one.
  /// A kept change set takes the new GC interval.
  pub(crate) fn reconfigure(&self, builder: CachingDriverBuilder) {
    let replaces_change_set = builder.change_set.is_some();
    let existing = self.state().change_set.clone();
    let state = builder.into_state(Some(existing.clone()));
    let interval_changed =
      !replaces_change_set && existing.set_gc_interval(state.config.gc_interval);
    tracing::info!(name = %state.config.name, "Caching driver reconfigured");
    *self.state.write() = Arc::new(state);

    if replaces_change_set || interval_changed {
      self.restart_gc();
    }
  }

  /// Move a running GC loop onto the current change set and interval.
  fn restart_gc(&self) {
    let mut gc = self.gc.lock();
    if let Some(mut old) = gc.take() {
      old.signal();
      *gc = Some(self.state().change_set.spawn_gc());
    }
  }

  pub fn name(&self) -> String {
    self.state().config.name.clone()
  }

  pub fn config(&self) -> DriverConfig {
    self.state().config.clone()
  }

  pub fn stats(&self) -> Stats {
    self.counters.snapshot()
  }

  pub fn change_set(&self) -> Arc<ChangeSet> {
    self.state().change_set.clone()
  }

  pub fn store(&self) -> Arc<dyn CacheStore> {
    self.state().store.clone()
  }

  /// Derive the storage key a query would use, prefix included.
  pub fn cache_key(&self, query: &str, args: &[Value]) -> Option<crate::cache::Key> {
    let state = self.state();
    let key = state.deriver.derive(query, args).ok()?;
    Some(key.with_prefix(&state.config.cache_prefix))
  }

  /// Start the change set GC loop. Calling it again is a no-op.
  pub fn start_gc(&self) {
    let mut gc = self.gc.lock();
    if gc.as_ref().is_some_and(|h| !h.is_finished()) {
      return;
    }
    *gc = Some(self.state().change_set.spawn_gc());
  }

  pub async fn stop_gc(&self) {
    let handle = self.gc.lock().take();
    if let Some(handle) = handle {
      handle.stop().await;
    }
  }

  async fn backend(
    state: &DriverState,
    ctx: &mut QueryContext,
    query: &str,
    args: &[Value],
  ) -> Result<Rows, DriverError> {
    let deadline = ctx.deadline();
    with_deadline(deadline, state.inner.query(ctx, query, args)).await
  }

  fn recorder(
    &self,
    state: &DriverState,
    rows: Rows,
    resolved: Resolved,
    deadline: Option<Instant>,
  ) -> Rows {
    let store = state.store.clone();
    let counters = self.counters.clone();
    let Resolved {
      key,
      ttl,
      skip_not_found,
      skip_mode,
      ..
    } = resolved;

    let on_complete: OnComplete = Box::new(move |entry: Entry| -> BoxFuture<'static, ()> {
      Box::pin(async move {
        if skip_not_found && entry.is_empty() {
          return;
        }
        let write = store.set(&key, entry, ttl, skip_mode);
        if let Err(e) = within_deadline(deadline, write).await {
          counters.errors.fetch_add(1, Ordering::Relaxed);
          tracing::warn!(key = %key, error = %e, "failed storing entry in cache");
        }
      })
    });
    Rows::new(Recorder::new(rows.into_inner(), on_complete))
  }
}

/// Bound a store call by the caller's deadline. An elapsed deadline is a
/// store fault like any other.
async fn within_deadline<T, F>(deadline: Option<Instant>, call: F) -> Result<T, StoreError>
where
  F: Future<Output = Result<T, StoreError>>,
{
  match deadline {
    Some(at) => tokio::time::timeout_at(at, call)
      .await
      .unwrap_or(Err(StoreError::Timeout)),
    None => call.await,
  }
}

/// Only statements starting with SELECT (any case) are cached.
pub fn is_cacheable(query: &str) -> bool {
  query
    .get(..6)
    .is_some_and(|prefix| prefix.eq_ignore_ascii_case("select"))
}

#[async_trait]
impl Driver for CachingDriver {
  fn dialect(&self) -> SqlDialect {
    self.state().inner.dialect()
  }

  async fn exec(
    &self,
    ctx: &mut QueryContext,
    query: &str,
    args: &[Value],
  ) -> Result<ExecResult, DriverError> {
    let state = self.state();
    let deadline = ctx.deadline();
    with_deadline(deadline, state.inner.exec(ctx, query, args)).await
  }

  async fn query(
    &self,
    ctx: &mut QueryContext,
    query: &str,
    args: &[Value],
  ) -> Result<Rows, DriverError> {
    let state = self.state();
    if !is_cacheable(query) {
      return Self::backend(&state, ctx, query, args).await;
    }
    self.counters.gets.fetch_add(1, Ordering::Relaxed);

    let opts = ctx.take_options();
    if opts.skip_mode.skips_all() {
      tracing::debug!("cache skipped");
      return Self::backend(&state, ctx, query, args).await;
    }
    let hashed = match state.deriver.derive(query, args) {
      Ok(key) => key,
      Err(e) => {
        tracing::debug!(error = %e, "query not cached");
        return Self::backend(&state, ctx, query, args).await;
      }
    };
    let resolved = resolve(opts, hashed, &state.change_set, &state.config);

    if resolved.evict {
      tracing::debug!(key = %resolved.key, "cache evict");
    } else {
      let lookup = state.store.get(&resolved.key, resolved.skip_mode);
      match within_deadline(ctx.deadline(), lookup).await {
        Ok(entry) => {
          self.counters.hits.fetch_add(1, Ordering::Relaxed);
          tracing::debug!(key = %resolved.key, "cache hit");
          return Ok(Rows::new(Replayer::new(entry)));
        }
        Err(StoreError::NotFound) => {
          tracing::debug!(key = %resolved.key, "cache miss");
        }
        Err(e) => {
          self.counters.errors.fetch_add(1, Ordering::Relaxed);
          tracing::warn!(key = %resolved.key, error = %e, "cache lookup failed, querying backend");
          return Self::backend(&state, ctx, query, args).await;
        }
      }
    }

    let rows = Self::backend(&state, ctx, query, args).await?;
    Ok(self.recorder(&state, rows, resolved, ctx.deadline()))
  }

  async fn close(&self) -> Result<(), DriverError> {
    self.stop_gc().await;
    self.state().inner.close().await
  }
}

impl std::fmt::Debug for CachingDriver {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let state = self.state();
    f.debug_struct("CachingDriver")
      .field("config", &state.config)
      .field("stats", &self.stats())
      .field("change_set", &state.change_set)
      .finish()
  }
}
