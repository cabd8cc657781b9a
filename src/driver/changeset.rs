//! Entity change markers and per-query ref stamps.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::cache::Key;
use crate::config::DEFAULT_GC_INTERVAL;

#[derive(Default)]
struct Maps {
  /// entity key -> last mutation
  changes: HashMap<Key, Instant>,
  /// hashed query key -> last evaluation against a change marker
  refs: HashMap<Key, Instant>,
}

/// Two timestamp maps behind one lock. Nothing here performs I/O while
/// the lock is held.
pub struct ChangeSet {
  maps: RwLock<Maps>,
  gc_interval: RwLock<Duration>,
}

impl Default for ChangeSet {
  fn default() -> Self {
    Self::new(DEFAULT_GC_INTERVAL)
  }
}

impl ChangeSet {
  /// A zero interval falls back to one hour.
  pub fn new(gc_interval: Duration) -> Self {
    Self {
      maps: RwLock::new(Maps::default()),
      gc_interval: RwLock::new(normalize_interval(gc_interval)),
    }
  }

  pub fn gc_interval(&self) -> Duration {
    *self.gc_interval.read()
  }

  /// Change the sweep age and period. A loop already running keeps its old
  /// period until it is restarted. Returns whether the interval changed.
  pub fn set_gc_interval(&self, gc_interval: Duration) -> bool {
    let gc_interval = normalize_interval(gc_interval);
    let mut current = self.gc_interval.write();
    if *current == gc_interval {
      return false;
    }
    *current = gc_interval;
    true
  }

  /// Stamp every key with the same current time.
  pub fn store<I>(&self, keys: I)
  where
    I: IntoIterator<Item = Key>,
  {
    let now = Instant::now();
    let mut maps = self.maps.write();
    for key in keys {
      maps.changes.insert(key, now);
    }
  }

  pub fn load(&self, key: &Key) -> Option<Instant> {
    self.maps.read().changes.get(key).copied()
  }

  pub fn delete(&self, key: &Key) {
    self.maps.write().changes.remove(key);
  }

  /// Load and delete a change marker in one step.
  pub fn take(&self, key: &Key) -> Option<Instant> {
    self.maps.write().changes.remove(key)
  }

  pub fn load_ref(&self, key: &Key) -> Option<Instant> {
    self.maps.read().refs.get(key).copied()
  }

  pub fn delete_ref(&self, key: &Key) {
    self.maps.write().refs.remove(key);
  }

  /// Load and delete a ref stamp in one step.
  pub fn take_ref(&self, key: &Key) -> Option<Instant> {
    self.maps.write().refs.remove(key)
  }

  /// Stamp `key` with the current time and return the previous stamp,
  /// `None` if there was none.
  pub fn load_or_store_ref(&self, key: &Key) -> Option<Instant> {
    self.maps.write().refs.insert(key.clone(), Instant::now())
  }

  pub fn changes_len(&self) -> usize {
    self.maps.read().changes.len()
  }

  pub fn refs_len(&self) -> usize {
    self.maps.read().refs.len()
  }

  /// Remove entries older than the GC interval. Returns how many
  /// `(changes, refs)` were dropped.
  pub fn gc(&self) -> (usize, usize) {
    let interval = self.gc_interval();
    let mut maps = self.maps.write();
    let before = (maps.changes.len(), maps.refs.len());
    maps.changes.retain(|_, at| at.elapsed() <= interval);
    maps.refs.retain(|_, at| at.elapsed() <= interval);
    (before.0 - maps.changes.len(), before.1 - maps.refs.len())
  }

  /// Start the sweep loop on the current tokio runtime.
  ///
  /// The task holds only a weak reference and exits on its own once the
  /// change set is dropped.
  pub fn spawn_gc(self: &Arc<Self>) -> GcHandle {
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
    let weak: Weak<Self> = Arc::downgrade(self);
    let period = self.gc_interval();

    let task = tokio::spawn(async move {
      let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
      tracing::info!(interval = ?period, "ChangeSet GC started");
      loop {
        tokio::select! {
          _ = &mut shutdown_rx => break,
          _ = ticker.tick() => {
            let Some(set) = weak.upgrade() else { break };
            let (changes, refs) = set.gc();
            if changes > 0 || refs > 0 {
              tracing::debug!(changes, refs, "ChangeSet GC sweep");
            }
          }
        }
      }
      tracing::info!("ChangeSet GC stopped");
    });

    GcHandle {
      shutdown: Some(shutdown_tx),
      task,
    }
  }
}

impl std::fmt::Debug for ChangeSet {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let maps = self.maps.read();
    f.debug_struct("ChangeSet")
      .field("changes", &maps.changes.len())
      .field("refs", &maps.refs.len())
      .field("gc_interval", &self.gc_interval())
      .finish()
  }
}

fn normalize_interval(interval: Duration) -> Duration {
  if interval.is_zero() {
    DEFAULT_GC_INTERVAL
  } else {
    interval
  }
}

/// Handle to a running GC loop. A sweep in progress always completes.
pub struct GcHandle {
  shutdown: Option<oneshot::Sender<()>>,
  task: JoinHandle<()>,
}

impl GcHandle {
  /// Signal the loop and wait for it to exit.
  pub async fn stop(mut self) {
    self.signal();
    if let Err(e) = (&mut self.task).await {
      tracing::warn!(error = %e, "ChangeSet GC task failed");
    }
  }

  /// Signal the loop without waiting for it.
  pub fn signal(&mut self) {
    if let Some(tx) = self.shutdown.take() {
      let _ = tx.send(());
    }
  }

  pub fn is_finished(&self) -> bool {
    self.task.is_finished()
  }
}
