//! Cache store trait and the in-process implementation

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::config::StoreConfig;
use super::entry::{Entry, Key};
use crate::error::StoreError;

/// Which cache tiers a single call bypasses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkipMode {
  #[default]
  None,
  /// Bypass the in-process tier
  Local,
  /// Bypass the remote tier
  Remote,
  /// Bypass the cache entirely
  All,
}

impl SkipMode {
  pub fn skips_local(self) -> bool {
    matches!(self, SkipMode::Local | SkipMode::All)
  }

  pub fn skips_remote(self) -> bool {
    matches!(self, SkipMode::Remote | SkipMode::All)
  }

  pub fn skips_all(self) -> bool {
    self == SkipMode::All
  }
}

impl std::str::FromStr for SkipMode {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "none" | "" => Ok(SkipMode::None),
      "local" => Ok(SkipMode::Local),
      "remote" => Ok(SkipMode::Remote),
      "all" | "skip" => Ok(SkipMode::All),
      _ => Err(format!("Unknown skip mode: {}", s)),
    }
  }
}

/// Eviction policy when memory limit is reached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
  /// Least Recently Used
  #[default]
  Lru,
  /// Least Frequently Used
  Lfu,
  Random,
  /// Refuse writes once full
  NoEviction,
}

impl std::str::FromStr for EvictionPolicy {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "lru" => Ok(EvictionPolicy::Lru),
      "lfu" => Ok(EvictionPolicy::Lfu),
      "random" => Ok(EvictionPolicy::Random),
      "noeviction" | "no-eviction" | "no_eviction" => Ok(EvictionPolicy::NoEviction),
      _ => Err(format!("Unknown eviction policy: {}", s)),
    }
  }
}

impl std::fmt::Display for EvictionPolicy {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      EvictionPolicy::Lru => write!(f, "lru"),
      EvictionPolicy::Lfu => write!(f, "lfu"),
      EvictionPolicy::Random => write!(f, "random"),
      EvictionPolicy::NoEviction => write!(f, "noeviction"),
    }
  }
}

/// Store-level counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
  pub keys: usize,
  pub memory_used: usize,
  pub memory_limit: usize,
  pub hits: u64,
  pub misses: u64,
  pub evictions: u64,
  pub expired: u64,
}

impl StoreStats {
  pub fn hit_rate(&self) -> f64 {
    let total = self.hits + self.misses;
    if total == 0 {
      0.0
    } else {
      self.hits as f64 / total as f64
    }
  }
}

/// Backend cache store.
///
/// `get` reports a miss with [`StoreError::NotFound`]; every other error is a
/// store fault. A `ttl` of `None` means the store's own default.
#[async_trait]
pub trait CacheStore: Send + Sync {
  async fn get(&self, key: &Key, skip: SkipMode) -> Result<Arc<Entry>, StoreError>;

  async fn set(
    &self,
    key: &Key,
    entry: Entry,
    ttl: Option<Duration>,
    skip: SkipMode,
  ) -> Result<(), StoreError>;

  async fn has(&self, key: &Key) -> Result<bool, StoreError>;

  async fn del(&self, key: &Key) -> Result<(), StoreError>;
}

struct Slot {
  entry: Arc<Entry>,
  expires_at: Option<Instant>,
  accessed_at: Instant,
  access_count: u64,
  size: usize,
}

impl Slot {
  fn new(key: &Key, entry: Entry, ttl: Option<Duration>) -> Self {
    let now = Instant::now();
    let size = entry.approximate_size() + key.as_str().len();
    Self {
      entry: Arc::new(entry),
      expires_at: ttl.map(|d| now + d),
      accessed_at: now,
      access_count: 0,
      size,
    }
  }

  fn is_expired(&self) -> bool {
    self
      .expires_at
      .map(|exp| Instant::now() > exp)
      .unwrap_or(false)
  }

  fn touch(&mut self) {
    self.accessed_at = Instant::now();
    self.access_count += 1;
  }
}

/// In-memory cache store with per-entry TTL and a memory bound
pub struct MemoryStore {
  data: RwLock<HashMap<Key, Slot>>,
  memory_used: AtomicUsize,
  memory_limit: usize,
  eviction_policy: EvictionPolicy,
  default_ttl: Option<Duration>,
  hits: AtomicU64,
  misses: AtomicU64,
  evictions: AtomicU64,
  expired: AtomicU64,
}

impl Default for MemoryStore {
  fn default() -> Self {
    Self::from_config(&StoreConfig::default())
  }
}

impl MemoryStore {
  pub fn new(
    memory_limit: usize,
    eviction_policy: EvictionPolicy,
    default_ttl: Option<Duration>,
  ) -> Self {
    Self {
      data: RwLock::new(HashMap::new()),
      memory_used: AtomicUsize::new(0),
      memory_limit,
      eviction_policy,
      default_ttl,
      hits: AtomicU64::new(0),
      misses: AtomicU64::new(0),
      evictions: AtomicU64::new(0),
      expired: AtomicU64::new(0),
    }
  }

  pub fn from_config(config: &StoreConfig) -> Self {
    Self::new(
      config.max_memory_bytes(),
      config.eviction,
      config.default_ttl(),
    )
  }

  /// Drop expired entries, returning how many were removed
  pub fn evict_expired(&self) -> usize {
    let mut data = self.data.write();
    let before = data.len();
    let mut freed = 0usize;
    data.retain(|_, slot| {
      if slot.is_expired() {
        freed += slot.size;
        false
      } else {
        true
      }
    });
    let count = before - data.len();
    self.memory_used.fetch_sub(freed, Ordering::Relaxed);
    self.expired.fetch_add(count as u64, Ordering::Relaxed);
    count
  }

  pub fn len(&self) -> usize {
    self.data.read().values().filter(|s| !s.is_expired()).count()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn info(&self) -> StoreStats {
    StoreStats {
      keys: self.len(),
      memory_used: self.memory_used.load(Ordering::Relaxed),
      memory_limit: self.memory_limit,
      hits: self.hits.load(Ordering::Relaxed),
      misses: self.misses.load(Ordering::Relaxed),
      evictions: self.evictions.load(Ordering::Relaxed),
      expired: self.expired.load(Ordering::Relaxed),
    }
  }

  /// Evict entries (based on policy) until `needed` more bytes fit
  fn evict_for_space(&self, data: &mut HashMap<Key, Slot>, needed: usize) -> Result<(), StoreError> {
    let used = self.memory_used.load(Ordering::Relaxed);
    if used + needed <= self.memory_limit {
      return Ok(());
    }
    if self.eviction_policy == EvictionPolicy::NoEviction {
      return Err(StoreError::OutOfMemory);
    }

    let to_free = (used + needed).saturating_sub(self.memory_limit);
    let mut freed = 0usize;

    while freed < to_free && !data.is_empty() {
      let victim = match self.eviction_policy {
        EvictionPolicy::Lru => data
          .iter()
          .min_by_key(|(_, slot)| slot.accessed_at)
          .map(|(k, _)| k.clone()),
        EvictionPolicy::Lfu => data
          .iter()
          .min_by_key(|(_, slot)| slot.access_count)
          .map(|(k, _)| k.clone()),
        EvictionPolicy::Random => {
          let keys: Vec<_> = data.keys().cloned().collect();
          keys.choose(&mut rand::thread_rng()).cloned()
        }
        EvictionPolicy::NoEviction => None,
      };

      let Some(key) = victim else { break };
      if let Some(slot) = data.remove(&key) {
        freed += slot.size;
        self.evictions.fetch_add(1, Ordering::Relaxed);
      }
    }

    self.memory_used.fetch_sub(freed, Ordering::Relaxed);
    if freed >= to_free {
      Ok(())
    } else {
      Err(StoreError::OutOfMemory)
    }
  }
}

#[async_trait]
impl CacheStore for MemoryStore {
  async fn get(&self, key: &Key, skip: SkipMode) -> Result<Arc<Entry>, StoreError> {
    if skip.skips_local() {
      return Err(StoreError::NotFound);
    }

    let mut data = self.data.write();
    let expired = match data.get_mut(key) {
      Some(slot) if !slot.is_expired() => {
        slot.touch();
        self.hits.fetch_add(1, Ordering::Relaxed);
        return Ok(slot.entry.clone());
      }
      Some(_) => true,
      None => false,
    };

    if expired {
      if let Some(slot) = data.remove(key) {
        self.memory_used.fetch_sub(slot.size, Ordering::Relaxed);
        self.expired.fetch_add(1, Ordering::Relaxed);
      }
    }
    self.misses.fetch_add(1, Ordering::Relaxed);
    Err(StoreError::NotFound)
  }

  async fn set(
    &self,
    key: &Key,
    entry: Entry,
    ttl: Option<Duration>,
    skip: SkipMode,
  ) -> Result<(), StoreError> {
    if skip.skips_local() {
      return Ok(());
    }

    let ttl = ttl.filter(|d| !d.is_zero()).or(self.default_ttl);
    let slot = Slot::new(key, entry, ttl);
    let new_size = slot.size;
    if new_size > self.memory_limit {
      return Err(StoreError::OutOfMemory);
    }

    let mut data = self.data.write();
    if let Some(old) = data.remove(key) {
      self.memory_used.fetch_sub(old.size, Ordering::Relaxed);
    }
    self.evict_for_space(&mut data, new_size)?;
    data.insert(key.clone(), slot);
    self.memory_used.fetch_add(new_size, Ordering::Relaxed);
    Ok(())
  }

  async fn has(&self, key: &Key) -> Result<bool, StoreError> {
    let data = self.data.read();
    Ok(data.get(key).map(|s| !s.is_expired()).unwrap_or(false))
  }

  async fn del(&self, key: &Key) -> Result<(), StoreError> {
    let mut data = self.data.write();
    if let Some(slot) = data.remove(key) {
      self.memory_used.fetch_sub(slot.size, Ordering::Relaxed);
    }
    Ok(())
  }
}
