//! Cache store configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::store::EvictionPolicy;

/// Local (in-process) store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
  /// Maximum memory usage (e.g., "64mb", "1gb")
  #[serde(default = "default_max_memory")]
  pub max_memory: String,

  /// Eviction policy when memory limit is reached
  #[serde(default)]
  pub eviction: EvictionPolicy,

  /// TTL in seconds applied when a write carries none (0 = no expiry)
  #[serde(default)]
  pub default_ttl: u64,
}

fn default_max_memory() -> String {
  "64mb".to_string()
}

impl Default for StoreConfig {
  fn default() -> Self {
    Self {
      max_memory: default_max_memory(),
      eviction: EvictionPolicy::default(),
      default_ttl: 0,
    }
  }
}

impl StoreConfig {
  /// Parse memory size string (e.g., "64mb", "1gb") to bytes
  pub fn max_memory_bytes(&self) -> usize {
    parse_memory_size(&self.max_memory).unwrap_or(64 * 1024 * 1024)
  }

  pub fn default_ttl(&self) -> Option<Duration> {
    (self.default_ttl > 0).then(|| Duration::from_secs(self.default_ttl))
  }
}

/// Parse a memory size string to bytes
/// Supports: b, kb, mb, gb (case insensitive)
pub fn parse_memory_size(s: &str) -> Option<usize> {
  let s = s.trim().to_lowercase();

  let (digits, unit) = if let Some(n) = s.strip_suffix("gb") {
    (n, 1024 * 1024 * 1024)
  } else if let Some(n) = s.strip_suffix("mb") {
    (n, 1024 * 1024)
  } else if let Some(n) = s.strip_suffix("kb") {
    (n, 1024)
  } else if let Some(n) = s.strip_suffix('b') {
    (n, 1)
  } else {
    (s.as_str(), 1)
  };

  digits
    .trim()
    .parse::<usize>()
    .ok()
    .and_then(|n| n.checked_mul(unit))
}

/// Format bytes as human-readable string
pub fn format_memory_size(bytes: usize) -> String {
  const GB: usize = 1024 * 1024 * 1024;
  const MB: usize = 1024 * 1024;
  const KB: usize = 1024;

  if bytes >= GB {
    format!("{:.1}GB", bytes as f64 / GB as f64)
  } else if bytes >= MB {
    format!("{:.1}MB", bytes as f64 / MB as f64)
  } else if bytes >= KB {
    format!("{:.1}KB", bytes as f64 / KB as f64)
  } else {
    format!("{}B", bytes)
  }
}
