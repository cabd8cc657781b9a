//! Runtime driver settings and the YAML configuration file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::cache::StoreConfig;
use crate::error::ConfigError;

pub const DEFAULT_DRIVER_NAME: &str = "default";
pub const DEFAULT_HASH_QUERY_TTL: Duration = Duration::from_secs(60);
pub const DEFAULT_KEY_QUERY_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Settings of one named caching driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
  /// Registry slot name
  pub name: String,
  /// TTL of entries cached without an explicit entity key
  pub hash_query_ttl: Duration,
  /// TTL of entries cached under an explicit or ref entity key
  pub key_query_ttl: Duration,
  /// Change markers older than this are swept
  pub gc_interval: Duration,
  /// Prepended to every storage key
  pub cache_prefix: String,
}

impl Default for DriverConfig {
  fn default() -> Self {
    Self {
      name: DEFAULT_DRIVER_NAME.to_string(),
      hash_query_ttl: DEFAULT_HASH_QUERY_TTL,
      key_query_ttl: DEFAULT_KEY_QUERY_TTL,
      gc_interval: DEFAULT_GC_INTERVAL,
      cache_prefix: String::new(),
    }
  }
}

impl DriverConfig {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      ..Self::default()
    }
  }

  pub fn with_hash_query_ttl(mut self, ttl: Duration) -> Self {
    self.hash_query_ttl = ttl;
    self
  }

  pub fn with_key_query_ttl(mut self, ttl: Duration) -> Self {
    self.key_query_ttl = ttl;
    self
  }

  pub fn with_gc_interval(mut self, interval: Duration) -> Self {
    self.gc_interval = interval;
    self
  }

  pub fn with_cache_prefix(mut self, prefix: impl Into<String>) -> Self {
    self.cache_prefix = prefix.into();
    self
  }
}

/// Expand environment variables in a string.
/// Supports $VAR_NAME and ${VAR_NAME} syntax; unset variables expand to "".
fn expand_env_vars(input: &str) -> String {
  let mut out = String::with_capacity(input.len());
  let mut rest = input;

  while let Some(pos) = rest.find('$') {
    out.push_str(&rest[..pos]);
    let after = &rest[pos + 1..];

    if let Some(braced) = after.strip_prefix('{') {
      if let Some(end) = braced.find('}') {
        out.push_str(&std::env::var(&braced[..end]).unwrap_or_default());
        rest = &braced[end + 1..];
        continue;
      }
      out.push('$');
      rest = after;
      continue;
    }

    let len: usize = after
      .chars()
      .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
      .map(char::len_utf8)
      .sum();
    if len == 0 {
      out.push('$');
    } else {
      out.push_str(&std::env::var(&after[..len]).unwrap_or_default());
    }
    rest = &after[len..];
  }

  out.push_str(rest);
  out
}

/// Contents of `rowcache.yaml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RowCacheConfig {
  #[serde(default)]
  pub cache: CacheSection,
  #[serde(default)]
  pub sqlite: SqliteSection,
  #[serde(default)]
  pub postgres: PostgresSection,
  #[serde(default)]
  pub redis: RedisSection,
  #[serde(default)]
  pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSection {
  #[serde(default = "default_name")]
  pub name: String,
  /// Seconds
  #[serde(default = "default_hash_query_ttl")]
  pub hash_query_ttl: u64,
  /// Seconds
  #[serde(default = "default_key_query_ttl")]
  pub key_query_ttl: u64,
  /// Seconds
  #[serde(default = "default_gc_interval")]
  pub gc_interval: u64,
  #[serde(default)]
  pub cache_prefix: String,
  #[serde(default)]
  pub store: StoreConfig,
}

fn default_name() -> String {
  DEFAULT_DRIVER_NAME.into()
}

fn default_hash_query_ttl() -> u64 {
  DEFAULT_HASH_QUERY_TTL.as_secs()
}

fn default_key_query_ttl() -> u64 {
  DEFAULT_KEY_QUERY_TTL.as_secs()
}

fn default_gc_interval() -> u64 {
  DEFAULT_GC_INTERVAL.as_secs()
}

impl Default for CacheSection {
  fn default() -> Self {
    Self {
      name: default_name(),
      hash_query_ttl: default_hash_query_ttl(),
      key_query_ttl: default_key_query_ttl(),
      gc_interval: default_gc_interval(),
      cache_prefix: String::new(),
      store: StoreConfig::default(),
    }
  }
}

impl From<&CacheSection> for DriverConfig {
  fn from(section: &CacheSection) -> Self {
    Self {
      name: section.name.clone(),
      hash_query_ttl: Duration::from_secs(section.hash_query_ttl),
      key_query_ttl: Duration::from_secs(section.key_query_ttl),
      gc_interval: Duration::from_secs(section.gc_interval),
      cache_prefix: section.cache_prefix.clone(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteSection {
  #[serde(default = "default_sqlite_path")]
  pub path: String,
}

fn default_sqlite_path() -> String {
  ":memory:".into()
}

impl Default for SqliteSection {
  fn default() -> Self {
    Self {
      path: default_sqlite_path(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresSection {
  #[serde(default = "default_pg_url")]
  pub url: String,
  #[serde(default = "default_max_conn")]
  pub max_connections: usize,
}

fn default_pg_url() -> String {
  "postgres://localhost/rowcache".into()
}

fn default_max_conn() -> usize {
  20
}

impl Default for PostgresSection {
  fn default() -> Self {
    Self {
      url: default_pg_url(),
      max_connections: default_max_conn(),
    }
  }
}

/// Remote cache tier; disabled when `url` is empty
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedisSection {
  #[serde(default)]
  pub url: String,
}

impl RedisSection {
  pub fn is_configured(&self) -> bool {
    !self.url.is_empty()
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
  #[serde(default = "default_level")]
  pub level: String,
}

fn default_level() -> String {
  "info".into()
}

impl Default for LoggingSection {
  fn default() -> Self {
    Self {
      level: default_level(),
    }
  }
}

impl RowCacheConfig {
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(&path)?;
    Self::from_yaml(&content)
  }

  pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
    let expanded = expand_env_vars(content);
    let config: Self = serde_yaml::from_str(&expanded)?;
    config.validate()?;
    Ok(config)
  }

  pub fn find_and_load() -> Result<Option<Self>, ConfigError> {
    for p in ["rowcache.yaml", "rowcache.yml"] {
      if Path::new(p).exists() {
        tracing::info!("Loading config from {}", p);
        return Ok(Some(Self::from_file(p)?));
      }
    }
    Ok(None)
  }

  pub fn driver_config(&self) -> DriverConfig {
    DriverConfig::from(&self.cache)
  }

  fn validate(&self) -> Result<(), ConfigError> {
    if self.cache.name.is_empty() {
      return Err(ConfigError::Invalid("cache.name must not be empty".into()));
    }
    if self.cache.gc_interval == 0 {
      return Err(ConfigError::Invalid("cache.gc_interval must be positive".into()));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_expand_env_vars() {
    std::env::set_var("ROWCACHE_TEST_HOST", "db.local");
    assert_eq!(
      expand_env_vars("postgres://${ROWCACHE_TEST_HOST}/x"),
      "postgres://db.local/x"
    );
    assert_eq!(expand_env_vars("$ROWCACHE_TEST_HOST:5432"), "db.local:5432");
    assert_eq!(expand_env_vars("cost: 5$"), "cost: 5$");
    assert_eq!(expand_env_vars("${ROWCACHE_TEST_UNSET_VAR}"), "");
  }

  #[test]
  fn test_defaults() {
    let config = RowCacheConfig::from_yaml("{}").unwrap();
    let driver = config.driver_config();
    assert_eq!(driver, DriverConfig::default());
    assert_eq!(driver.hash_query_ttl, Duration::from_secs(60));
    assert_eq!(driver.key_query_ttl, Duration::from_secs(3600));
    assert!(!config.redis.is_configured());
  }

  #[test]
  fn test_cache_section() {
    let yaml = r#"
cache:
  name: users
  hash_query_ttl: 5
  cache_prefix: "app:"
  store:
    max_memory: 1mb
    eviction: random
logging:
  level: debug
"#;
    let config = RowCacheConfig::from_yaml(yaml).unwrap();
    let driver = config.driver_config();
    assert_eq!(driver.name, "users");
    assert_eq!(driver.hash_query_ttl, Duration::from_secs(5));
    assert_eq!(driver.cache_prefix, "app:");
    assert_eq!(config.cache.store.max_memory_bytes(), 1024 * 1024);
    assert_eq!(config.logging.level, "debug");
  }

  #[test]
  fn test_rejects_zero_gc_interval() {
    let err = RowCacheConfig::from_yaml("cache:\n  gc_interval: 0\n").unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
  }
}
