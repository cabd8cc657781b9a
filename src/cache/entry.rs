//! Cached result sets and the keys they are stored under

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::Value;

/// A captured result set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entry {
  pub columns: Vec<String>,
  pub rows: Vec<Vec<Value>>,
}

impl Entry {
  pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
    Self { columns, rows }
  }

  /// Every row must be exactly as wide as `columns`.
  pub fn is_valid(&self) -> bool {
    let width = self.columns.len();
    self.rows.iter().all(|r| r.len() == width)
  }

  pub fn is_empty(&self) -> bool {
    self.rows.is_empty()
  }

  pub fn len(&self) -> usize {
    self.rows.len()
  }

  pub fn approximate_size(&self) -> usize {
    let header: usize = self.columns.iter().map(|c| c.len() + 8).sum();
    let body: usize = self
      .rows
      .iter()
      .map(|r| r.iter().map(Value::approximate_size).sum::<usize>() + 8)
      .sum();
    header + body
  }
}

/// Cache key.
///
/// Either the hex digest of a query and its arguments, or an explicit
/// `"<entity-type>:<entity-id>"` used to look up invalidation markers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(String);

impl Key {
  pub fn new(key: impl Into<String>) -> Self {
    Self(key.into())
  }

  /// Explicit entity key, `"<entity-type>:<entity-id>"`.
  pub fn entity(entity_type: &str, id: impl fmt::Display) -> Self {
    Self(format!("{}:{}", entity_type, id))
  }

  /// Namespace the key; an empty prefix returns it unchanged.
  pub fn with_prefix(&self, prefix: &str) -> Self {
    if prefix.is_empty() {
      return self.clone();
    }
    Self(format!("{}{}", prefix, self.0))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  pub fn into_string(self) -> String {
    self.0
  }
}

impl fmt::Display for Key {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl AsRef<str> for Key {
  fn as_ref(&self) -> &str {
    &self.0
  }
}

impl From<String> for Key {
  fn from(s: String) -> Self {
    Self(s)
  }
}

impl From<&str> for Key {
  fn from(s: &str) -> Self {
    Self(s.to_string())
  }
}
