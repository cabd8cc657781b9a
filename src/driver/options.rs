//! Per-call cache options.

use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::cache::{Key, SkipMode};

/// Options attached to one logical request.
///
/// The entity key is one-shot: the first SELECT that reads the options
/// consumes it, so follow-up queries of the same request (eager loading)
/// fall back to plain hashed caching.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
  /// Skip the lookup and refresh the stored entry.
  pub evict: bool,
  /// Do not store empty results.
  pub skip_not_found: bool,
  pub entry_key: Option<Key>,
  /// `entry_key` names an entity the query only partially reads.
  pub is_ref: bool,
  /// `None` uses the driver default for the query kind.
  pub ttl: Option<Duration>,
  pub skip_mode: SkipMode,
}

impl QueryOptions {
  /// Split into the options for this query and the ones left for the next.
  pub fn consume(&self) -> (QueryOptions, QueryOptions) {
    let this = self.clone();
    let remaining = QueryOptions {
      entry_key: None,
      is_ref: false,
      ..self.clone()
    };
    (this, remaining)
  }
}

/// Request-scoped carrier for [`QueryOptions`] and an optional deadline.
///
/// ```
/// use std::time::Duration;
/// use rowcache::QueryContext;
///
/// let ctx = QueryContext::new()
///   .with_entry_key("User", 1)
///   .with_ttl(Duration::from_secs(30));
/// assert!(ctx.options().entry_key.is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
  options: QueryOptions,
  deadline: Option<Instant>,
}

impl QueryContext {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_options(options: QueryOptions) -> Self {
    Self {
      options,
      deadline: None,
    }
  }

  /// Bypass the cache entirely.
  pub fn skip(self) -> Self {
    self.with_skip_mode(SkipMode::All)
  }

  /// Force a miss and refresh the stored entry.
  pub fn evict(mut self) -> Self {
    self.options.evict = true;
    self
  }

  pub fn skip_not_found(mut self) -> Self {
    self.options.skip_not_found = true;
    self
  }

  /// Tie the next query to an entity invalidated by mutations.
  pub fn with_entry_key(mut self, entity_type: &str, id: impl fmt::Display) -> Self {
    self.options.entry_key = Some(Key::entity(entity_type, id));
    self.options.is_ref = false;
    self
  }

  /// Like [`with_entry_key`](Self::with_entry_key) for queries that read
  /// only part of the entity.
  pub fn with_ref_entry_key(mut self, entity_type: &str, id: impl fmt::Display) -> Self {
    self.options.entry_key = Some(Key::entity(entity_type, id));
    self.options.is_ref = true;
    self
  }

  /// A zero TTL leaves the driver default in place.
  pub fn with_ttl(mut self, ttl: Duration) -> Self {
    self.options.ttl = (!ttl.is_zero()).then_some(ttl);
    self
  }

  pub fn with_skip_mode(mut self, mode: SkipMode) -> Self {
    self.options.skip_mode = mode;
    self
  }

  pub fn with_timeout(self, timeout: Duration) -> Self {
    self.with_deadline(Instant::now() + timeout)
  }

  pub fn with_deadline(mut self, deadline: Instant) -> Self {
    self.deadline = Some(deadline);
    self
  }

  pub fn options(&self) -> &QueryOptions {
    &self.options
  }

  pub fn deadline(&self) -> Option<Instant> {
    self.deadline
  }

  /// Options for the query about to run; the entity key is cleared for
  /// later queries sharing this context.
  pub fn take_options(&mut self) -> QueryOptions {
    let (this, remaining) = self.options.consume();
    self.options = remaining;
    this
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_entry_key_is_one_shot() {
    let mut ctx = QueryContext::new()
      .with_ref_entry_key("User", 7)
      .with_ttl(Duration::from_secs(5));

    let first = ctx.take_options();
    assert_eq!(first.entry_key, Some(Key::entity("User", 7)));
    assert!(first.is_ref);

    let second = ctx.take_options();
    assert_eq!(second.entry_key, None);
    assert!(!second.is_ref);
    assert_eq!(second.ttl, Some(Duration::from_secs(5)));
  }

  #[test]
  fn test_consume_leaves_original_untouched() {
    let opts = QueryContext::new().with_entry_key("Group", "g1").options().clone();
    let (this, remaining) = opts.consume();
    assert_eq!(this, opts);
    assert!(remaining.entry_key.is_none());
  }

  #[test]
  fn test_zero_ttl_is_unset() {
    let ctx = QueryContext::new().with_ttl(Duration::ZERO);
    assert_eq!(ctx.options().ttl, None);
  }

  #[test]
  fn test_skip_sets_all() {
    let ctx = QueryContext::new().skip();
    assert!(ctx.options().skip_mode.skips_all());
  }
}
