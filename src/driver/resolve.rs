//! Effective option resolution against the change set.

use std::time::Duration;

use super::changeset::ChangeSet;
use super::options::QueryOptions;
use crate::cache::{Key, SkipMode};
use crate::config::DriverConfig;

/// What the driver does with one cacheable query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Resolved {
  /// Storage key: the (prefixed) hashed query key.
  pub key: Key,
  pub evict: bool,
  pub ttl: Option<Duration>,
  pub skip_not_found: bool,
  pub skip_mode: SkipMode,
}

fn non_zero(d: Duration) -> Option<Duration> {
  (!d.is_zero()).then_some(d)
}

/// Resolve `opts` for the query hashed to `hashed`.
///
/// - ref entity key with a change marker `t`: stamp the ref; evict if the
///   ref was new or older than `t`
/// - ref entity key without a marker: a leftover ref is consumed and evicts
/// - plain entity key: a marker is consumed and evicts
/// - no entity key: no invalidation
///
/// The ref branch can lose a marker that GC swept before any ref query read
/// it; the stale entry then lives until its TTL.
pub(crate) fn resolve(
  opts: QueryOptions,
  hashed: Key,
  changes: &ChangeSet,
  config: &DriverConfig,
) -> Resolved {
  let mut evict = opts.evict;

  let default_ttl = match (&opts.entry_key, opts.is_ref) {
    (Some(entity), true) => {
      if let Some(changed_at) = changes.load(entity) {
        evict |= match changes.load_or_store_ref(&hashed) {
          Some(evaluated_at) => changed_at > evaluated_at,
          None => true,
        };
      } else if changes.take_ref(&hashed).is_some() {
        evict = true;
      }
      config.key_query_ttl
    }
    (Some(entity), false) => {
      if changes.take(entity).is_some() {
        evict = true;
      }
      config.key_query_ttl
    }
    (None, _) => config.hash_query_ttl,
  };

  Resolved {
    key: hashed.with_prefix(&config.cache_prefix),
    evict,
    ttl: opts.ttl.or_else(|| non_zero(default_ttl)),
    skip_not_found: opts.skip_not_found,
    skip_mode: opts.skip_mode,
  }
}
