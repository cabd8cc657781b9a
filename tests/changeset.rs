mod common;

use common::{fetch, MockDriver};
use rowcache::{CachingDriver, ChangeSet, Driver, DriverConfig, Key, QueryContext, Value};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_gc_sweeps_both_maps() {
  let set = Arc::new(ChangeSet::new(Duration::from_millis(200)));
  let handle = set.spawn_gc();

  set.store([Key::new("gc:1"), Key::new("gc:2")]);
  set.load_or_store_ref(&Key::new("ref:1"));
  set.load_or_store_ref(&Key::new("ref:2"));
  assert_eq!(set.changes_len(), 2);
  assert_eq!(set.refs_len(), 2);

  tokio::time::sleep(Duration::from_millis(700)).await;
  assert_eq!(set.changes_len(), 0);
  assert_eq!(set.refs_len(), 0);

  handle.stop().await;
}

#[tokio::test]
async fn test_gc_keeps_fresh_markers() {
  let set = Arc::new(ChangeSet::new(Duration::from_secs(60)));
  set.store([Key::entity("User", 1)]);
  set.load_or_store_ref(&Key::new("q"));

  assert_eq!(set.gc(), (0, 0));
  assert!(set.load(&Key::entity("User", 1)).is_some());
  assert!(set.load_ref(&Key::new("q")).is_some());
}

#[tokio::test]
async fn test_gc_stops_when_change_set_is_dropped() {
  let set = Arc::new(ChangeSet::new(Duration::from_millis(50)));
  let handle = set.spawn_gc();
  drop(set);

  tokio::time::sleep(Duration::from_millis(200)).await;
  assert!(handle.is_finished());
}

#[tokio::test]
async fn test_driver_gc_uses_configured_interval() {
  let mock = MockDriver::ages();
  let backend: Arc<dyn Driver> = mock.clone();
  let driver = CachingDriver::new(
    backend,
    DriverConfig::new("gc").with_gc_interval(Duration::from_millis(200)),
  );
  driver.start_gc();

  driver.change_set().store([Key::entity("User", 1), Key::entity("User", 2)]);
  tokio::time::sleep(Duration::from_millis(700)).await;
  assert_eq!(driver.change_set().changes_len(), 0);

  driver.stop_gc().await;
}

// A marker swept before any ref query evaluated it is lost: ref queries
// then keep serving the entry cached before the change until its TTL ends.
#[tokio::test]
async fn test_swept_marker_no_longer_evicts_ref_queries() {
  let mock = MockDriver::new(&["age"], vec![vec![Value::Real(20.1)]]);
  let backend: Arc<dyn Driver> = mock.clone();
  let driver = CachingDriver::builder(backend)
    .change_set(Arc::new(ChangeSet::new(Duration::from_millis(100))))
    .build();
  let query = "SELECT age FROM users where id=?";
  let args = [Value::from(1i64)];

  fetch(&driver, &mut QueryContext::new().with_ref_entry_key("User", 1), query, &args).await;

  driver.change_set().store([Key::entity("User", 1)]);
  tokio::time::sleep(Duration::from_millis(200)).await;
  driver.change_set().gc();

  fetch(&driver, &mut QueryContext::new().with_ref_entry_key("User", 1), query, &args).await;
  assert_eq!(mock.queries(), 1);
  assert_eq!(driver.stats().hits, 1);
}
