mod common;

use common::{fetch, MockDriver};
use rowcache::{
  CachingDriver, ChangeNotifier, ChangeSet, Driver, DriverConfig, DriverRegistry, Key, Mutation,
  MutationOp, QueryContext,
};
use std::sync::Arc;
use std::time::Duration;

fn backend(mock: &Arc<MockDriver>) -> Arc<dyn Driver> {
  mock.clone()
}

#[tokio::test]
async fn test_register_and_lookup() {
  let registry = DriverRegistry::new();
  let mock = MockDriver::ages();

  registry.register(CachingDriver::builder(backend(&mock)));
  registry.register(CachingDriver::builder(backend(&mock)).name("reports"));

  assert_eq!(registry.names(), vec!["default", "reports"]);
  assert_eq!(registry.len(), 2);
  assert!(registry.get("reports").is_some());
  assert!(registry.get("missing").is_none());

  assert!(registry.remove("reports").is_some());
  assert!(registry.remove("reports").is_none());
  assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_reregister_keeps_slot_stats_and_changes() {
  let registry = DriverRegistry::new();
  let first = MockDriver::ages();
  let driver = registry.register(CachingDriver::builder(backend(&first)));

  fetch(driver.as_ref(), &mut QueryContext::new(), "SELECT age FROM users", &[]).await;
  driver.change_set().store([Key::entity("User", 7)]);

  let second = MockDriver::ages();
  let again = registry.register(
    CachingDriver::builder(backend(&second))
      .config(DriverConfig::default().with_cache_prefix("v2:")),
  );

  assert!(Arc::ptr_eq(&driver, &again));
  assert_eq!(again.config().cache_prefix, "v2:");
  assert_eq!(again.stats().gets, 1);
  assert!(again.change_set().load(&Key::entity("User", 7)).is_some());

  // new store and prefix: the query goes to the new backend
  fetch(again.as_ref(), &mut QueryContext::new(), "SELECT age FROM users", &[]).await;
  assert_eq!(first.queries(), 1);
  assert_eq!(second.queries(), 1);
}

#[tokio::test]
async fn test_reregister_with_change_set_replaces_it() {
  let registry = DriverRegistry::new();
  let mock = MockDriver::ages();
  let driver = registry.register(CachingDriver::builder(backend(&mock)));
  driver.start_gc();
  driver.change_set().store([Key::entity("User", 1)]);

  let fresh = Arc::new(ChangeSet::new(Duration::from_millis(100)));
  registry.register(CachingDriver::builder(backend(&mock)).change_set(fresh.clone()));

  assert!(Arc::ptr_eq(&driver.change_set(), &fresh));
  assert_eq!(driver.change_set().changes_len(), 0);

  // the running sweep moved to the new change set
  fresh.store([Key::entity("User", 2)]);
  tokio::time::sleep(Duration::from_millis(400)).await;
  assert_eq!(fresh.changes_len(), 0);

  driver.stop_gc().await;
}

#[tokio::test]
async fn test_notifier_records_updates_and_deletes() {
  let registry = Arc::new(DriverRegistry::new());
  let mock = MockDriver::ages();
  let driver = registry.register(CachingDriver::builder(backend(&mock)));
  let notifier = ChangeNotifier::new(registry.clone());

  let stored = notifier.notify(&Mutation::new("User", MutationOp::UpdateOne).with_id(1));
  assert_eq!(stored, 1);
  let stored = notifier.notify(&Mutation::new("Pet", MutationOp::Delete).with_ids([3, 4]));
  assert_eq!(stored, 2);

  let changes = driver.change_set();
  assert!(changes.load(&Key::new("User:1")).is_some());
  assert!(changes.load(&Key::new("Pet:3")).is_some());
  assert!(changes.load(&Key::new("Pet:4")).is_some());
}

#[tokio::test]
async fn test_notifier_ignores_creates() {
  let registry = Arc::new(DriverRegistry::new());
  let mock = MockDriver::ages();
  let driver = registry.register(CachingDriver::builder(backend(&mock)));
  let notifier = ChangeNotifier::new(registry.clone());

  let stored = notifier.notify(&Mutation::new("User", MutationOp::Create).with_id(9));
  assert_eq!(stored, 0);
  assert_eq!(driver.change_set().changes_len(), 0);
}

#[tokio::test]
async fn test_notifier_resolves_driver_lazily() {
  let registry = Arc::new(DriverRegistry::new());
  let notifier = ChangeNotifier::new(registry.clone()).with_driver_name("late");

  assert_eq!(
    notifier.notify(&Mutation::new("User", MutationOp::Update).with_id(1)),
    0
  );

  let mock = MockDriver::ages();
  let driver = registry.register(CachingDriver::builder(backend(&mock)).name("late"));
  assert_eq!(
    notifier.notify(&Mutation::new("User", MutationOp::Update).with_id(1)),
    1
  );
  assert_eq!(driver.change_set().changes_len(), 1);
}

#[tokio::test]
async fn test_wrap_records_only_successful_mutations() {
  let registry = Arc::new(DriverRegistry::new());
  let mock = MockDriver::ages();
  let driver = registry.register(CachingDriver::builder(backend(&mock)));
  let notifier = ChangeNotifier::new(registry.clone());

  let failed: Result<(), &str> = notifier
    .wrap(
      Mutation::new("User", MutationOp::DeleteOne).with_id(1),
      async { Err("constraint failed") },
    )
    .await;
  assert!(failed.is_err());
  assert_eq!(driver.change_set().changes_len(), 0);

  let affected = notifier
    .wrap(
      Mutation::new("User", MutationOp::UpdateOne).with_id(1),
      async { Ok::<_, &str>(1u64) },
    )
    .await
    .unwrap();
  assert_eq!(affected, 1);
  assert!(driver.change_set().load(&Key::entity("User", 1)).is_some());
}

#[tokio::test]
async fn test_notified_change_refreshes_cached_query() {
  let registry = Arc::new(DriverRegistry::new());
  let mock = MockDriver::ages();
  let driver = registry.register(CachingDriver::builder(backend(&mock)));
  let notifier = ChangeNotifier::new(registry.clone());
  let query = "SELECT * FROM users where id=?";
  let args = [rowcache::Value::from(1i64)];

  fetch(driver.as_ref(), &mut QueryContext::new().with_entry_key("User", 1), query, &args).await;
  notifier.notify(&Mutation::new("User", MutationOp::UpdateOne).with_id(1));
  fetch(driver.as_ref(), &mut QueryContext::new().with_entry_key("User", 1), query, &args).await;

  assert_eq!(mock.queries(), 2);
  assert_eq!(driver.stats().hits, 0);
}

#[tokio::test]
async fn test_reregister_applies_new_gc_interval() {
  let registry = DriverRegistry::new();
  let mock = MockDriver::ages();
  let driver = registry.register(CachingDriver::builder(backend(&mock)));
  driver.start_gc();
  let changes = driver.change_set();
  changes.store([Key::entity("User", 1)]);

  registry.register(
    CachingDriver::builder(backend(&mock))
      .config(DriverConfig::default().with_gc_interval(Duration::from_millis(100))),
  );

  // same change set, markers kept, new interval in effect
  assert!(Arc::ptr_eq(&driver.change_set(), &changes));
  assert_eq!(changes.gc_interval(), Duration::from_millis(100));
  assert_eq!(changes.changes_len(), 1);

  tokio::time::sleep(Duration::from_millis(400)).await;
  assert_eq!(changes.changes_len(), 0);

  driver.stop_gc().await;
}
