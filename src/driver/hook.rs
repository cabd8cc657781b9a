//! Mutation notifications feeding the change set.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use super::registry::DriverRegistry;
use crate::cache::Key;
use crate::config::DEFAULT_DRIVER_NAME;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOp {
  Create,
  UpdateOne,
  Update,
  DeleteOne,
  Delete,
}

impl MutationOp {
  /// Creates never invalidate: no cached entity can describe a new row.
  pub fn invalidates(self) -> bool {
    self != MutationOp::Create
  }
}

/// A write against one entity type, with the ids it touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
  pub entity_type: String,
  pub op: MutationOp,
  pub ids: Vec<String>,
}

impl Mutation {
  pub fn new(entity_type: impl Into<String>, op: MutationOp) -> Self {
    Self {
      entity_type: entity_type.into(),
      op,
      ids: Vec::new(),
    }
  }

  pub fn with_id(mut self, id: impl fmt::Display) -> Self {
    self.ids.push(id.to_string());
    self
  }

  pub fn with_ids<I, T>(mut self, ids: I) -> Self
  where
    I: IntoIterator<Item = T>,
    T: fmt::Display,
  {
    self.ids.extend(ids.into_iter().map(|id| id.to_string()));
    self
  }

  pub fn keys(&self) -> Vec<Key> {
    self
      .ids
      .iter()
      .map(|id| Key::entity(&self.entity_type, id))
      .collect()
  }
}

/// Records successful mutations into a named driver's change set.
///
/// The driver is looked up on every notification, so a notifier may be
/// created before the driver is registered; until then it does nothing.
#[derive(Clone)]
pub struct ChangeNotifier {
  registry: Arc<DriverRegistry>,
  driver_name: String,
}

impl ChangeNotifier {
  pub fn new(registry: Arc<DriverRegistry>) -> Self {
    Self {
      registry,
      driver_name: DEFAULT_DRIVER_NAME.to_string(),
    }
  }

  pub fn with_driver_name(mut self, name: impl Into<String>) -> Self {
    self.driver_name = name.into();
    self
  }

  /// Stamp one change marker per id. Returns how many were stored.
  pub fn notify(&self, mutation: &Mutation) -> usize {
    if !mutation.op.invalidates() || mutation.ids.is_empty() {
      return 0;
    }
    let Some(driver) = self.registry.get(&self.driver_name) else {
      tracing::debug!(driver = %self.driver_name, "no caching driver registered, change ignored");
      return 0;
    };
    let keys = mutation.keys();
    let count = keys.len();
    driver.change_set().store(keys);
    tracing::debug!(entity = %mutation.entity_type, count, "entity change recorded");
    count
  }

  /// Run the mutation and record it only if it succeeds.
  pub async fn wrap<T, E, F>(&self, mutation: Mutation, fut: F) -> Result<T, E>
  where
    F: Future<Output = Result<T, E>>,
  {
    let out = fut.await?;
    self.notify(&mutation);
    Ok(out)
  }
}
