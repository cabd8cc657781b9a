use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::{CachingDriver, CachingDriverBuilder};

/// Named caching drivers of one process.
///
/// Registering an existing name reconfigures that driver in place, so
/// handles obtained earlier (and notifiers bound to the name) stay valid.
#[derive(Default)]
pub struct DriverRegistry {
  drivers: RwLock<HashMap<String, Arc<CachingDriver>>>,
}

impl DriverRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register(&self, builder: CachingDriverBuilder) -> Arc<CachingDriver> {
    let name = builder.driver_name().to_string();
    let mut drivers = self.drivers.write();
    if let Some(existing) = drivers.get(&name) {
      existing.reconfigure(builder);
      return existing.clone();
    }

    let driver = Arc::new(builder.build());
    drivers.insert(name.clone(), driver.clone());
    tracing::info!(name = %name, "Caching driver registered");
    driver
  }

  pub fn get(&self, name: &str) -> Option<Arc<CachingDriver>> {
    self.drivers.read().get(name).cloned()
  }

  pub fn names(&self) -> Vec<String> {
    let mut names: Vec<String> = self.drivers.read().keys().cloned().collect();
    names.sort();
    names
  }

  /// Remove a slot. The driver keeps working for holders of its handle.
  pub fn remove(&self, name: &str) -> Option<Arc<CachingDriver>> {
    let removed = self.drivers.write().remove(name);
    if removed.is_some() {
      tracing::info!(name, "Caching driver removed");
    }
    removed
  }

  pub fn len(&self) -> usize {
    self.drivers.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.drivers.read().is_empty()
  }
}
