use async_trait::async_trait;
use std::sync::Arc;

use crate::cache::Entry;
use crate::db::rows::assign_row;
use crate::db::{ColumnScanner, ColumnType, Destination};
use crate::error::DriverError;

/// Virtual cursor over a cached [`Entry`].
///
/// `next` only reports whether rows remain; `scan` assigns the next row
/// and advances.
pub struct Replayer {
  entry: Arc<Entry>,
  pos: usize,
}

impl Replayer {
  pub fn new(entry: Arc<Entry>) -> Self {
    Self { entry, pos: 0 }
  }
}

#[async_trait]
impl ColumnScanner for Replayer {
  fn columns(&self) -> Result<Vec<String>, DriverError> {
    Ok(self.entry.columns.clone())
  }

  fn column_types(&self) -> Result<Vec<ColumnType>, DriverError> {
    Err(DriverError::Unsupported("column types of cached rows"))
  }

  fn next(&mut self) -> bool {
    self.pos < self.entry.rows.len()
  }

  fn scan(&mut self, dest: &mut [&mut dyn Destination]) -> Result<(), DriverError> {
    let row = self.entry.rows.get(self.pos).ok_or(DriverError::NoRows)?;
    assign_row(row, dest)?;
    self.pos += 1;
    Ok(())
  }

  fn err(&self) -> Option<&DriverError> {
    None
  }

  async fn close(&mut self) -> Result<(), DriverError> {
    Ok(())
  }
}
