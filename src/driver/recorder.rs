use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::cache::Entry;
use crate::db::rows::assign_row;
use crate::db::{ColumnScanner, ColumnType, Destination, Value};
use crate::error::DriverError;

/// Called once with the captured result set after a clean, complete read.
pub type OnComplete = Box<dyn FnOnce(Entry) -> BoxFuture<'static, ()> + Send>;

/// Forwards a live cursor while keeping a copy of every scanned row.
///
/// The capture is handed to the completion callback on close, and only if
/// the cursor was drained, every row was scanned successfully and the
/// backend reported no error.
pub struct Recorder {
  inner: Box<dyn ColumnScanner>,
  columns: Option<Vec<String>>,
  rows: Vec<Vec<Value>>,
  /// `next` returned true and the row has not been captured yet
  positioned: bool,
  drained: bool,
  incomplete: bool,
  on_complete: Option<OnComplete>,
}

impl Recorder {
  pub fn new(inner: Box<dyn ColumnScanner>, on_complete: OnComplete) -> Self {
    Self {
      inner,
      columns: None,
      rows: Vec::new(),
      positioned: false,
      drained: false,
      incomplete: false,
      on_complete: Some(on_complete),
    }
  }

  fn capture(&mut self, dest: &mut [&mut dyn Destination]) -> Result<(), DriverError> {
    let mut raw = vec![Value::Null; dest.len()];
    {
      let mut slots: Vec<&mut dyn Destination> =
        raw.iter_mut().map(|v| v as &mut dyn Destination).collect();
      self.inner.scan(&mut slots)?;
    }
    assign_row(&raw, dest)?;
    self.rows.push(raw);
    Ok(())
  }
}

#[async_trait]
impl ColumnScanner for Recorder {
  fn columns(&self) -> Result<Vec<String>, DriverError> {
    match &self.columns {
      Some(columns) => Ok(columns.clone()),
      None => self.inner.columns(),
    }
  }

  fn column_types(&self) -> Result<Vec<ColumnType>, DriverError> {
    self.inner.column_types()
  }

  fn next(&mut self) -> bool {
    if self.positioned {
      // advancing past a row that was never scanned
      self.incomplete = true;
    }
    if self.columns.is_none() {
      self.columns = self.inner.columns().ok();
    }
    let has_next = self.inner.next();
    self.drained = !has_next;
    self.positioned = has_next;
    has_next
  }

  fn scan(&mut self, dest: &mut [&mut dyn Destination]) -> Result<(), DriverError> {
    if !self.positioned {
      // re-scan of an already captured row, or no current row
      return self.inner.scan(dest);
    }
    match self.capture(dest) {
      Ok(()) => {
        self.positioned = false;
        Ok(())
      }
      Err(e) => {
        self.incomplete = true;
        Err(e)
      }
    }
  }

  fn err(&self) -> Option<&DriverError> {
    self.inner.err()
  }

  async fn close(&mut self) -> Result<(), DriverError> {
    if self.columns.is_none() {
      self.columns = self.inner.columns().ok();
    }
    self.inner.close().await?;

    let Some(on_complete) = self.on_complete.take() else {
      return Ok(());
    };
    if self.incomplete || !self.drained || self.inner.err().is_some() {
      tracing::debug!("result not fully read, not cached");
      return Ok(());
    }
    let Some(columns) = self.columns.take() else {
      return Ok(());
    };

    let entry = Entry::new(columns, std::mem::take(&mut self.rows));
    if !entry.is_valid() {
      tracing::warn!("captured rows do not match the column count, not cached");
      return Ok(());
    }
    on_complete(entry).await;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::{MemoryRows, Rows};
  use parking_lot::Mutex;
  use std::sync::Arc;

  fn source() -> Box<dyn ColumnScanner> {
    Box::new(MemoryRows::new(
      vec!["id".into(), "data".into()],
      vec![
        vec![Value::Integer(1), Value::Blob(vec![1, 2])],
        vec![Value::Integer(2), Value::Blob(vec![3])],
      ],
    ))
  }

  fn recorder(sink: Arc<Mutex<Option<Entry>>>) -> Rows {
    let on_complete: OnComplete = Box::new(move |entry: Entry| -> BoxFuture<'static, ()> {
      Box::pin(async move {
        *sink.lock() = Some(entry);
      })
    });
    Rows::new(Recorder::new(source(), on_complete))
  }

  #[tokio::test]
  async fn test_records_full_scan() {
    let sink = Arc::new(Mutex::new(None));
    let mut rows = recorder(sink.clone());
    let mut id = 0i64;
    let mut data: Vec<u8> = Vec::new();
    while rows.next() {
      rows.scan(&mut [&mut id, &mut data]).unwrap();
    }
    rows.close().await.unwrap();

    let entry = sink.lock().take().unwrap();
    assert_eq!(entry.columns, vec!["id", "data"]);
    assert_eq!(entry.rows.len(), 2);
    assert_eq!(entry.rows[1], vec![Value::Integer(2), Value::Blob(vec![3])]);
  }

  #[tokio::test]
  async fn test_partial_read_not_recorded() {
    let sink = Arc::new(Mutex::new(None));
    let mut rows = recorder(sink.clone());
    let mut id = 0i64;
    let mut data: Vec<u8> = Vec::new();
    assert!(rows.next());
    rows.scan(&mut [&mut id, &mut data]).unwrap();
    rows.close().await.unwrap();
    assert!(sink.lock().is_none());
  }

  #[tokio::test]
  async fn test_skipped_row_not_recorded() {
    let sink = Arc::new(Mutex::new(None));
    let mut rows = recorder(sink.clone());
    let mut id = 0i64;
    let mut data: Vec<u8> = Vec::new();
    assert!(rows.next());
    assert!(rows.next());
    rows.scan(&mut [&mut id, &mut data]).unwrap();
    assert!(!rows.next());
    rows.close().await.unwrap();
    assert!(sink.lock().is_none());
  }

  #[tokio::test]
  async fn test_conversion_error_not_recorded() {
    let sink = Arc::new(Mutex::new(None));
    let mut rows = recorder(sink.clone());
    let mut id = 0i64;
    let mut wrong = 0i64;
    assert!(rows.next());
    assert!(rows.scan(&mut [&mut id, &mut wrong]).is_err());
    while rows.next() {}
    rows.close().await.unwrap();
    assert!(sink.lock().is_none());
  }
}
