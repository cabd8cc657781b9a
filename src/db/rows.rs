//! Row cursors returned by [`Driver::query`](super::Driver::query).

use async_trait::async_trait;
use std::collections::VecDeque;

use super::value::{Destination, Value};
use crate::error::DriverError;

/// Storage class of a result column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
  Null,
  Bool,
  Integer,
  Real,
  Text,
  Blob,
}

impl ColumnType {
  pub fn of(value: &Value) -> Self {
    match value {
      Value::Null => ColumnType::Null,
      Value::Bool(_) => ColumnType::Bool,
      Value::Integer(_) => ColumnType::Integer,
      Value::Real(_) => ColumnType::Real,
      Value::Text(_) => ColumnType::Text,
      Value::Blob(_) => ColumnType::Blob,
    }
  }

  pub fn database_type_name(&self) -> &'static str {
    match self {
      ColumnType::Null => "NULL",
      ColumnType::Bool => "BOOLEAN",
      ColumnType::Integer => "INTEGER",
      ColumnType::Real => "REAL",
      ColumnType::Text => "TEXT",
      ColumnType::Blob => "BLOB",
    }
  }

  /// First non-NULL value of each column decides its type.
  pub fn infer<'a>(width: usize, rows: impl IntoIterator<Item = &'a Vec<Value>>) -> Vec<Self> {
    let mut types = vec![ColumnType::Null; width];
    for row in rows {
      for (slot, value) in types.iter_mut().zip(row) {
        if *slot == ColumnType::Null {
          *slot = ColumnType::of(value);
        }
      }
      if types.iter().all(|t| *t != ColumnType::Null) {
        break;
      }
    }
    types
  }
}

/// A forward-only result cursor.
///
/// `next` advances to the following row and reports whether one exists;
/// `scan` reads the current row into the destinations.
#[async_trait]
pub trait ColumnScanner: Send {
  fn columns(&self) -> Result<Vec<String>, DriverError>;

  fn column_types(&self) -> Result<Vec<ColumnType>, DriverError>;

  fn next(&mut self) -> bool;

  fn scan(&mut self, dest: &mut [&mut dyn Destination]) -> Result<(), DriverError>;

  /// Error hit while iterating, if any.
  fn err(&self) -> Option<&DriverError>;

  async fn close(&mut self) -> Result<(), DriverError>;
}

/// Owned cursor handle handed to callers.
///
/// Callers should drain and [`close`](Rows::close) it; a cursor dropped
/// without closing is released but never written to the cache.
pub struct Rows {
  inner: Box<dyn ColumnScanner>,
  closed: bool,
}

impl Rows {
  pub fn new(inner: impl ColumnScanner + 'static) -> Self {
    Self::from_boxed(Box::new(inner))
  }

  pub fn from_boxed(inner: Box<dyn ColumnScanner>) -> Self {
    Self {
      inner,
      closed: false,
    }
  }

  /// Unwrap the cursor, e.g. to wrap it in another scanner.
  pub fn into_inner(self) -> Box<dyn ColumnScanner> {
    self.inner
  }

  pub fn columns(&self) -> Result<Vec<String>, DriverError> {
    self.inner.columns()
  }

  pub fn column_types(&self) -> Result<Vec<ColumnType>, DriverError> {
    self.inner.column_types()
  }

  pub fn next(&mut self) -> bool {
    !self.closed && self.inner.next()
  }

  pub fn scan(&mut self, dest: &mut [&mut dyn Destination]) -> Result<(), DriverError> {
    if self.closed {
      return Err(DriverError::Closed);
    }
    self.inner.scan(dest)
  }

  pub fn err(&self) -> Option<&DriverError> {
    self.inner.err()
  }

  pub async fn close(&mut self) -> Result<(), DriverError> {
    if self.closed {
      return Ok(());
    }
    self.closed = true;
    self.inner.close().await
  }

  /// Drain every remaining row as raw values, then close the cursor.
  pub async fn collect_values(mut self) -> Result<Vec<Vec<Value>>, DriverError> {
    let width = self.columns()?.len();
    let mut out = Vec::new();
    while self.next() {
      let mut row = vec![Value::Null; width];
      {
        let mut dest: Vec<&mut dyn Destination> =
          row.iter_mut().map(|v| v as &mut dyn Destination).collect();
        self.scan(&mut dest)?;
      }
      out.push(row);
    }
    self.close().await?;
    Ok(out)
  }
}

impl std::fmt::Debug for Rows {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Rows").field("closed", &self.closed).finish()
  }
}

/// Assign one row into destinations through the checked conversion path.
pub(crate) fn assign_row(row: &[Value], dest: &mut [&mut dyn Destination]) -> Result<(), DriverError> {
  if dest.len() != row.len() {
    return Err(DriverError::ColumnCount {
      expected: row.len(),
      got: dest.len(),
    });
  }
  for (column, (slot, value)) in dest.iter_mut().zip(row).enumerate() {
    slot
      .assign(value)
      .map_err(|source| DriverError::Convert { column, source })?;
  }
  Ok(())
}

/// Fully materialized cursor.
#[derive(Debug, Clone)]
pub struct MemoryRows {
  columns: Vec<String>,
  types: Vec<ColumnType>,
  pending: VecDeque<Vec<Value>>,
  current: Option<Vec<Value>>,
}

impl MemoryRows {
  pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
    let types = ColumnType::infer(columns.len(), &rows);
    Self::with_types(columns, types, rows)
  }

  pub fn with_types(columns: Vec<String>, types: Vec<ColumnType>, rows: Vec<Vec<Value>>) -> Self {
    Self {
      columns,
      types,
      pending: rows.into(),
      current: None,
    }
  }

  pub fn remaining(&self) -> usize {
    self.pending.len()
  }
}

#[async_trait]
impl ColumnScanner for MemoryRows {
  fn columns(&self) -> Result<Vec<String>, DriverError> {
    Ok(self.columns.clone())
  }

  fn column_types(&self) -> Result<Vec<ColumnType>, DriverError> {
    Ok(self.types.clone())
  }

  fn next(&mut self) -> bool {
    self.current = self.pending.pop_front();
    self.current.is_some()
  }

  fn scan(&mut self, dest: &mut [&mut dyn Destination]) -> Result<(), DriverError> {
    let row = self.current.as_ref().ok_or(DriverError::NoRows)?;
    assign_row(row, dest)
  }

  fn err(&self) -> Option<&DriverError> {
    None
  }

  async fn close(&mut self) -> Result<(), DriverError> {
    self.pending.clear();
    self.current = None;
    Ok(())
  }
}
