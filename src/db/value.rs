//! Scalar values exchanged with drivers, and the conversion routine that
//! assigns them into typed destinations.
//!
//! Every conversion is checked: a value that does not fit its destination
//! (NULL into a non-`Option`, an out-of-range integer, a real with a
//! fractional part into an integer, unparsable text) fails at scan time with a
//! [`ConvertError`]. Nothing is truncated or wrapped.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConvertError;

/// A single column value or query argument.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "lowercase")]
pub enum Value {
  #[default]
  Null,
  Bool(bool),
  Integer(i64),
  Real(f64),
  Text(String),
  Blob(Vec<u8>),
}

impl Value {
  pub fn is_null(&self) -> bool {
    matches!(self, Value::Null)
  }

  /// Name of the variant, used in conversion errors.
  pub fn kind(&self) -> &'static str {
    match self {
      Value::Null => "null",
      Value::Bool(_) => "bool",
      Value::Integer(_) => "integer",
      Value::Real(_) => "real",
      Value::Text(_) => "text",
      Value::Blob(_) => "blob",
    }
  }

  /// Approximate heap + inline size in bytes, used by memory-bounded stores.
  pub fn approximate_size(&self) -> usize {
    match self {
      Value::Null => 1,
      Value::Bool(_) => 1,
      Value::Integer(_) | Value::Real(_) => 8,
      Value::Text(s) => s.len() + 8,
      Value::Blob(b) => b.len() + 8,
    }
  }

  fn display(&self) -> String {
    match self {
      Value::Null => "NULL".to_string(),
      Value::Bool(b) => b.to_string(),
      Value::Integer(i) => i.to_string(),
      Value::Real(f) => f.to_string(),
      Value::Text(s) => s.clone(),
      Value::Blob(b) => format!("<{} bytes>", b.len()),
    }
  }

  fn invalid(&self, target: &'static str) -> ConvertError {
    ConvertError::Invalid {
      from: self.kind(),
      value: self.display(),
      target,
    }
  }
}

impl std::fmt::Display for Value {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.display())
  }
}

macro_rules! value_from {
  ($($t:ty => $variant:ident as $conv:ty),* $(,)?) => {
    $(
      impl From<$t> for Value {
        fn from(v: $t) -> Self {
          Value::$variant(<$conv>::from(v))
        }
      }
    )*
  };
}

value_from! {
  bool => Bool as bool,
  i8 => Integer as i64,
  i16 => Integer as i64,
  i32 => Integer as i64,
  i64 => Integer as i64,
  u8 => Integer as i64,
  u16 => Integer as i64,
  u32 => Integer as i64,
  f32 => Real as f64,
  f64 => Real as f64,
  String => Text as String,
  &str => Text as String,
  Vec<u8> => Blob as Vec<u8>,
  &[u8] => Blob as Vec<u8>,
}

impl From<DateTime<Utc>> for Value {
  fn from(v: DateTime<Utc>) -> Self {
    Value::Text(v.to_rfc3339())
  }
}

impl<T: Into<Value>> From<Option<T>> for Value {
  fn from(v: Option<T>) -> Self {
    v.map(Into::into).unwrap_or(Value::Null)
  }
}

/// Build a `Vec<Value>` argument list.
///
/// ```
/// let args = rowcache::values![1, "alice", 20.5];
/// assert_eq!(args.len(), 3);
/// ```
#[macro_export]
macro_rules! values {
  () => { ::std::vec::Vec::<$crate::Value>::new() };
  ($($v:expr),+ $(,)?) => {
    vec![$($crate::Value::from($v)),+]
  };
}

/// Types that can be produced from a driver [`Value`].
pub trait FromValue: Sized {
  fn from_value(value: &Value) -> Result<Self, ConvertError>;
}

/// A scan destination. Implemented for every [`FromValue`] type, so
/// `rows.scan(&mut [&mut id, &mut name])` works for plain locals.
pub trait Destination: Send {
  fn assign(&mut self, value: &Value) -> Result<(), ConvertError>;
}

impl<T: FromValue + Send> Destination for T {
  fn assign(&mut self, value: &Value) -> Result<(), ConvertError> {
    *self = T::from_value(value)?;
    Ok(())
  }
}

/// Assign `value` into `dest` through the checked conversion path.
pub fn assign(dest: &mut dyn Destination, value: &Value) -> Result<(), ConvertError> {
  dest.assign(value)
}

impl FromValue for Value {
  fn from_value(value: &Value) -> Result<Self, ConvertError> {
    Ok(value.clone())
  }
}

impl<T: FromValue> FromValue for Option<T> {
  fn from_value(value: &Value) -> Result<Self, ConvertError> {
    match value {
      Value::Null => Ok(None),
      other => T::from_value(other).map(Some),
    }
  }
}

impl FromValue for i64 {
  fn from_value(value: &Value) -> Result<Self, ConvertError> {
    match value {
      Value::Null => Err(ConvertError::Null("i64")),
      Value::Bool(b) => Ok(i64::from(*b)),
      Value::Integer(i) => Ok(*i),
      Value::Real(f) => {
        if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 {
          Ok(*f as i64)
        } else {
          Err(value.invalid("i64"))
        }
      }
      Value::Text(s) => s.trim().parse().map_err(|_| value.invalid("i64")),
      Value::Blob(b) => std::str::from_utf8(b)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| value.invalid("i64")),
    }
  }
}

macro_rules! int_from_value {
  ($($t:ty),*) => {
    $(
      impl FromValue for $t {
        fn from_value(value: &Value) -> Result<Self, ConvertError> {
          if value.is_null() {
            return Err(ConvertError::Null(stringify!($t)));
          }
          let wide = i64::from_value(value)?;
          <$t>::try_from(wide).map_err(|_| ConvertError::Overflow {
            value: wide.to_string(),
            target: stringify!($t),
          })
        }
      }
    )*
  };
}

int_from_value!(i8, i16, i32, u8, u16, u32, u64, usize);

impl FromValue for f64 {
  fn from_value(value: &Value) -> Result<Self, ConvertError> {
    match value {
      Value::Null => Err(ConvertError::Null("f64")),
      Value::Integer(i) => Ok(*i as f64),
      Value::Real(f) => Ok(*f),
      Value::Text(s) => s.trim().parse().map_err(|_| value.invalid("f64")),
      Value::Bool(_) | Value::Blob(_) => Err(value.invalid("f64")),
    }
  }
}

impl FromValue for f32 {
  fn from_value(value: &Value) -> Result<Self, ConvertError> {
    if value.is_null() {
      return Err(ConvertError::Null("f32"));
    }
    let wide = f64::from_value(value)?;
    if wide.is_finite() && wide.abs() > f32::MAX as f64 {
      return Err(ConvertError::Overflow {
        value: wide.to_string(),
        target: "f32",
      });
    }
    Ok(wide as f32)
  }
}

impl FromValue for bool {
  fn from_value(value: &Value) -> Result<Self, ConvertError> {
    match value {
      Value::Null => Err(ConvertError::Null("bool")),
      Value::Bool(b) => Ok(*b),
      Value::Integer(0) => Ok(false),
      Value::Integer(1) => Ok(true),
      Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" => Ok(true),
        "0" | "f" | "false" => Ok(false),
        _ => Err(value.invalid("bool")),
      },
      _ => Err(value.invalid("bool")),
    }
  }
}

impl FromValue for String {
  fn from_value(value: &Value) -> Result<Self, ConvertError> {
    match value {
      Value::Null => Err(ConvertError::Null("String")),
      Value::Text(s) => Ok(s.clone()),
      Value::Blob(b) => String::from_utf8(b.clone()).map_err(|_| value.invalid("String")),
      Value::Bool(b) => Ok(b.to_string()),
      Value::Integer(i) => Ok(i.to_string()),
      Value::Real(f) => Ok(f.to_string()),
    }
  }
}

impl FromValue for Vec<u8> {
  fn from_value(value: &Value) -> Result<Self, ConvertError> {
    match value {
      Value::Null => Err(ConvertError::Null("Vec<u8>")),
      Value::Blob(b) => Ok(b.clone()),
      Value::Text(s) => Ok(s.as_bytes().to_vec()),
      other => Ok(other.display().into_bytes()),
    }
  }
}

impl FromValue for DateTime<Utc> {
  fn from_value(value: &Value) -> Result<Self, ConvertError> {
    match value {
      Value::Null => Err(ConvertError::Null("DateTime<Utc>")),
      Value::Text(s) => {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
          return Ok(dt.with_timezone(&Utc));
        }
        // SQLite's datetime('now') format
        chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
          .map(|naive| naive.and_utc())
          .map_err(|_| value.invalid("DateTime<Utc>"))
      }
      Value::Integer(secs) => Utc
        .timestamp_opt(*secs, 0)
        .single()
        .ok_or_else(|| value.invalid("DateTime<Utc>")),
      _ => Err(value.invalid("DateTime<Utc>")),
    }
  }
}
