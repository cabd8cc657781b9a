//! Query key derivation

use sha2::{Digest, Sha256};

use crate::cache::Key;
use crate::db::Value;
use crate::error::KeyError;

/// Maps a statement and its arguments to a storage key.
///
/// Must be deterministic and order sensitive, and stable across processes
/// when the cache is shared. A failure makes the query run uncached.
pub trait KeyDeriver: Send + Sync {
  fn derive(&self, query: &str, args: &[Value]) -> Result<Key, KeyError>;
}

impl<F> KeyDeriver for F
where
  F: Fn(&str, &[Value]) -> Result<Key, KeyError> + Send + Sync,
{
  fn derive(&self, query: &str, args: &[Value]) -> Result<Key, KeyError> {
    self(query, args)
  }
}

/// SHA-256 over a length-prefixed, type-tagged encoding, as lowercase hex.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultKeyDeriver;

impl KeyDeriver for DefaultKeyDeriver {
  fn derive(&self, query: &str, args: &[Value]) -> Result<Key, KeyError> {
    let mut hasher = Sha256::new();
    write_bytes(&mut hasher, query.as_bytes());
    hasher.update((args.len() as u64).to_le_bytes());
    for arg in args {
      write_value(&mut hasher, arg);
    }
    Ok(Key::new(format!("{:x}", hasher.finalize())))
  }
}

fn write_bytes(hasher: &mut Sha256, bytes: &[u8]) {
  hasher.update((bytes.len() as u64).to_le_bytes());
  hasher.update(bytes);
}

fn write_value(hasher: &mut Sha256, value: &Value) {
  match value {
    Value::Null => hasher.update([0u8]),
    Value::Bool(b) => hasher.update([1u8, u8::from(*b)]),
    Value::Integer(i) => {
      hasher.update([2u8]);
      hasher.update(i.to_le_bytes());
    }
    Value::Real(f) => {
      // every NaN payload hashes alike
      let bits = if f.is_nan() { f64::NAN.to_bits() } else { f.to_bits() };
      hasher.update([3u8]);
      hasher.update(bits.to_le_bytes());
    }
    Value::Text(s) => {
      hasher.update([4u8]);
      write_bytes(hasher, s.as_bytes());
    }
    Value::Blob(b) => {
      hasher.update([5u8]);
      write_bytes(hasher, b);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::values;

  fn key(query: &str, args: &[Value]) -> String {
    DefaultKeyDeriver.derive(query, args).unwrap().into_string()
  }

  #[test]
  fn test_deterministic() {
    let args = values![20.1, 30.2, 40.5];
    assert_eq!(key("SELECT age FROM users", &args), key("SELECT age FROM users", &args));
    assert_eq!(key("SELECT 1", &[]).len(), 64);
  }

  #[test]
  fn test_order_and_type_sensitive() {
    assert_ne!(key("q", &values![1, 2]), key("q", &values![2, 1]));
    assert_ne!(key("q", &values![1]), key("q", &values!["1"]));
    assert_ne!(key("q", &values![true]), key("q", &values![1]));
    assert_ne!(key("q", &values!["ab", "c"]), key("q", &values!["a", "bc"]));
    assert_ne!(key("SELECT 1", &[]), key("SELECT 2", &[]));
  }

  #[test]
  fn test_args_not_mutated() {
    let args = values![1, "x"];
    let before = args.clone();
    key("q", &args);
    assert_eq!(args, before);
  }

  #[test]
  fn test_closure_deriver() {
    let deriver = |q: &str, _: &[Value]| -> Result<Key, KeyError> {
      if q.contains("nocache") {
        Err(KeyError("unhashable".into()))
      } else {
        Ok(Key::new(q))
      }
    };
    assert!(deriver.derive("SELECT nocache", &[]).is_err());
    assert_eq!(deriver.derive("SELECT 1", &[]).unwrap().as_str(), "SELECT 1");
  }
}
