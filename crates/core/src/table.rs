//! Table: owned associative map of Value -> Value
//!
//! Any Value can be a key (see the equality and hashing rules in
//! [`crate::value`]). A lookup of an absent key fails with `KeyNotFound`,
//! which is distinct from finding a key whose value is Nil.

use crate::error::{Error, ErrorKind, Result};
use crate::value::Value;
use crate::vector::Vector;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    map: HashMap<Value, Value>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite
    pub fn set(&mut self, key: impl Into<Value>, value: impl Into<Value>) {
        self.map.insert(key.into(), value.into());
    }

    pub fn has_key(&self, key: &Value) -> bool {
        self.map.contains_key(key)
    }

    #[track_caller]
    pub fn at(&self, key: &Value) -> Result<&Value> {
        self.map.get(key).ok_or_else(|| key_not_found(key))
    }

    #[track_caller]
    pub fn at_mut(&mut self, key: &Value) -> Result<&mut Value> {
        match self.map.get_mut(key) {
            Some(v) => Ok(v),
            None => Err(key_not_found(key)),
        }
    }

    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        self.map.remove(key)
    }

    /// Fresh vector of keys, in iteration order
    pub fn keys(&self) -> Vector {
        self.map.keys().cloned().collect()
    }

    /// Fresh vector of values, in the same order as [`Table::keys`]
    pub fn values(&self) -> Vector {
        self.map.values().cloned().collect()
    }

    pub fn foreach(&self, mut f: impl FnMut(&Value, &Value)) {
        for (k, v) in &self.map {
            f(k, v);
        }
    }

    pub fn iter(&self) -> std::collections::hash_map::Iter<'_, Value, Value> {
        self.map.iter()
    }

    pub fn size(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[track_caller]
fn key_not_found(key: &Value) -> Error {
    Error::new(ErrorKind::KeyNotFound {
        key: key.to_string(),
    })
}

// Order-independent: entry hashes are combined with a commutative sum so two
// equal tables hash alike whatever their internal bucket order.
impl Hash for Table {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let mut combined: u64 = 0;
        for (k, v) in &self.map {
            let mut entry = DefaultHasher::new();
            k.hash(&mut entry);
            v.hash(&mut entry);
            combined = combined.wrapping_add(entry.finish());
        }
        self.map.len().hash(state);
        combined.hash(state);
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (k, v)) in self.map.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "[{}] = {}", k, v)?;
        }
        f.write_str("}")
    }
}

impl<K: Into<Value>, V: Into<Value>> FromIterator<(K, V)> for Table {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Table {
            map: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl IntoIterator for Table {
    type Item = (Value, Value);
    type IntoIter = std::collections::hash_map::IntoIter<Value, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.map.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::OpaqueId;

    fn hash_of(t: &Table) -> u64 {
        let mut h = DefaultHasher::new();
        t.hash(&mut h);
        h.finish()
    }

    #[test]
    fn test_set_overwrites() {
        let mut t = Table::new();
        t.set("score", 10i64);
        t.set("score", 100i64);
        assert_eq!(t.size(), 1);
        assert_eq!(t.at(&Value::string("score")).unwrap(), &Value::int(100));
    }

    #[test]
    fn test_missing_key_vs_nil_value() {
        let mut t = Table::new();
        t.set("present", Value::nil());

        let found = t.at(&Value::string("present")).unwrap();
        assert!(found.is_nil());

        let err = t.at(&Value::string("absent")).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::KeyNotFound { .. }));
        assert!(t.has_key(&Value::string("present")));
        assert!(!t.has_key(&Value::string("absent")));
    }

    #[test]
    fn test_keys_of_every_kind() {
        let mut t = Table::new();
        t.set(1i64, "int");
        t.set(1.5, "float");
        t.set(true, "bool");
        t.set("s", "string");
        t.set(vec![1u8, 2], "binary");
        t.set(OpaqueId(42), "id");
        assert_eq!(t.size(), 6);

        assert_eq!(
            t.at(&Value::binary(vec![1u8, 2])).unwrap(),
            &Value::string("binary")
        );
        assert_eq!(t.at(&Value::opaque_id(42)).unwrap(), &Value::string("id"));
        // Int(1) and Float(1.0) are different keys
        assert!(!t.has_key(&Value::float(1.0)));
    }

    #[test]
    fn test_keys_and_values_align() {
        let t: Table = [("a", 1i64), ("b", 2), ("c", 3)].into_iter().collect();
        let keys = t.keys();
        let values = t.values();
        assert_eq!(keys.size(), 3);
        for i in 0..keys.size() {
            let k = keys.at(i).unwrap();
            assert_eq!(t.at(k).unwrap(), values.at(i).unwrap());
        }
    }

    #[test]
    fn test_remove() {
        let mut t: Table = [("a", 1i64)].into_iter().collect();
        assert_eq!(t.remove(&Value::string("a")), Some(Value::int(1)));
        assert!(t.remove(&Value::string("a")).is_none());
        assert!(t.is_empty());
    }

    #[test]
    fn test_foreach_visits_every_entry() {
        let t: Table = [(1i64, 10i64), (2, 20), (3, 30)].into_iter().collect();
        let mut sum = 0;
        t.foreach(|k, v| sum += k.as_int().unwrap() * v.as_int().unwrap());
        assert_eq!(sum, 10 + 40 + 90);
    }

    #[test]
    fn test_equal_tables_hash_alike() {
        let mut a = Table::new();
        let mut b = Table::new();
        for i in 0..32i64 {
            a.set(i, i * 2);
        }
        for i in (0..32i64).rev() {
            b.set(i, i * 2);
        }
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn test_nested_table_as_key() {
        let inner: Table = [("x", 1i64)].into_iter().collect();
        let mut t = Table::new();
        t.set(Value::table(inner.clone()), "nested");
        assert_eq!(t.at(&Value::table(inner)).unwrap(), &Value::string("nested"));
    }
}
