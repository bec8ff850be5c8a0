//! Vector: owned, ordered sequence of Values
//!
//! Used for call arguments and results. Index access is bounds-checked and
//! reports `IndexOutOfRange` instead of panicking.

use crate::error::{Error, ErrorKind, Result};
use crate::value::Value;
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Vector {
    items: Vec<Value>,
}

impl Vector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Vector {
            items: Vec::with_capacity(capacity),
        }
    }

    pub fn append(&mut self, value: impl Into<Value>) {
        self.items.push(value.into());
    }

    /// Remove the last element; no-op on an empty vector
    pub fn pop(&mut self) -> Option<Value> {
        self.items.pop()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn size(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[track_caller]
    pub fn at(&self, index: usize) -> Result<&Value> {
        let len = self.items.len();
        self.items
            .get(index)
            .ok_or_else(|| out_of_range(index as i64, len))
    }

    #[track_caller]
    pub fn at_mut(&mut self, index: usize) -> Result<&mut Value> {
        let len = self.items.len();
        self.items
            .get_mut(index)
            .ok_or_else(|| out_of_range(index as i64, len))
    }

    /// Overwrite the element at `index`
    #[track_caller]
    pub fn set(&mut self, index: usize, value: impl Into<Value>) -> Result<()> {
        self.at_mut(index)?.set(value);
        Ok(())
    }

    pub fn foreach(&self, mut f: impl FnMut(&Value)) {
        for v in &self.items {
            f(v);
        }
    }

    pub fn foreach_mut(&mut self, mut f: impl FnMut(&mut Value)) {
        for v in &mut self.items {
            f(v);
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.items
    }

    pub fn into_inner(self) -> Vec<Value> {
        self.items
    }
}

/// Out-of-range error for a signed index (the C ABI passes `i64`)
#[track_caller]
pub fn out_of_range(index: i64, len: usize) -> Error {
    Error::new(ErrorKind::IndexOutOfRange { index, len })
}

impl From<Vec<Value>> for Vector {
    fn from(items: Vec<Value>) -> Self {
        Vector { items }
    }
}

impl<V: Into<Value>> FromIterator<V> for Vector {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Vector {
            items: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl IntoIterator for Vector {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Vector {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl fmt::Display for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, v) in self.items.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", v)?;
        }
        f.write_str("]")
    }
}
