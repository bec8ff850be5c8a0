//! Value: the datum exchanged across the boundary
//!
//! A `Value` is a tagged union over the eight kinds the host and the scripting
//! runtime agree on. String and Binary payloads are owned by the Value, so
//! replacing or dropping a Value releases its payload exactly once; there is
//! no `owns` flag to keep in sync.
//!
//! # Equality and hashing
//!
//! Values of different kinds are never equal and nothing is coerced: `Int(1)`
//! and `Float(1.0)` are distinct keys. Within a kind:
//! - String/Binary compare by content, never by identity
//! - OpaqueId compares the raw 64-bit id
//! - Float compares numerically, except that every NaN equals every other NaN
//!   (so `Value` is a lawful `Eq` and can key a `Table`)
//! - Table compares entry sets
//!
//! `Hash` agrees with equality: `-0.0` and `0.0` hash alike, all NaNs hash
//! alike, and tables hash independently of iteration order.

use crate::error::{Error, Result};
use crate::table::Table;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Canonical bit pattern hashed for every NaN
const CANONICAL_NAN_BITS: u64 = 0x7ff8_0000_0000_0000;

/// Discriminant of a [`Value`], mirrored in the C ABI
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Nil = 0,
    Int = 1,
    Float = 2,
    Bool = 3,
    String = 4,
    Binary = 5,
    Table = 6,
    OpaqueId = 7,
}

impl Kind {
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Nil => "nil",
            Kind::Int => "int",
            Kind::Float => "float",
            Kind::Bool => "bool",
            Kind::String => "string",
            Kind::Binary => "binary",
            Kind::Table => "table",
            Kind::OpaqueId => "opaque id",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host-defined 64-bit identifier carried through scripts untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct OpaqueId(pub u64);

impl OpaqueId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OpaqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "id:{:#018x}", self.0)
    }
}

/// Tagged value exchanged with scripts
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    Binary(Vec<u8>),
    Table(Table),
    OpaqueId(OpaqueId),
}

impl Value {
    pub fn nil() -> Self {
        Value::Nil
    }

    pub fn int(n: i64) -> Self {
        Value::Int(n)
    }

    pub fn float(x: f64) -> Self {
        Value::Float(x)
    }

    pub fn bool(b: bool) -> Self {
        Value::Bool(b)
    }

    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        Value::Binary(bytes.into())
    }

    pub fn table(table: Table) -> Self {
        Value::Table(table)
    }

    pub fn opaque_id(id: u64) -> Self {
        Value::OpaqueId(OpaqueId(id))
    }

    pub fn kind(&self) -> Kind {
        match self {
            Value::Nil => Kind::Nil,
            Value::Int(_) => Kind::Int,
            Value::Float(_) => Kind::Float,
            Value::Bool(_) => Kind::Bool,
            Value::String(_) => Kind::String,
            Value::Binary(_) => Kind::Binary,
            Value::Table(_) => Kind::Table,
            Value::OpaqueId(_) => Kind::OpaqueId,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Value::Int(_))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Value::Float(_))
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Value::Binary(_))
    }

    pub fn is_table(&self) -> bool {
        matches!(self, Value::Table(_))
    }

    pub fn is_id(&self) -> bool {
        matches!(self, Value::OpaqueId(_))
    }

    #[track_caller]
    pub fn as_int(&self) -> Result<i64> {
        match self {
            Value::Int(n) => Ok(*n),
            other => Err(Error::type_mismatch(Kind::Int, other.kind())),
        }
    }

    #[track_caller]
    pub fn as_float(&self) -> Result<f64> {
        match self {
            Value::Float(x) => Ok(*x),
            other => Err(Error::type_mismatch(Kind::Float, other.kind())),
        }
    }

    #[track_caller]
    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(Error::type_mismatch(Kind::Bool, other.kind())),
        }
    }

    #[track_caller]
    pub fn as_string(&self) -> Result<&str> {
        match self {
            Value::String(s) => Ok(s),
            other => Err(Error::type_mismatch(Kind::String, other.kind())),
        }
    }

    #[track_caller]
    pub fn as_binary(&self) -> Result<&[u8]> {
        match self {
            Value::Binary(bytes) => Ok(bytes),
            other => Err(Error::type_mismatch(Kind::Binary, other.kind())),
        }
    }

    #[track_caller]
    pub fn as_table(&self) -> Result<&Table> {
        match self {
            Value::Table(t) => Ok(t),
            other => Err(Error::type_mismatch(Kind::Table, other.kind())),
        }
    }

    #[track_caller]
    pub fn as_table_mut(&mut self) -> Result<&mut Table> {
        match self {
            Value::Table(t) => Ok(t),
            other => Err(Error::type_mismatch(Kind::Table, other.kind())),
        }
    }

    #[track_caller]
    pub fn as_id(&self) -> Result<OpaqueId> {
        match self {
            Value::OpaqueId(id) => Ok(*id),
            other => Err(Error::type_mismatch(Kind::OpaqueId, other.kind())),
        }
    }

    /// Overwrite this value, releasing the previous payload first
    pub fn set(&mut self, value: impl Into<Value>) {
        self.replace(value.into());
    }

    /// Reset to Nil, releasing any owned payload
    pub fn reset(&mut self) {
        self.replace(Value::Nil);
    }

    /// Move the value out, leaving Nil behind
    pub fn take(&mut self) -> Value {
        std::mem::take(self)
    }

    /// The one place a Value changes kind.
    ///
    /// The old payload is dropped before the new one is installed.
    fn replace(&mut self, next: Value) {
        let previous = std::mem::take(self);
        drop(previous);
        *self = next;
    }
}

fn float_eq(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

fn float_hash_bits(x: f64) -> u64 {
    if x == 0.0 {
        0
    } else if x.is_nan() {
        CANONICAL_NAN_BITS
    } else {
        x.to_bits()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => float_eq(*a, *b),
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Binary(a), Value::Binary(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => a == b,
            (Value::OpaqueId(a), Value::OpaqueId(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Discriminant for type safety
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Nil => {}
            Value::Int(n) => n.hash(state),
            Value::Float(x) => float_hash_bits(*x).hash(state),
            Value::Bool(b) => b.hash(state),
            Value::String(s) => s.as_bytes().hash(state),
            Value::Binary(bytes) => bytes.hash(state),
            Value::Table(t) => t.hash(state),
            Value::OpaqueId(id) => id.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => {
                let s = x.to_string();
                f.write_str(&s)?;
                // Keep floats distinguishable from ints
                if !s.contains('.') && x.is_finite() {
                    f.write_str(".0")?;
                }
                Ok(())
            }
            Value::Bool(b) => write!(f, "{}", b),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Binary(bytes) => write!(f, "0x{}", hex::encode(bytes)),
            Value::Table(t) => write!(f, "{}", t),
            Value::OpaqueId(id) => write!(f, "{}", id),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Binary(bytes)
    }
}

impl From<&[u8]> for Value {
    fn from(bytes: &[u8]) -> Self {
        Value::Binary(bytes.to_vec())
    }
}

impl From<Table> for Value {
    fn from(t: Table) -> Self {
        Value::Table(t)
    }
}

impl From<OpaqueId> for Value {
    fn from(id: OpaqueId) -> Self {
        Value::OpaqueId(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Category;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(v: &Value) -> u64 {
        let mut h = DefaultHasher::new();
        v.hash(&mut h);
        h.finish()
    }

    #[test]
    fn test_constructors_set_kind() {
        assert_eq!(Value::nil().kind(), Kind::Nil);
        assert_eq!(Value::int(1).kind(), Kind::Int);
        assert_eq!(Value::float(1.5).kind(), Kind::Float);
        assert_eq!(Value::bool(true).kind(), Kind::Bool);
        assert_eq!(Value::string("x").kind(), Kind::String);
        assert_eq!(Value::binary(vec![1u8, 2]).kind(), Kind::Binary);
        assert_eq!(Value::table(Table::new()).kind(), Kind::Table);
        assert_eq!(Value::opaque_id(9).kind(), Kind::OpaqueId);
    }

    #[test]
    fn test_accessor_type_mismatch() {
        let v = Value::string("42");
        let err = v.as_int().unwrap_err();
        assert_eq!(err.category(), Category::InvalidType);
        assert_eq!(err.message(), "type mismatch: expected int, found string");
        assert!(Value::int(1).as_float().is_err());
        assert!(Value::float(1.0).as_int().is_err());
        assert!(Value::binary(b"ab".to_vec()).as_string().is_err());
    }

    #[test]
    fn test_accessors_return_payload() {
        assert_eq!(Value::int(-3).as_int().unwrap(), -3);
        assert_eq!(Value::float(0.25).as_float().unwrap(), 0.25);
        assert!(Value::bool(true).as_bool().unwrap());
        assert_eq!(Value::string("hi").as_string().unwrap(), "hi");
        assert_eq!(Value::binary(vec![0u8, 255]).as_binary().unwrap(), &[0, 255]);
        assert_eq!(Value::opaque_id(77).as_id().unwrap(), OpaqueId(77));
    }

    #[test]
    fn test_set_changes_kind() {
        let mut v = Value::string("owned payload");
        v.set(5i64);
        assert_eq!(v, Value::int(5));
        v.set(vec![1u8, 2, 3]);
        assert_eq!(v.as_binary().unwrap(), &[1, 2, 3]);
        v.reset();
        assert!(v.is_nil());
    }

    #[test]
    fn test_take_leaves_nil() {
        let mut v = Value::string("moved");
        let taken = v.take();
        assert!(v.is_nil());
        assert_eq!(taken, Value::string("moved"));
    }

    #[test]
    fn test_no_cross_kind_equality() {
        assert_ne!(Value::int(1), Value::float(1.0));
        assert_ne!(Value::int(0), Value::bool(false));
        assert_ne!(Value::string("ab"), Value::binary(b"ab".to_vec()));
        assert_ne!(Value::opaque_id(1), Value::int(1));
        assert_ne!(Value::nil(), Value::int(0));
    }

    #[test]
    fn test_content_equality() {
        let a = Value::string(String::from("same"));
        let b = Value::string("same".to_string());
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));

        let a = Value::binary(vec![9u8, 8, 7]);
        let b = Value::binary(vec![9u8, 8, 7]);
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn test_float_hash_consistency() {
        assert_eq!(Value::float(0.0), Value::float(-0.0));
        assert_eq!(hash_of(&Value::float(0.0)), hash_of(&Value::float(-0.0)));
        assert_eq!(Value::float(f64::NAN), Value::float(-f64::NAN));
        assert_eq!(
            hash_of(&Value::float(f64::NAN)),
            hash_of(&Value::float(-f64::NAN))
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::nil().to_string(), "nil");
        assert_eq!(Value::float(2.0).to_string(), "2.0");
        assert_eq!(Value::string("a").to_string(), "\"a\"");
        assert_eq!(Value::binary(vec![0xde, 0xad]).to_string(), "0xdead");
        assert_eq!(Value::opaque_id(1).to_string(), "id:0x0000000000000001");
    }
}
