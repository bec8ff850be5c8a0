//! Marshalling between boundary Values and Lua values
//!
//! Scalars map one to one (Int <-> integer, Float <-> number, ...). Lua has
//! no native binary or opaque-id type, so those two kinds are carried
//! according to the session's [`Encoding`]:
//!
//! - `Tagged`: typed userdata ([`Blob`], [`OpaqueHandle`]) that scripts can
//!   compare, print and measure
//! - `Sentinel`: a plain table with one reserved field, `__raw_bytes` or
//!   `__opaque_id`, for scripts written against that convention
//!
//! Reading accepts both forms regardless of the session's encoding.

use mlua::{
    AnyUserData, Lua, MetaMethod, MultiValue, UserData, UserDataMethods, Value as LuaValue,
};
use tether_core::{Error, ErrorKind, OpaqueId, Result, Table, Value, Vector};

use crate::path;

/// Reserved field marking a table as an encoded opaque id
pub const SENTINEL_OPAQUE_ID: &str = "__opaque_id";

/// Reserved field marking a table as an encoded binary blob
pub const SENTINEL_RAW_BYTES: &str = "__raw_bytes";

/// Deepest table nesting `read` will follow; deeper structures are treated
/// as cyclic
pub const MAX_READ_DEPTH: usize = 64;

/// How Binary and OpaqueId values are represented inside Lua
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Tagged,
    Sentinel,
}

/// Opaque 64-bit id as seen by scripts (`id:value()`, `tostring(id)`, `==`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpaqueHandle(pub u64);

impl UserData for OpaqueHandle {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("value", |_, this, ()| Ok(this.0 as i64));
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            Ok(OpaqueId(this.0).to_string())
        });
        methods.add_meta_method(MetaMethod::Eq, |_, this, other: AnyUserData| {
            Ok(other
                .borrow::<OpaqueHandle>()
                .map(|o| o.0 == this.0)
                .unwrap_or(false))
        });
    }
}

/// Binary payload as seen by scripts (`#blob`, `blob:bytes()`, `blob:len()`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob(pub Vec<u8>);

impl UserData for Blob {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("len", |_, this, ()| Ok(this.0.len()));
        methods.add_method("bytes", |lua, this, ()| lua.create_string(&this.0));
        methods.add_meta_method(MetaMethod::Len, |_, this, ()| Ok(this.0.len()));
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            Ok(Value::binary(this.0.clone()).to_string())
        });
        methods.add_meta_method(MetaMethod::Eq, |_, this, other: AnyUserData| {
            Ok(other
                .borrow::<Blob>()
                .map(|o| o.0 == this.0)
                .unwrap_or(false))
        });
    }
}

/// Convert a Lua error into a boundary error
///
/// A boundary `Error` raised by a native callback travels through Lua as an
/// external error; it is unwrapped so its category survives the round trip.
#[track_caller]
pub fn lua_error(err: &mlua::Error) -> Error {
    let root = root_cause(err);
    if let mlua::Error::ExternalError(inner) = root {
        if let Some(boundary) = inner.downcast_ref::<Error>() {
            return boundary.clone();
        }
    }
    Error::execution(root.to_string())
}

fn root_cause(err: &mlua::Error) -> &mlua::Error {
    match err {
        mlua::Error::CallbackError { cause, .. } => root_cause(cause),
        mlua::Error::WithContext { cause, .. } => root_cause(cause),
        other => other,
    }
}

/// Push a Value into the runtime
pub fn push(lua: &Lua, value: &Value, encoding: Encoding) -> Result<LuaValue> {
    let pushed = match value {
        Value::Nil => LuaValue::Nil,
        Value::Int(n) => LuaValue::Integer(*n),
        Value::Float(x) => LuaValue::Number(*x),
        Value::Bool(b) => LuaValue::Boolean(*b),
        Value::String(s) => LuaValue::String(lua.create_string(s).map_err(|e| lua_error(&e))?),
        Value::Binary(bytes) => match encoding {
            Encoding::Tagged => LuaValue::UserData(
                lua.create_userdata(Blob(bytes.clone()))
                    .map_err(|e| lua_error(&e))?,
            ),
            Encoding::Sentinel => {
                let raw = lua.create_string(bytes).map_err(|e| lua_error(&e))?;
                sentinel_table(lua, SENTINEL_RAW_BYTES, LuaValue::String(raw))?
            }
        },
        Value::OpaqueId(id) => match encoding {
            Encoding::Tagged => LuaValue::UserData(
                lua.create_userdata(OpaqueHandle(id.get()))
                    .map_err(|e| lua_error(&e))?,
            ),
            Encoding::Sentinel => {
                sentinel_table(lua, SENTINEL_OPAQUE_ID, LuaValue::Integer(id.get() as i64))?
            }
        },
        Value::Table(table) => LuaValue::Table(push_table(lua, table, encoding)?),
    };
    Ok(pushed)
}

fn sentinel_table(lua: &Lua, field: &str, payload: LuaValue) -> Result<LuaValue> {
    let table = lua.create_table().map_err(|e| lua_error(&e))?;
    table.raw_set(field, payload).map_err(|e| lua_error(&e))?;
    Ok(LuaValue::Table(table))
}

fn push_table(lua: &Lua, table: &Table, encoding: Encoding) -> Result<mlua::Table> {
    let out = lua.create_table().map_err(|e| lua_error(&e))?;
    for (key, value) in table.iter() {
        // Lua tables cannot hold nil or NaN keys
        let storable = match key {
            Value::Nil => false,
            Value::Float(x) => !x.is_nan(),
            _ => true,
        };
        if !storable {
            tracing::debug!(%key, "skipping table entry with a key Lua cannot store");
            continue;
        }
        // Lua stores an integral float key under its integer value
        if let Some(n) = integral_key(key) {
            if table.has_key(&Value::Int(n)) {
                return Err(Error::new(ErrorKind::KeyCollision {
                    key: key.to_string(),
                }));
            }
        }
        let k = push(lua, key, encoding)?;
        let v = push(lua, value, encoding)?;
        out.raw_set(k, v).map_err(|e| lua_error(&e))?;
    }
    Ok(out)
}

/// Integer a float key is normalized to when stored in a Lua table
fn integral_key(key: &Value) -> Option<i64> {
    const LIMIT: f64 = -(i64::MIN as f64);
    match *key {
        Value::Float(x) if x.fract() == 0.0 && (-LIMIT..LIMIT).contains(&x) => Some(x as i64),
        _ => None,
    }
}

/// Push every element of `args`, in order
pub fn push_all(lua: &Lua, args: &Vector, encoding: Encoding) -> Result<MultiValue> {
    let mut pushed = Vec::with_capacity(args.size());
    for value in args {
        pushed.push(push(lua, value, encoding)?);
    }
    Ok(MultiValue::from_vec(pushed))
}

/// Read a Lua value back into a Value
///
/// Functions, threads and foreign userdata read as Nil.
pub fn read(value: &LuaValue) -> Result<Value> {
    read_at(value, 0)
}

fn read_at(value: &LuaValue, depth: usize) -> Result<Value> {
    let read = match value {
        LuaValue::Nil => Value::Nil,
        LuaValue::Boolean(b) => Value::Bool(*b),
        LuaValue::Integer(n) => Value::Int(*n),
        LuaValue::Number(x) => Value::Float(*x),
        LuaValue::String(s) => {
            let bytes = s.as_bytes();
            match std::str::from_utf8(&bytes) {
                Ok(text) => Value::string(text),
                Err(_) => Value::binary(bytes.to_vec()),
            }
        }
        LuaValue::Table(table) => read_table(table, depth)?,
        LuaValue::UserData(ud) => read_userdata(ud),
        _ => Value::Nil,
    };
    Ok(read)
}

fn read_table(table: &mlua::Table, depth: usize) -> Result<Value> {
    if depth >= MAX_READ_DEPTH {
        return Err(Error::new(ErrorKind::TooDeep {
            limit: MAX_READ_DEPTH,
        }));
    }

    if let LuaValue::Integer(id) = table
        .raw_get::<LuaValue>(SENTINEL_OPAQUE_ID)
        .map_err(|e| lua_error(&e))?
    {
        return Ok(Value::opaque_id(id as u64));
    }
    if let LuaValue::String(raw) = table
        .raw_get::<LuaValue>(SENTINEL_RAW_BYTES)
        .map_err(|e| lua_error(&e))?
    {
        return Ok(Value::binary(raw.as_bytes().to_vec()));
    }

    let mut out = Table::new();
    for pair in table.pairs::<LuaValue, LuaValue>() {
        let (key, value) = pair.map_err(|e| lua_error(&e))?;
        out.set(read_at(&key, depth + 1)?, read_at(&value, depth + 1)?);
    }
    Ok(Value::Table(out))
}

fn read_userdata(ud: &AnyUserData) -> Value {
    if let Ok(handle) = ud.borrow::<OpaqueHandle>() {
        return Value::opaque_id(handle.0);
    }
    if let Ok(blob) = ud.borrow::<Blob>() {
        return Value::binary(blob.0.clone());
    }
    Value::Nil
}

/// Read every returned value, in order
pub fn read_all(values: &MultiValue) -> Result<Vector> {
    let mut out = Vector::with_capacity(values.len());
    for value in values.iter() {
        out.append(read(value)?);
    }
    Ok(out)
}

/// Call the function at a dotted `path` with `args`
///
/// The result vector holds exactly the returned values, first return value
/// at index 0.
pub fn call(lua: &Lua, encoding: Encoding, path: &str, args: &Vector) -> Result<Vector> {
    let function = path::resolve(lua, path)?;
    let pushed = push_all(lua, args, encoding)?;
    let returned = function
        .call::<MultiValue>(pushed)
        .map_err(|e| match lua_error(&e) {
            err if matches!(err.kind(), ErrorKind::Execution { .. }) => {
                Error::execution(format!("{} when calling `{}`", err.message(), path))
            }
            err => err,
        })?;
    read_all(&returned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::Category;

    fn round_trip(lua: &Lua, value: Value) -> Value {
        let pushed = push(lua, &value, Encoding::Tagged).unwrap();
        read(&pushed).unwrap()
    }

    #[test]
    fn test_scalar_round_trip_extremes() {
        let lua = Lua::new();
        let samples = vec![
            Value::int(i64::MIN),
            Value::int(i64::MAX),
            Value::int(0),
            Value::float(f64::MAX),
            Value::float(f64::MIN_POSITIVE / 2.0),
            Value::float(-0.0),
            Value::float(0.0),
            Value::bool(true),
            Value::bool(false),
            Value::string(""),
            Value::string("héllo, wörld ✓"),
            Value::nil(),
        ];
        for value in samples {
            assert_eq!(round_trip(&lua, value.clone()), value);
        }
    }

    #[test]
    fn test_float_stays_float() {
        let lua = Lua::new();
        assert_eq!(round_trip(&lua, Value::float(2.0)), Value::float(2.0));
        assert!(round_trip(&lua, Value::float(2.0)).is_float());
    }

    #[test]
    fn test_non_utf8_string_reads_as_binary() {
        let lua = Lua::new();
        let s = lua.create_string([0xffu8, 0xfe, 0x00]).unwrap();
        let read = read(&LuaValue::String(s)).unwrap();
        assert_eq!(read, Value::binary(vec![0xffu8, 0xfe, 0x00]));
    }

    #[test]
    fn test_tagged_binary_and_id() {
        let lua = Lua::new();
        let blob = push(&lua, &Value::binary(vec![1u8, 2, 3]), Encoding::Tagged).unwrap();
        let id = push(&lua, &Value::opaque_id(0xfeed), Encoding::Tagged).unwrap();
        lua.globals().set("blob", blob).unwrap();
        lua.globals().set("id", id).unwrap();

        let (len, value): (i64, i64) = lua
            .load("return #blob, id:value()")
            .eval()
            .unwrap();
        assert_eq!(len, 3);
        assert_eq!(value, 0xfeed);

        let back = read(&lua.globals().get::<LuaValue>("blob").unwrap()).unwrap();
        assert_eq!(back, Value::binary(vec![1u8, 2, 3]));
        let back = read(&lua.globals().get::<LuaValue>("id").unwrap()).unwrap();
        assert_eq!(back, Value::opaque_id(0xfeed));
    }

    #[test]
    fn test_sentinel_encoding() {
        let lua = Lua::new();
        let pushed = push(&lua, &Value::opaque_id(7), Encoding::Sentinel).unwrap();
        match &pushed {
            LuaValue::Table(t) => assert_eq!(t.raw_get::<i64>(SENTINEL_OPAQUE_ID).unwrap(), 7),
            other => panic!("expected table, got {:?}", other),
        }
        assert_eq!(read(&pushed).unwrap(), Value::opaque_id(7));

        let pushed = push(&lua, &Value::binary(b"raw".to_vec()), Encoding::Sentinel).unwrap();
        assert_eq!(read(&pushed).unwrap(), Value::binary(b"raw".to_vec()));
    }

    #[test]
    fn test_sentinel_tables_from_scripts() {
        let lua = Lua::new();
        let v: LuaValue = lua.load("return { __opaque_id = 99 }").eval().unwrap();
        assert_eq!(read(&v).unwrap(), Value::opaque_id(99));
    }

    #[test]
    fn test_nested_table_round_trip() {
        let lua = Lua::new();
        let mut inner = Table::new();
        inner.set("hp", 10i64);
        inner.set("tag", Value::binary(vec![9u8]));
        let mut outer = Table::new();
        outer.set("player", inner);
        outer.set(1i64, "first");

        let value = Value::table(outer);
        assert_eq!(round_trip(&lua, value.clone()), value);
    }

    #[test]
    fn test_integral_float_key_colliding_with_int_is_rejected() {
        let lua = Lua::new();
        let mut t = Table::new();
        t.set(Value::int(2), "int");
        t.set(Value::float(2.0), "float");
        let err = push(&lua, &Value::table(t), Encoding::Tagged).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::KeyCollision { .. }));
        assert_eq!(err.category(), Category::InvalidType);
    }

    #[test]
    fn test_lone_integral_float_key_reads_back_as_int() {
        let lua = Lua::new();
        let mut t = Table::new();
        t.set(Value::float(2.0), "two");
        t.set(Value::float(2.5), "two and a half");
        let back = round_trip(&lua, Value::table(t));
        let back = back.as_table().unwrap();
        assert_eq!(back.size(), 2);
        assert!(back.has_key(&Value::int(2)));
        assert!(!back.has_key(&Value::float(2.0)));
        assert!(back.has_key(&Value::float(2.5)));
    }

    #[test]
    fn test_cyclic_table_is_rejected() {
        let lua = Lua::new();
        let v: LuaValue = lua.load("local t = {}; t.self = t; return t").eval().unwrap();
        let err = read(&v).unwrap_err();
        assert_eq!(err.category(), Category::InvalidType);
    }

    #[test]
    fn test_functions_read_as_nil() {
        let lua = Lua::new();
        let v: LuaValue = lua.load("return print").eval().unwrap();
        assert!(read(&v).unwrap().is_nil());
    }

    #[test]
    fn test_call_returns_every_result_in_order() {
        let lua = Lua::new();
        lua.load("function three() return 1, 'two', 3.0 end").exec().unwrap();
        let out = call(&lua, Encoding::Tagged, "three", &Vector::new()).unwrap();
        assert_eq!(out.size(), 3);
        assert_eq!(out.at(0).unwrap(), &Value::int(1));
        assert_eq!(out.at(1).unwrap(), &Value::string("two"));
        assert_eq!(out.at(2).unwrap(), &Value::float(3.0));
    }

    #[test]
    fn test_call_failure_names_the_path() {
        let lua = Lua::new();
        lua.load("function fail() error('boom') end").exec().unwrap();
        let err = call(&lua, Encoding::Tagged, "fail", &Vector::new()).unwrap_err();
        assert_eq!(err.category(), Category::ExecutionError);
        assert!(err.message().contains("boom"));
        assert!(err.message().ends_with("when calling `fail`"));
    }
}
