//! Value handles
//!
//! Accessors fail with `InvalidType` when the stored kind differs; nothing
//! is coerced. String and binary accessors hand out pointers into
//! thread-local copies, valid until the next call of the same accessor on
//! the same thread.

use std::cell::RefCell;
use std::ffi::{CString, c_char};
use std::ptr;
use tether_core::{Error, OpaqueId, Origin, Value};

use super::{
    TetherBinary, TetherCategory, TetherContext, context, guard, handle, status, str_arg,
    to_cstring, write_out,
};
use crate::context::ObjectKind;

thread_local! {
    static STRING_OUT: RefCell<Option<CString>> = const { RefCell::new(None) };
    static BINARY_OUT: RefCell<Vec<u8>> = const { RefCell::new(Vec::new()) };
}

/// Create a Nil value. Returns `0` on failure.
///
/// # Safety
/// `ctx` must be a live context from `tether_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_value_new(ctx: *const TetherContext) -> u64 {
    guard("tether_value_new", 0, || {
        let ctx = unsafe { context(ctx) }?;
        Ok(ctx.pin_value(Value::Nil, Origin::BoundaryNew)?.to_raw())
    })
}

/// Free a value. Freeing twice is the same as freeing once.
///
/// # Safety
/// `ctx` must be a live context from `tether_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_value_delete(ctx: *const TetherContext, value: u64) -> TetherCategory {
    status("tether_value_delete", || {
        let ctx = unsafe { context(ctx) }?;
        ctx.release_as(handle(value, "value")?, ObjectKind::Value)?;
        Ok(())
    })
}

/// Kind discriminant of a value, or `-1` if the handle is invalid
///
/// # Safety
/// `ctx` must be a live context from `tether_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_value_kind(ctx: *const TetherContext, value: u64) -> i32 {
    guard("tether_value_kind", -1, || {
        let ctx = unsafe { context(ctx) }?;
        ctx.with_value(handle(value, "value")?, |v| Ok(v.kind() as i32))
    })
}

unsafe fn set(
    function: &'static str,
    ctx: *const TetherContext,
    value: u64,
    make: impl FnOnce() -> tether_core::Result<Value>,
) -> TetherCategory {
    status(function, || {
        let ctx = unsafe { context(ctx) }?;
        let id = handle(value, "value")?;
        let next = make()?;
        ctx.with_value(id, |v| {
            v.set(next);
            Ok(())
        })
    })
}

/// # Safety
/// `ctx` must be a live context from `tether_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_value_set_nil(ctx: *const TetherContext, value: u64) -> TetherCategory {
    unsafe { set("tether_value_set_nil", ctx, value, || Ok(Value::Nil)) }
}

/// # Safety
/// `ctx` must be a live context from `tether_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_value_set_int(
    ctx: *const TetherContext,
    value: u64,
    n: i64,
) -> TetherCategory {
    unsafe { set("tether_value_set_int", ctx, value, || Ok(Value::Int(n))) }
}

/// # Safety
/// `ctx` must be a live context from `tether_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_value_set_float(
    ctx: *const TetherContext,
    value: u64,
    x: f64,
) -> TetherCategory {
    unsafe { set("tether_value_set_float", ctx, value, || Ok(Value::Float(x))) }
}

/// # Safety
/// `ctx` must be a live context from `tether_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_value_set_bool(
    ctx: *const TetherContext,
    value: u64,
    b: bool,
) -> TetherCategory {
    unsafe { set("tether_value_set_bool", ctx, value, || Ok(Value::Bool(b))) }
}

/// Copy a NUL-terminated UTF-8 string into the value
///
/// # Safety
/// `ctx` must be a live context; `s` must be null or a valid C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_value_set_string(
    ctx: *const TetherContext,
    value: u64,
    s: *const c_char,
) -> TetherCategory {
    unsafe {
        set("tether_value_set_string", ctx, value, || {
            Ok(Value::string(str_arg(s, "s")?))
        })
    }
}

/// Copy `size` bytes into the value; `data` may be null only when `size` is 0
///
/// # Safety
/// `ctx` must be a live context; `data` must be valid for `size` bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_value_set_binary(
    ctx: *const TetherContext,
    value: u64,
    data: *const u8,
    size: usize,
) -> TetherCategory {
    unsafe {
        set("tether_value_set_binary", ctx, value, || {
            if size == 0 {
                return Ok(Value::binary(Vec::new()));
            }
            if data.is_null() {
                return Err(Error::null_argument("data"));
            }
            Ok(Value::binary(std::slice::from_raw_parts(data, size)))
        })
    }
}

/// # Safety
/// `ctx` must be a live context from `tether_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_value_set_id(
    ctx: *const TetherContext,
    value: u64,
    id: u64,
) -> TetherCategory {
    unsafe { set("tether_value_set_id", ctx, value, || Ok(Value::OpaqueId(OpaqueId(id)))) }
}

/// Copy a table into the value
///
/// # Safety
/// `ctx` must be a live context from `tether_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_value_set_table(
    ctx: *const TetherContext,
    value: u64,
    table: u64,
) -> TetherCategory {
    status("tether_value_set_table", || {
        let ctx = unsafe { context(ctx) }?;
        let id = handle(value, "value")?;
        let copy = ctx.with_table(handle(table, "table")?, |t| Ok(t.clone()))?;
        ctx.with_value(id, |v| {
            v.set(copy);
            Ok(())
        })
    })
}

/// # Safety
/// `ctx` must be a live context; `out` must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_value_as_int(
    ctx: *const TetherContext,
    value: u64,
    out: *mut i64,
) -> TetherCategory {
    status("tether_value_as_int", || {
        let ctx = unsafe { context(ctx) }?;
        let n = ctx.with_value(handle(value, "value")?, |v| v.as_int())?;
        unsafe { write_out(out, n, "out") }
    })
}

/// # Safety
/// `ctx` must be a live context; `out` must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_value_as_float(
    ctx: *const TetherContext,
    value: u64,
    out: *mut f64,
) -> TetherCategory {
    status("tether_value_as_float", || {
        let ctx = unsafe { context(ctx) }?;
        let x = ctx.with_value(handle(value, "value")?, |v| v.as_float())?;
        unsafe { write_out(out, x, "out") }
    })
}

/// # Safety
/// `ctx` must be a live context; `out` must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_value_as_bool(
    ctx: *const TetherContext,
    value: u64,
    out: *mut bool,
) -> TetherCategory {
    status("tether_value_as_bool", || {
        let ctx = unsafe { context(ctx) }?;
        let b = ctx.with_value(handle(value, "value")?, |v| v.as_bool())?;
        unsafe { write_out(out, b, "out") }
    })
}

/// Borrow the value's string as a NUL-terminated C string
///
/// # WARNING: Pointer Lifetime
/// Valid until the next `tether_value_as_string` call on this thread.
/// Interior NULs are replaced with '?'.
///
/// # Safety
/// `ctx` must be a live context; `out` must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_value_as_string(
    ctx: *const TetherContext,
    value: u64,
    out: *mut *const c_char,
) -> TetherCategory {
    status("tether_value_as_string", || {
        let ctx = unsafe { context(ctx) }?;
        if out.is_null() {
            return Err(Error::null_argument("out"));
        }
        let cstring = ctx.with_value(handle(value, "value")?, |v| Ok(to_cstring(v.as_string()?)))?;
        let ptr = STRING_OUT.with(|slot| {
            let ptr = cstring.as_ptr();
            *slot.borrow_mut() = Some(cstring);
            ptr
        });
        unsafe { write_out(out, ptr, "out") }
    })
}

/// Borrow the value's bytes
///
/// # WARNING: Pointer Lifetime
/// Valid until the next `tether_value_as_binary` call on this thread.
///
/// # Safety
/// `ctx` must be a live context; `out` must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_value_as_binary(
    ctx: *const TetherContext,
    value: u64,
    out: *mut TetherBinary,
) -> TetherCategory {
    status("tether_value_as_binary", || {
        let ctx = unsafe { context(ctx) }?;
        if out.is_null() {
            return Err(Error::null_argument("out"));
        }
        let bytes = ctx.with_value(handle(value, "value")?, |v| Ok(v.as_binary()?.to_vec()))?;
        let binary = BINARY_OUT.with(|slot| {
            let mut slot = slot.borrow_mut();
            *slot = bytes;
            TetherBinary {
                pointer: if slot.is_empty() { ptr::null() } else { slot.as_ptr() },
                size: slot.len(),
            }
        });
        unsafe { write_out(out, binary, "out") }
    })
}

/// # Safety
/// `ctx` must be a live context; `out` must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_value_as_id(
    ctx: *const TetherContext,
    value: u64,
    out: *mut u64,
) -> TetherCategory {
    status("tether_value_as_id", || {
        let ctx = unsafe { context(ctx) }?;
        let id = ctx.with_value(handle(value, "value")?, |v| v.as_id())?;
        unsafe { write_out(out, id.get(), "out") }
    })
}

/// Copy the value's table into a fresh table handle
///
/// # Safety
/// `ctx` must be a live context; `out` must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_value_as_table(
    ctx: *const TetherContext,
    value: u64,
    out: *mut u64,
) -> TetherCategory {
    status("tether_value_as_table", || {
        let ctx = unsafe { context(ctx) }?;
        if out.is_null() {
            return Err(Error::null_argument("out"));
        }
        let table = ctx.with_value(handle(value, "value")?, |v| Ok(v.as_table()?.clone()))?;
        let id = ctx.pin_table(table, Origin::BoundaryLookup)?;
        unsafe { write_out(out, id.to_raw(), "out") }
    })
}

unsafe fn is(
    function: &'static str,
    ctx: *const TetherContext,
    value: u64,
    predicate: fn(&Value) -> bool,
) -> bool {
    guard(function, false, || {
        let ctx = unsafe { context(ctx) }?;
        ctx.with_value(handle(value, "value")?, |v| Ok(predicate(v)))
    })
}

/// # Safety
/// `ctx` must be a live context from `tether_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_value_is_nil(ctx: *const TetherContext, value: u64) -> bool {
    unsafe { is("tether_value_is_nil", ctx, value, Value::is_nil) }
}

/// # Safety
/// `ctx` must be a live context from `tether_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_value_is_int(ctx: *const TetherContext, value: u64) -> bool {
    unsafe { is("tether_value_is_int", ctx, value, Value::is_int) }
}

/// # Safety
/// `ctx` must be a live context from `tether_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_value_is_float(ctx: *const TetherContext, value: u64) -> bool {
    unsafe { is("tether_value_is_float", ctx, value, Value::is_float) }
}

/// # Safety
/// `ctx` must be a live context from `tether_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_value_is_bool(ctx: *const TetherContext, value: u64) -> bool {
    unsafe { is("tether_value_is_bool", ctx, value, Value::is_bool) }
}

/// # Safety
/// `ctx` must be a live context from `tether_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_value_is_string(ctx: *const TetherContext, value: u64) -> bool {
    unsafe { is("tether_value_is_string", ctx, value, Value::is_string) }
}

/// # Safety
/// `ctx` must be a live context from `tether_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_value_is_binary(ctx: *const TetherContext, value: u64) -> bool {
    unsafe { is("tether_value_is_binary", ctx, value, Value::is_binary) }
}

/// # Safety
/// `ctx` must be a live context from `tether_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_value_is_table(ctx: *const TetherContext, value: u64) -> bool {
    unsafe { is("tether_value_is_table", ctx, value, Value::is_table) }
}

/// # Safety
/// `ctx` must be a live context from `tether_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_value_is_id(ctx: *const TetherContext, value: u64) -> bool {
    unsafe { is("tether_value_is_id", ctx, value, Value::is_id) }
}
