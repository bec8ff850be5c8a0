//! Table handles
//!
//! Keys and values are passed as value handles and copied in and out; a
//! table never holds on to a caller's handle.

use tether_core::{Error, Origin, Table};

use super::{TetherCategory, TetherContext, context, guard, handle, status, write_out};
use crate::context::ObjectKind;

/// Create an empty table. Returns `0` on failure.
///
/// # Safety
/// `ctx` must be a live context from `tether_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_table_new(ctx: *const TetherContext) -> u64 {
    guard("tether_table_new", 0, || {
        let ctx = unsafe { context(ctx) }?;
        Ok(ctx.pin_table(Table::new(), Origin::BoundaryNew)?.to_raw())
    })
}

/// # Safety
/// `ctx` must be a live context from `tether_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_table_delete(ctx: *const TetherContext, table: u64) -> TetherCategory {
    status("tether_table_delete", || {
        let ctx = unsafe { context(ctx) }?;
        ctx.release_as(handle(table, "table")?, ObjectKind::Table)?;
        Ok(())
    })
}

/// Copy the entry under `key` into a fresh value handle
///
/// # Safety
/// `ctx` must be a live context; `out` must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_table_at(
    ctx: *const TetherContext,
    table: u64,
    key: u64,
    out: *mut u64,
) -> TetherCategory {
    status("tether_table_at", || {
        let ctx = unsafe { context(ctx) }?;
        if out.is_null() {
            return Err(Error::null_argument("out"));
        }
        let key = ctx.with_value(handle(key, "key")?, |k| Ok(k.clone()))?;
        let entry = ctx.with_table(handle(table, "table")?, |t| Ok(t.at(&key)?.clone()))?;
        let id = ctx.pin_value(entry, Origin::BoundaryLookup)?;
        unsafe { write_out(out, id.to_raw(), "out") }
    })
}

/// # Safety
/// `ctx` must be a live context; `out` must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_table_has_key(
    ctx: *const TetherContext,
    table: u64,
    key: u64,
    out: *mut bool,
) -> TetherCategory {
    status("tether_table_has_key", || {
        let ctx = unsafe { context(ctx) }?;
        let key = ctx.with_value(handle(key, "key")?, |k| Ok(k.clone()))?;
        let found = ctx.with_table(handle(table, "table")?, |t| Ok(t.has_key(&key)))?;
        unsafe { write_out(out, found, "out") }
    })
}

/// Insert or replace an entry with copies of `key` and `value`
///
/// # Safety
/// `ctx` must be a live context from `tether_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_table_set(
    ctx: *const TetherContext,
    table: u64,
    key: u64,
    value: u64,
) -> TetherCategory {
    status("tether_table_set", || {
        let ctx = unsafe { context(ctx) }?;
        let table = handle(table, "table")?;
        let key = ctx.with_value(handle(key, "key")?, |k| Ok(k.clone()))?;
        let value = ctx.with_value(handle(value, "value")?, |v| Ok(v.clone()))?;
        ctx.with_table(table, |t| {
            t.set(key, value);
            Ok(())
        })
    })
}

/// All keys as a fresh vector handle
///
/// # Safety
/// `ctx` must be a live context; `out` must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_table_keys(
    ctx: *const TetherContext,
    table: u64,
    out: *mut u64,
) -> TetherCategory {
    status("tether_table_keys", || {
        let ctx = unsafe { context(ctx) }?;
        if out.is_null() {
            return Err(Error::null_argument("out"));
        }
        let keys = ctx.with_table(handle(table, "table")?, |t| Ok(t.keys()))?;
        let id = ctx.pin_vector(keys, Origin::BoundaryLookup)?;
        unsafe { write_out(out, id.to_raw(), "out") }
    })
}

/// All values as a fresh vector handle, in the same order as
/// `tether_table_keys` for an unmodified table
///
/// # Safety
/// `ctx` must be a live context; `out` must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_table_values(
    ctx: *const TetherContext,
    table: u64,
    out: *mut u64,
) -> TetherCategory {
    status("tether_table_values", || {
        let ctx = unsafe { context(ctx) }?;
        if out.is_null() {
            return Err(Error::null_argument("out"));
        }
        let values = ctx.with_table(handle(table, "table")?, |t| Ok(t.values()))?;
        let id = ctx.pin_vector(values, Origin::BoundaryLookup)?;
        unsafe { write_out(out, id.to_raw(), "out") }
    })
}

/// # Safety
/// `ctx` must be a live context; `out` must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_table_size(
    ctx: *const TetherContext,
    table: u64,
    out: *mut u64,
) -> TetherCategory {
    status("tether_table_size", || {
        let ctx = unsafe { context(ctx) }?;
        let size = ctx.with_table(handle(table, "table")?, |t| Ok(t.size() as u64))?;
        unsafe { write_out(out, size, "out") }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::ffi::value::{
        tether_value_as_table, tether_value_new, tether_value_set_int, tether_value_set_table,
    };
    use crate::ffi::vector::tether_vector_size;
    use serial_test::serial;
    use tether_core::{Category, Value};

    #[test]
    #[serial]
    fn test_set_lookup_and_enumerate() {
        let ctx = Context::init().unwrap();
        unsafe {
            let table = tether_table_new(&ctx);
            let key = tether_value_new(&ctx);
            let value = tether_value_new(&ctx);
            tether_value_set_int(&ctx, key, 1);
            tether_value_set_int(&ctx, value, 100);
            assert_eq!(tether_table_set(&ctx, table, key, value), 0);

            let mut found = false;
            assert_eq!(tether_table_has_key(&ctx, table, key, &mut found), 0);
            assert!(found);

            let mut entry = 0u64;
            assert_eq!(tether_table_at(&ctx, table, key, &mut entry), 0);
            let copied = ctx
                .with_value(tether_core::PinId::from_raw(entry).unwrap(), |v| Ok(v.clone()))
                .unwrap();
            assert_eq!(copied, Value::int(100));

            let mut size = 0u64;
            tether_table_size(&ctx, table, &mut size);
            assert_eq!(size, 1);

            let mut keys = 0u64;
            assert_eq!(tether_table_keys(&ctx, table, &mut keys), 0);
            tether_vector_size(&ctx, keys, &mut size);
            assert_eq!(size, 1);
        }
    }

    #[test]
    #[serial]
    fn test_missing_key() {
        let ctx = Context::init().unwrap();
        unsafe {
            let table = tether_table_new(&ctx);
            let key = tether_value_new(&ctx);
            let mut found = true;
            tether_table_has_key(&ctx, table, key, &mut found);
            assert!(!found);

            let mut entry = 0u64;
            assert_eq!(
                tether_table_at(&ctx, table, key, &mut entry),
                Category::GenericError.code()
            );
        }
    }

    #[test]
    #[serial]
    fn test_value_table_round_trip() {
        let ctx = Context::init().unwrap();
        unsafe {
            let table = tether_table_new(&ctx);
            let key = tether_value_new(&ctx);
            tether_value_set_int(&ctx, key, 7);
            tether_table_set(&ctx, table, key, key);

            let holder = tether_value_new(&ctx);
            assert_eq!(tether_value_set_table(&ctx, holder, table), 0);

            let mut copy = 0u64;
            assert_eq!(tether_value_as_table(&ctx, holder, &mut copy), 0);
            assert_ne!(copy, table);
            let mut size = 0u64;
            tether_table_size(&ctx, copy, &mut size);
            assert_eq!(size, 1);
        }
    }
}
