//! Vector handles

use tether_core::vector::out_of_range;
use tether_core::{Origin, Vector};

use super::{TetherCategory, TetherContext, context, guard, handle, status, write_out};
use crate::context::ObjectKind;

fn index(raw: i64, len: usize) -> tether_core::Result<usize> {
    usize::try_from(raw).map_err(|_| out_of_range(raw, len))
}

/// Create an empty vector. Returns `0` on failure.
///
/// # Safety
/// `ctx` must be a live context from `tether_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_vector_new(ctx: *const TetherContext) -> u64 {
    guard("tether_vector_new", 0, || {
        let ctx = unsafe { context(ctx) }?;
        Ok(ctx.pin_vector(Vector::new(), Origin::BoundaryNew)?.to_raw())
    })
}

/// # Safety
/// `ctx` must be a live context from `tether_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_vector_delete(
    ctx: *const TetherContext,
    vector: u64,
) -> TetherCategory {
    status("tether_vector_delete", || {
        let ctx = unsafe { context(ctx) }?;
        ctx.release_as(handle(vector, "vector")?, ObjectKind::Vector)?;
        Ok(())
    })
}

/// Append a copy of `value`; the caller keeps ownership of its handle
///
/// # Safety
/// `ctx` must be a live context from `tether_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_vector_append(
    ctx: *const TetherContext,
    vector: u64,
    value: u64,
) -> TetherCategory {
    status("tether_vector_append", || {
        let ctx = unsafe { context(ctx) }?;
        let vector = handle(vector, "vector")?;
        let copy = ctx.with_value(handle(value, "value")?, |v| Ok(v.clone()))?;
        ctx.with_vector(vector, |v| {
            v.append(copy);
            Ok(())
        })
    })
}

/// Remove the last element; popping an empty vector is a no-op
///
/// # Safety
/// `ctx` must be a live context from `tether_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_vector_pop(ctx: *const TetherContext, vector: u64) -> TetherCategory {
    status("tether_vector_pop", || {
        let ctx = unsafe { context(ctx) }?;
        // Popped value dropped after the arena lock is released
        let _popped = ctx.with_vector(handle(vector, "vector")?, |v| Ok(v.pop()))?;
        Ok(())
    })
}

/// # Safety
/// `ctx` must be a live context from `tether_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_vector_clear(
    ctx: *const TetherContext,
    vector: u64,
) -> TetherCategory {
    status("tether_vector_clear", || {
        let ctx = unsafe { context(ctx) }?;
        let _items = ctx.with_vector(handle(vector, "vector")?, |v| Ok(std::mem::take(v)))?;
        Ok(())
    })
}

/// # Safety
/// `ctx` must be a live context; `out` must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_vector_size(
    ctx: *const TetherContext,
    vector: u64,
    out: *mut u64,
) -> TetherCategory {
    status("tether_vector_size", || {
        let ctx = unsafe { context(ctx) }?;
        let size = ctx.with_vector(handle(vector, "vector")?, |v| Ok(v.size() as u64))?;
        unsafe { write_out(out, size, "out") }
    })
}

/// Copy element `index` into a fresh value handle the caller must free
///
/// # Safety
/// `ctx` must be a live context; `out` must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_vector_at(
    ctx: *const TetherContext,
    vector: u64,
    index: i64,
    out: *mut u64,
) -> TetherCategory {
    status("tether_vector_at", || {
        let ctx = unsafe { context(ctx) }?;
        if out.is_null() {
            return Err(tether_core::Error::null_argument("out"));
        }
        let element = ctx.with_vector(handle(vector, "vector")?, |v| {
            let i = self::index(index, v.size())?;
            Ok(v.at(i)?.clone())
        })?;
        let id = ctx.pin_value(element, Origin::BoundaryLookup)?;
        unsafe { write_out(out, id.to_raw(), "out") }
    })
}

/// Copy element `index` into an existing value handle
///
/// # Safety
/// `ctx` must be a live context from `tether_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_vector_at_const(
    ctx: *const TetherContext,
    vector: u64,
    index: i64,
    value: u64,
) -> TetherCategory {
    status("tether_vector_at_const", || {
        let ctx = unsafe { context(ctx) }?;
        let target = handle(value, "value")?;
        let element = ctx.with_vector(handle(vector, "vector")?, |v| {
            let i = self::index(index, v.size())?;
            Ok(v.at(i)?.clone())
        })?;
        let _previous = ctx.with_value(target, |v| Ok(std::mem::replace(v, element)))?;
        Ok(())
    })
}
