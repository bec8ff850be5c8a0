//! Session operations, addressed by manager handle + session UID
//!
//! A session is locked with `try_lock` for the duration of each call, so a
//! host callback that re-enters its own session gets a `SessionBusy` failure
//! instead of a deadlock.

use std::ffi::{c_char, c_void};
use std::sync::{Arc, PoisonError};
use tether_core::{Error, ErrorKind, Origin, Result, Vector};

use super::{
    TetherCategory, TetherContext, clear_last_status, context, guard, handle, last_status,
    opt_str_arg, status, str_arg, write_out,
};
use crate::context::{BoundaryObject, Context};
use crate::session::Session;

/// Host function callable from scripts
///
/// `args` and `out` are vector handles owned by the library for the duration
/// of the call: read arguments from `args`, append results to `out`. A
/// non-zero return raises an error inside the script.
pub type TetherCallback = unsafe extern "C" fn(
    ctx: *const TetherContext,
    args: u64,
    out: u64,
    user_data: *mut c_void,
) -> TetherCategory;

/// Host callback bound into a session
struct ForeignCallback {
    ctx: *const Context,
    function: TetherCallback,
    user_data: *mut c_void,
    name: String,
}

// SAFETY: the host guarantees `ctx` outlives every session it owns and that
// `user_data` may be used from whichever thread drives the session.
unsafe impl Send for ForeignCallback {}
unsafe impl Sync for ForeignCallback {}

impl ForeignCallback {
    fn invoke(&self, args: &Vector) -> Result<Vector> {
        // SAFETY: see the Send impl
        let ctx = unsafe { &*self.ctx };
        let args_id = ctx.pin_vector(args.clone(), Origin::Internal)?;
        let out_id = match ctx.pin_vector(Vector::new(), Origin::Internal) {
            Ok(id) => id,
            Err(e) => {
                ctx.release(args_id);
                return Err(e);
            }
        };

        clear_last_status();
        let code =
            unsafe { (self.function)(self.ctx, args_id.to_raw(), out_id.to_raw(), self.user_data) };

        ctx.release(args_id);
        let results = match ctx.unpin(out_id) {
            Some(BoundaryObject::Vector(results)) => results,
            _ => Vector::new(),
        };

        if code == 0 {
            return Ok(results);
        }
        let message = last_status()
            .map(|s| s.message)
            .unwrap_or_else(|| format!("returned status {}", code));
        tracing::debug!(callback = %self.name, code, "host callback failed");
        Err(Error::new(ErrorKind::Callback {
            name: self.name.clone(),
            message,
        }))
    }
}

fn with_session<R>(
    ctx: &Context,
    manager: u64,
    uid: u64,
    f: impl FnOnce(&mut Session) -> Result<R>,
) -> Result<R> {
    let manager = ctx.manager(handle(manager, "manager")?)?;
    let session = manager
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(uid)?;
    let mut session = session.try_lock()?;
    f(&mut session)
}

/// Compile and execute a chunk; `source` is a path when `is_file` is set
///
/// # Safety
/// `ctx` must be a live context; `source` must be a valid C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_session_load(
    ctx: *const TetherContext,
    manager: u64,
    uid: u64,
    source: *const c_char,
    is_file: bool,
) -> TetherCategory {
    status("tether_session_load", || {
        let ctx = unsafe { context(ctx) }?;
        let source = unsafe { str_arg(source, "source") }?;
        with_session(ctx, manager, uid, |s| s.load(source, is_file))
    })
}

/// Execute a chunk without changing the session state
///
/// # Safety
/// `ctx` must be a live context; `source` must be a valid C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_session_run(
    ctx: *const TetherContext,
    manager: u64,
    uid: u64,
    source: *const c_char,
    is_file: bool,
) -> TetherCategory {
    status("tether_session_run", || {
        let ctx = unsafe { context(ctx) }?;
        let source = unsafe { str_arg(source, "source") }?;
        with_session(ctx, manager, uid, |s| s.run(source, is_file))
    })
}

/// Compile a chunk without executing it
///
/// # Safety
/// `ctx` must be a live context; `source` must be a valid C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_session_check(
    ctx: *const TetherContext,
    manager: u64,
    uid: u64,
    source: *const c_char,
    is_file: bool,
) -> TetherCategory {
    status("tether_session_check", || {
        let ctx = unsafe { context(ctx) }?;
        let source = unsafe { str_arg(source, "source") }?;
        with_session(ctx, manager, uid, |s| s.check(source, is_file))
    })
}

/// Call the function at `path`
///
/// `args` may be `0` for no arguments. On success `out_results` receives a
/// fresh vector handle holding every return value.
///
/// # Safety
/// `ctx` must be a live context; `path` must be a valid C string;
/// `out_results` must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_session_call(
    ctx: *const TetherContext,
    manager: u64,
    uid: u64,
    path: *const c_char,
    args: u64,
    out_results: *mut u64,
) -> TetherCategory {
    status("tether_session_call", || {
        let ctx = unsafe { context(ctx) }?;
        let path = unsafe { str_arg(path, "path") }?;
        if out_results.is_null() {
            return Err(Error::null_argument("out_results"));
        }
        let args = match args {
            0 => Vector::new(),
            raw => ctx.with_vector(handle(raw, "args")?, |v| Ok(v.clone()))?,
        };
        let results = with_session(ctx, manager, uid, |s| s.call(path, &args))?;
        let id = ctx.pin_vector(results, Origin::BoundaryLookup)?;
        unsafe { write_out(out_results, id.to_raw(), "out_results") }
    })
}

/// Bind a host function as `namespace.name`, or global `name` when
/// `namespace` is null or empty
///
/// # Safety
/// `ctx` must be a live context that outlives the session; `name` and
/// `namespace` must be valid C strings (`namespace` may be null).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_session_push_callback(
    ctx: *const TetherContext,
    manager: u64,
    uid: u64,
    name: *const c_char,
    namespace: *const c_char,
    callback: Option<TetherCallback>,
    user_data: *mut c_void,
) -> TetherCategory {
    status("tether_session_push_callback", || {
        let context_ref = unsafe { context(ctx) }?;
        let name = unsafe { str_arg(name, "name") }?;
        let namespace = unsafe { opt_str_arg(namespace, "namespace") }?;
        let function = callback.ok_or_else(|| Error::null_argument("callback"))?;
        let foreign = Arc::new(ForeignCallback {
            ctx,
            function,
            user_data,
            name: crate::callback::qualified_name(name, namespace),
        });
        with_session(context_ref, manager, uid, |s| {
            s.push_native_callback(name, namespace, Arc::new(move |args: &Vector| foreign.invoke(args)))
                .map(|_| ())
        })
    })
}

/// Unbind a callback by fully-qualified name; `out_removed` may be null
///
/// # Safety
/// `ctx` must be a live context; `name` must be a valid C string;
/// `out_removed` must be null or valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_session_remove_callback(
    ctx: *const TetherContext,
    manager: u64,
    uid: u64,
    name: *const c_char,
    out_removed: *mut bool,
) -> TetherCategory {
    status("tether_session_remove_callback", || {
        let ctx = unsafe { context(ctx) }?;
        let name = unsafe { str_arg(name, "name") }?;
        let removed = with_session(ctx, manager, uid, |s| s.remove_callback(name))?;
        if !out_removed.is_null() {
            unsafe { out_removed.write(removed) };
        }
        Ok(())
    })
}

/// A function exists at `path`
///
/// `false` is ambiguous on its own: `tether_status_category()` is `0` when
/// the function is simply absent and names the failure otherwise (for
/// example a closed or unknown session).
///
/// # Safety
/// `ctx` must be a live context; `path` must be a valid C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_session_has_method(
    ctx: *const TetherContext,
    manager: u64,
    uid: u64,
    path: *const c_char,
) -> bool {
    clear_last_status();
    guard("tether_session_has_method", false, || {
        let ctx = unsafe { context(ctx) }?;
        let path = unsafe { str_arg(path, "path") }?;
        with_session(ctx, manager, uid, |s| s.has_method(path))
    })
}

/// Assign a copy of `value` to a dotted global path
///
/// # Safety
/// `ctx` must be a live context; `path` must be a valid C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_session_push_value(
    ctx: *const TetherContext,
    manager: u64,
    uid: u64,
    path: *const c_char,
    value: u64,
) -> TetherCategory {
    status("tether_session_push_value", || {
        let ctx = unsafe { context(ctx) }?;
        let path = unsafe { str_arg(path, "path") }?;
        let value = ctx.with_value(handle(value, "value")?, |v| Ok(v.clone()))?;
        with_session(ctx, manager, uid, |s| s.push_value(path, &value))
    })
}

/// Read a dotted global path into a fresh value handle
///
/// # Safety
/// `ctx` must be a live context; `path` must be a valid C string; `out`
/// must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_session_get_value(
    ctx: *const TetherContext,
    manager: u64,
    uid: u64,
    path: *const c_char,
    out: *mut u64,
) -> TetherCategory {
    status("tether_session_get_value", || {
        let ctx = unsafe { context(ctx) }?;
        let path = unsafe { str_arg(path, "path") }?;
        if out.is_null() {
            return Err(Error::null_argument("out"));
        }
        let value = with_session(ctx, manager, uid, |s| s.get_value(path))?;
        let id = ctx.pin_value(value, Origin::BoundaryLookup)?;
        unsafe { write_out(out, id.to_raw(), "out") }
    })
}

/// The session exists and has not been closed
///
/// # Safety
/// `ctx` must be a live context from `tether_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_session_good(
    ctx: *const TetherContext,
    manager: u64,
    uid: u64,
) -> bool {
    guard("tether_session_good", false, || {
        let ctx = unsafe { context(ctx) }?;
        with_session(ctx, manager, uid, |s| Ok(s.good()))
    })
}
