//! Flat C ABI
//!
//! Every object crosses the boundary as a `u64` handle naming a slot in the
//! context's pin arena (`0` is the null handle). Functions that can fail
//! return a category code (`0` = ok); the full status of the most recent
//! failure on the calling thread is kept in thread-local storage and read
//! back through the `tether_status_*` accessors.
//!
//! No panic ever unwinds into the host: every entry point runs its body
//! under `catch_unwind` and reports a panic as a promoted native exception.
//!
//! # Usage
//!
//! ```c
//! TetherContext *ctx = tether_init();
//! uint64_t manager = tether_manager_new(ctx);
//! uint64_t uid = tether_manager_new_session(ctx, manager, true);
//! if (tether_session_load(ctx, manager, uid, "print('hi')", false) != 0) {
//!     fprintf(stderr, "%s\n", tether_status_format());
//! }
//! tether_shutdown(ctx);
//! ```

pub mod manager;
pub mod session;
pub mod table;
pub mod value;
pub mod vector;

use std::any::Any;
use std::cell::RefCell;
use std::ffi::{CStr, CString, c_char};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use tether_core::{Category, Error, ErrorKind, Kind, PinId, Result, Status};

use crate::context::Context;

/// Category code returned by fallible entry points
pub type TetherCategory = i32;

/// Opaque context type as seen from C
pub type TetherContext = Context;

/// Borrowed byte payload
///
/// When returned by `tether_value_as_binary` the pointer is only valid until
/// the next call to that function on the same thread.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TetherBinary {
    pub pointer: *const u8,
    pub size: usize,
}

// =============================================================================
// Thread-local last status
// =============================================================================

const STATUS_MESSAGE: usize = 0;
const STATUS_FUNCTION: usize = 1;
const STATUS_FILE: usize = 2;
const STATUS_FORMATTED: usize = 3;

thread_local! {
    /// Status of the most recent failed boundary call on this thread
    static LAST_STATUS: RefCell<Option<Status>> = const { RefCell::new(None) };

    /// Cached C strings handed out by the accessors, one slot per accessor
    static STATUS_CSTRINGS: RefCell<[Option<CString>; 4]> =
        const { RefCell::new([None, None, None, None]) };
}

/// Record a failure status
///
/// Clears the cached C strings first so no accessor keeps returning text
/// from an older status.
pub fn set_last_status(status: Status) {
    STATUS_CSTRINGS.with(|cs| *cs.borrow_mut() = [None, None, None, None]);
    LAST_STATUS.with(|s| *s.borrow_mut() = Some(status));
}

pub fn last_status() -> Option<Status> {
    LAST_STATUS.with(|s| s.borrow().clone())
}

pub fn clear_last_status() {
    LAST_STATUS.with(|s| *s.borrow_mut() = None);
    STATUS_CSTRINGS.with(|cs| *cs.borrow_mut() = [None, None, None, None]);
}

/// Format a panic payload into an error message
pub fn format_panic_payload(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// C string copy of `text`; interior NULs become '?'
pub(crate) fn to_cstring(text: &str) -> CString {
    let safe: String = text
        .chars()
        .map(|c| if c == '\0' { '?' } else { c })
        .collect();
    CString::new(safe).unwrap_or_default()
}

fn status_cstring(slot: usize, render: impl FnOnce(&Status) -> String) -> *const c_char {
    LAST_STATUS.with(|s| match &*s.borrow() {
        Some(status) => {
            let cstring = to_cstring(&render(status));
            STATUS_CSTRINGS.with(|cs| {
                let ptr = cstring.as_ptr();
                cs.borrow_mut()[slot] = Some(cstring);
                ptr
            })
        }
        None => ptr::null(),
    })
}

// =============================================================================
// Entry point guards
// =============================================================================

fn run<T>(
    function: &'static str,
    body: impl FnOnce() -> Result<T>,
) -> std::result::Result<T, TetherCategory> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(body)).unwrap_or_else(|payload| {
        Err(Error::new(ErrorKind::Promoted {
            message: format_panic_payload(&*payload),
        }))
    });
    outcome.map_err(|e| {
        let status = Status::from(e.within(function));
        let code = status.category.code();
        tracing::debug!(function, category = status.category.as_str(), message = %status.message, "boundary call failed");
        set_last_status(status);
        code
    })
}

/// Run an entry point that reports only a category
pub(crate) fn status(function: &'static str, body: impl FnOnce() -> Result<()>) -> TetherCategory {
    match run(function, body) {
        Ok(()) => Category::Ok.code(),
        Err(code) => code,
    }
}

/// Run an entry point that returns a value, substituting `fallback` on failure
pub(crate) fn guard<T>(function: &'static str, fallback: T, body: impl FnOnce() -> Result<T>) -> T {
    run(function, body).unwrap_or(fallback)
}

// =============================================================================
// Argument helpers
// =============================================================================

/// # Safety
/// `ctx` must be null or a pointer returned by `tether_init` and not yet shut down.
pub(crate) unsafe fn context<'a>(ctx: *const Context) -> Result<&'a Context> {
    if ctx.is_null() {
        return Err(Error::null_argument("ctx"));
    }
    Ok(unsafe { &*ctx })
}

#[track_caller]
pub(crate) fn handle(raw: u64, argument: &'static str) -> Result<PinId> {
    PinId::from_raw(raw).ok_or_else(|| Error::null_argument(argument))
}

/// # Safety
/// `ptr` must be null or a valid NUL-terminated string.
pub(crate) unsafe fn str_arg<'a>(ptr: *const c_char, argument: &'static str) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(Error::null_argument(argument));
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|_| Error::type_mismatch(Kind::String, Kind::Binary))
}

/// Like [`str_arg`], but null reads as the empty string
///
/// # Safety
/// `ptr` must be null or a valid NUL-terminated string.
pub(crate) unsafe fn opt_str_arg<'a>(ptr: *const c_char, argument: &'static str) -> Result<&'a str> {
    if ptr.is_null() {
        Ok("")
    } else {
        unsafe { str_arg(ptr, argument) }
    }
}

/// # Safety
/// `out` must be null or valid for a write of `T`.
pub(crate) unsafe fn write_out<T>(out: *mut T, value: T, argument: &'static str) -> Result<()> {
    if out.is_null() {
        return Err(Error::null_argument(argument));
    }
    unsafe { out.write(value) };
    Ok(())
}

// =============================================================================
// Context
// =============================================================================

/// Create a boundary context and install the process exit hook
///
/// Returns null on failure; the reason is available through the
/// `tether_status_*` accessors.
#[unsafe(no_mangle)]
pub extern "C" fn tether_init() -> *mut TetherContext {
    guard("tether_init", ptr::null_mut(), || {
        let ctx = Context::init()?;
        Ok(Box::into_raw(Box::new(ctx)))
    })
}

/// Sweep every object still pinned and free the context
///
/// # Safety
/// `ctx` must come from `tether_init` and must not be used afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_shutdown(ctx: *mut TetherContext) -> TetherCategory {
    status("tether_shutdown", || {
        if ctx.is_null() {
            return Err(Error::null_argument("ctx"));
        }
        let ctx = unsafe { Box::from_raw(ctx) };
        ctx.shutdown();
        Ok(())
    })
}

// =============================================================================
// Status accessors
// =============================================================================

/// Category of the last failure on this thread (`0` if none)
#[unsafe(no_mangle)]
pub extern "C" fn tether_status_category() -> TetherCategory {
    LAST_STATUS.with(|s| {
        s.borrow()
            .as_ref()
            .map(|status| status.category.code())
            .unwrap_or(0)
    })
}

/// Message of the last failure, or null
///
/// # WARNING: Pointer Lifetime
/// Valid until the next failing boundary call or `tether_status_clear` on
/// this thread. Copy it if you need to keep it.
#[unsafe(no_mangle)]
pub extern "C" fn tether_status_message() -> *const c_char {
    status_cstring(STATUS_MESSAGE, |s| s.message.clone())
}

/// Boundary function that reported the last failure, or null
#[unsafe(no_mangle)]
pub extern "C" fn tether_status_function() -> *const c_char {
    status_cstring(STATUS_FUNCTION, |s| s.source.function.to_string())
}

/// Source file where the last failure was raised, or null
#[unsafe(no_mangle)]
pub extern "C" fn tether_status_file() -> *const c_char {
    status_cstring(STATUS_FILE, |s| s.source.file.to_string())
}

/// Source line where the last failure was raised (`0` if none)
#[unsafe(no_mangle)]
pub extern "C" fn tether_status_line() -> u32 {
    LAST_STATUS.with(|s| s.borrow().as_ref().map(|st| st.source.line).unwrap_or(0))
}

/// `"<category>#<code> : <message>\nfrom <file>:<line>.<function>"`, or null
#[unsafe(no_mangle)]
pub extern "C" fn tether_status_format() -> *const c_char {
    status_cstring(STATUS_FORMATTED, |s| s.to_string())
}

#[unsafe(no_mangle)]
pub extern "C" fn tether_status_clear() {
    clear_last_status();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_records_failure() {
        clear_last_status();
        let code = status("tether_test_op", || Err(Error::null_argument("path")));
        assert_eq!(code, Category::NullOrEmptyArgument.code());

        let last = last_status().unwrap();
        assert_eq!(last.source.function, "tether_test_op");
        assert_eq!(last.message, "argument `path` is null or empty");
        assert_eq!(tether_status_category(), code);
        clear_last_status();
        assert_eq!(tether_status_category(), 0);
    }

    #[test]
    fn test_success_keeps_previous_status() {
        clear_last_status();
        status("tether_failing", || Err(Error::execution("boom")));
        let code = status("tether_ok", || Ok(()));
        assert_eq!(code, 0);
        assert_eq!(last_status().unwrap().source.function, "tether_failing");
        clear_last_status();
    }

    #[test]
    fn test_panic_is_promoted() {
        clear_last_status();
        let value = guard("tether_panicky", -1i64, || panic!("kaboom"));
        assert_eq!(value, -1);

        let last = last_status().unwrap();
        assert_eq!(last.category, Category::PromotedNativeException);
        assert_eq!(last.message, "native panic: kaboom");
        assert_eq!(last.source.function, "tether_panicky");
        clear_last_status();
    }

    #[test]
    fn test_status_strings() {
        clear_last_status();
        assert!(tether_status_message().is_null());

        status("tether_fmt", || Err(Error::execution("bad\0input")));
        let message = unsafe { CStr::from_ptr(tether_status_message()) };
        assert_eq!(message.to_str().unwrap(), "bad?input");

        let function = unsafe { CStr::from_ptr(tether_status_function()) };
        assert_eq!(function.to_str().unwrap(), "tether_fmt");

        let formatted = unsafe { CStr::from_ptr(tether_status_format()) };
        let formatted = formatted.to_str().unwrap();
        assert!(formatted.starts_with("execution error#8 : bad?input\nfrom "));
        assert!(formatted.ends_with(".tether_fmt"));
        assert!(tether_status_line() > 0);
        tether_status_clear();
    }

    #[test]
    fn test_null_handle() {
        let err = handle(0, "value").unwrap_err();
        assert_eq!(err.category(), Category::NullOrEmptyArgument);
    }

    #[test]
    fn test_init_and_shutdown() {
        let ctx = tether_init();
        assert!(!ctx.is_null());
        assert_eq!(unsafe { tether_shutdown(ctx) }, 0);
        assert_eq!(
            unsafe { tether_shutdown(ptr::null_mut()) },
            Category::NullOrEmptyArgument.code()
        );
    }
}
