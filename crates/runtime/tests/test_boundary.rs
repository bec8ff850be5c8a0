//! Integration tests for the flat C ABI
//!
//! These call the exported `tether_*` functions exactly as a C host would,
//! including a host callback written as an `extern "C"` function.

use serial_test::serial;
use std::ffi::{CStr, CString, c_void};
use std::ptr;
use tether_runtime::ffi::manager::*;
use tether_runtime::ffi::session::*;
use tether_runtime::ffi::table::*;
use tether_runtime::ffi::value::*;
use tether_runtime::ffi::vector::*;
use tether_runtime::ffi::{
    TetherCategory, TetherContext, tether_init, tether_shutdown, tether_status_category,
    tether_status_format, tether_status_function, tether_status_message,
};
use tether_runtime::{Category, Context, Origin, Value};

fn cstr(s: &str) -> CString {
    CString::new(s).unwrap()
}

unsafe extern "C" fn multiply(
    ctx: *const TetherContext,
    args: u64,
    out: u64,
    _user_data: *mut c_void,
) -> TetherCategory {
    unsafe {
        let mut product = 1i64;
        let mut size = 0u64;
        tether_vector_size(ctx, args, &mut size);
        for i in 0..size as i64 {
            let element = tether_value_new(ctx);
            let code = tether_vector_at_const(ctx, args, i, element);
            if code != 0 {
                return code;
            }
            let mut n = 0i64;
            let code = tether_value_as_int(ctx, element, &mut n);
            tether_value_delete(ctx, element);
            if code != 0 {
                return code;
            }
            product *= n;
        }
        let result = tether_value_new(ctx);
        tether_value_set_int(ctx, result, product);
        let code = tether_vector_append(ctx, out, result);
        tether_value_delete(ctx, result);
        code
    }
}

#[test]
#[serial]
fn test_hello_world_flow() {
    unsafe {
        let ctx = tether_init();
        assert!(!ctx.is_null());
        let m = tether_manager_new(ctx);
        let uid = tether_manager_new_session(ctx, m, true);
        assert!(tether_manager_is_valid(ctx, m, uid));

        let src = cstr("greeting = 'hello world'");
        assert_eq!(tether_session_load(ctx, m, uid, src.as_ptr(), false), 0);

        assert_eq!(tether_manager_delete(ctx, m), 0);
        assert_eq!(tether_shutdown(ctx), 0);
    }
}

#[test]
#[serial]
fn test_release_twice_equals_once() {
    let ctx = Context::init().unwrap();
    unsafe {
        let v = tether_value_new(&ctx);
        let vec = tether_vector_new(&ctx);
        let table = tether_table_new(&ctx);
        let m = tether_manager_new(&ctx);
        assert_eq!(ctx.live(), 4);

        for _ in 0..2 {
            assert_eq!(tether_value_delete(&ctx, v), 0);
            assert_eq!(tether_vector_delete(&ctx, vec), 0);
            assert_eq!(tether_table_delete(&ctx, table), 0);
            assert_eq!(tether_manager_delete(&ctx, m), 0);
        }
    }
    assert_eq!(ctx.live(), 0);
    assert_eq!(ctx.stats().released_explicitly, 4);
}

#[test]
#[serial]
fn test_shutdown_sweeps_leaks() {
    let ctx = Context::init().unwrap();
    unsafe {
        tether_value_new(&ctx);
        tether_table_new(&ctx);
        let m = tether_manager_new(&ctx);
        tether_manager_new_session(&ctx, m, true);
    }
    let summary = ctx.shutdown();
    assert_eq!(summary.total(), 3);
    assert_eq!(summary.reclaimed.boundary_new, 3);
    assert_eq!(ctx.live(), 0);

    assert!(ctx.shutdown().is_empty());
    let err = ctx.pin_value(Value::nil(), Origin::BoundaryNew).unwrap_err();
    assert_eq!(err.category(), Category::GenericError);
}

#[test]
#[serial]
fn test_host_callback_isolated_per_session() {
    let ctx = Context::init().unwrap();
    unsafe {
        let m = tether_manager_new(&ctx);
        let a = tether_manager_new_session(&ctx, m, true);
        let b = tether_manager_new_session(&ctx, m, true);

        assert_eq!(
            tether_session_push_callback(
                &ctx,
                m,
                a,
                cstr("mul").as_ptr(),
                cstr("ns").as_ptr(),
                Some(multiply),
                ptr::null_mut(),
            ),
            0
        );

        let args = tether_vector_new(&ctx);
        for n in [2, 3, 7] {
            let v = tether_value_new(&ctx);
            tether_value_set_int(&ctx, v, n);
            tether_vector_append(&ctx, args, v);
            tether_value_delete(&ctx, v);
        }

        let mut results = 0u64;
        let path = cstr("ns.mul");
        assert_eq!(
            tether_session_call(&ctx, m, a, path.as_ptr(), args, &mut results),
            0
        );
        let first = tether_value_new(&ctx);
        tether_vector_at_const(&ctx, results, 0, first);
        let mut n = 0i64;
        tether_value_as_int(&ctx, first, &mut n);
        assert_eq!(n, 42);

        assert!(tether_session_has_method(&ctx, m, a, path.as_ptr()));
        assert!(!tether_session_has_method(&ctx, m, b, path.as_ptr()));
        let mut unused = 0u64;
        assert_eq!(
            tether_session_call(&ctx, m, b, path.as_ptr(), args, &mut unused),
            Category::NotATable.code()
        );
    }
}

#[test]
#[serial]
fn test_status_accessors_describe_failure() {
    let ctx = Context::init().unwrap();
    unsafe {
        let m = tether_manager_new(&ctx);
        let uid = tether_manager_new_session(&ctx, m, true);
        let src = cstr("this is not lua");
        let code = tether_session_load(&ctx, m, uid, src.as_ptr(), false);
        assert_eq!(code, Category::ExecutionError.code());
        assert_eq!(tether_status_category(), code);

        let function = CStr::from_ptr(tether_status_function()).to_str().unwrap();
        assert_eq!(function, "tether_session_load");
        let message = CStr::from_ptr(tether_status_message()).to_str().unwrap();
        assert!(!message.is_empty());
        let formatted = CStr::from_ptr(tether_status_format()).to_str().unwrap();
        assert!(formatted.starts_with("execution error"), "{}", formatted);
    }
}

#[test]
#[serial]
fn test_reentrant_session_is_busy() {
    unsafe extern "C" fn reenter(
        ctx: *const TetherContext,
        _args: u64,
        _out: u64,
        user_data: *mut c_void,
    ) -> TetherCategory {
        unsafe {
            let ids = &*(user_data as *const (u64, u64));
            let src = CString::new("x = 1").unwrap();
            tether_session_run(ctx, ids.0, ids.1, src.as_ptr(), false)
        }
    }

    let ctx = Context::init().unwrap();
    unsafe {
        let m = tether_manager_new(&ctx);
        let uid = tether_manager_new_session(&ctx, m, true);
        let mut ids = (m, uid);
        tether_session_push_callback(
            &ctx,
            m,
            uid,
            cstr("reenter").as_ptr(),
            ptr::null(),
            Some(reenter),
            &mut ids as *mut (u64, u64) as *mut c_void,
        );
        let mut results = 0u64;
        let code = tether_session_call(&ctx, m, uid, cstr("reenter").as_ptr(), 0, &mut results);
        assert_eq!(code, Category::SdkException.code());
        let message = CStr::from_ptr(tether_status_message()).to_str().unwrap();
        assert!(message.contains("already in use"), "{}", message);
    }
}
