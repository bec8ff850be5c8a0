//! Session manager handles

use std::sync::PoisonError;

use super::{TetherCategory, TetherContext, context, guard, handle, status};
use crate::context::ObjectKind;
use crate::manager::SessionManager;

/// Create a manager. Returns `0` on failure.
///
/// # Safety
/// `ctx` must be a live context from `tether_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_manager_new(ctx: *const TetherContext) -> u64 {
    guard("tether_manager_new", 0, || {
        let ctx = unsafe { context(ctx) }?;
        Ok(ctx.pin_manager(SessionManager::new())?.to_raw())
    })
}

/// Free a manager and close every session it still owns
///
/// # Safety
/// `ctx` must be a live context from `tether_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_manager_delete(
    ctx: *const TetherContext,
    manager: u64,
) -> TetherCategory {
    status("tether_manager_delete", || {
        let ctx = unsafe { context(ctx) }?;
        ctx.release_as(handle(manager, "manager")?, ObjectKind::Manager)?;
        Ok(())
    })
}

/// Create a session and return its UID, or `0` on failure
///
/// # Safety
/// `ctx` must be a live context from `tether_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_manager_new_session(
    ctx: *const TetherContext,
    manager: u64,
    with_stdlib: bool,
) -> u64 {
    guard("tether_manager_new_session", 0, || {
        let ctx = unsafe { context(ctx) }?;
        let manager = ctx.manager(handle(manager, "manager")?)?;
        let mut manager = manager.write().unwrap_or_else(PoisonError::into_inner);
        let options = crate::config::SessionOptions::new().with_stdlib(with_stdlib);
        manager.new_session_with(options)
    })
}

/// Delete a session; an unknown UID is a no-op
///
/// # Safety
/// `ctx` must be a live context from `tether_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_manager_delete_session(
    ctx: *const TetherContext,
    manager: u64,
    uid: u64,
) -> TetherCategory {
    status("tether_manager_delete_session", || {
        let ctx = unsafe { context(ctx) }?;
        let manager = ctx.manager(handle(manager, "manager")?)?;
        manager
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .delete_session(uid);
        Ok(())
    })
}

/// # Safety
/// `ctx` must be a live context from `tether_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_manager_is_valid(
    ctx: *const TetherContext,
    manager: u64,
    uid: u64,
) -> bool {
    guard("tether_manager_is_valid", false, || {
        let ctx = unsafe { context(ctx) }?;
        let manager = ctx.manager(handle(manager, "manager")?)?;
        let valid = manager
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_valid(uid);
        Ok(valid)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::ffi::value::tether_value_new;
    use serial_test::serial;
    use tether_core::Category;

    #[test]
    #[serial]
    fn test_session_lifecycle() {
        let ctx = Context::init().unwrap();
        unsafe {
            let m = tether_manager_new(&ctx);
            assert_ne!(m, 0);
            let uid = tether_manager_new_session(&ctx, m, true);
            assert_ne!(uid, 0);
            assert!(tether_manager_is_valid(&ctx, m, uid));

            assert_eq!(tether_manager_delete_session(&ctx, m, uid), 0);
            assert!(!tether_manager_is_valid(&ctx, m, uid));
            assert_eq!(tether_manager_delete_session(&ctx, m, uid), 0);
            assert_eq!(tether_manager_delete(&ctx, m), 0);
        }
        assert_eq!(ctx.live(), 0);
    }

    #[test]
    #[serial]
    fn test_value_handle_is_not_a_manager() {
        let ctx = Context::init().unwrap();
        unsafe {
            let v = tether_value_new(&ctx);
            assert_eq!(tether_manager_new_session(&ctx, v, true), 0);
            assert!(!tether_manager_is_valid(&ctx, v, 1));
            assert_eq!(
                tether_manager_delete(&ctx, v),
                Category::InvalidPointer.code()
            );
        }
    }
}
