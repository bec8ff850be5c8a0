//! Boundary context: owner of every object handed across the C ABI
//!
//! A [`Context`] holds one pin arena. Objects created through the boundary
//! (values, vectors, tables, managers) are pinned there and addressed by
//! [`PinId`]. The arena is swept exactly once: on [`Context::shutdown`], when
//! the context is dropped, or from the process exit hook if the host never
//! shuts down.
//!
//! The arena lock is only held for bookkeeping and short copies, never while
//! a script runs, so native callbacks are free to pin objects.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, RwLock, Weak};
use tether_core::{
    ArenaStats, Error, ErrorKind, Origin, PinArena, PinId, Pinnable, Result, SweepSummary, Table,
    Value, Vector,
};

use crate::manager::SessionManager;
use crate::report::{self, SweepReport, SweepTrigger};

/// Anything a boundary handle can name
pub enum BoundaryObject {
    Value(Value),
    Vector(Vector),
    Table(Table),
    Manager(Arc<RwLock<SessionManager>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Value,
    Vector,
    Table,
    Manager,
}

impl BoundaryObject {
    pub fn kind(&self) -> ObjectKind {
        match self {
            BoundaryObject::Value(_) => ObjectKind::Value,
            BoundaryObject::Vector(_) => ObjectKind::Vector,
            BoundaryObject::Table(_) => ObjectKind::Table,
            BoundaryObject::Manager(_) => ObjectKind::Manager,
        }
    }
}

impl Pinnable for BoundaryObject {
    fn label(&self) -> &'static str {
        match self {
            BoundaryObject::Value(_) => "value",
            BoundaryObject::Vector(_) => "vector",
            BoundaryObject::Table(_) => "table",
            BoundaryObject::Manager(_) => "manager",
        }
    }
}

type SharedArena = Arc<Mutex<PinArena<BoundaryObject>>>;

// =============================================================================
// Process exit hook
// =============================================================================

/// Arenas of every live context, swept by the exit hook
static LIVE_ARENAS: Mutex<Vec<Weak<Mutex<PinArena<BoundaryObject>>>>> = Mutex::new(Vec::new());

/// Outcome of the one-time `atexit` registration
static EXIT_HOOK: OnceLock<bool> = OnceLock::new();

extern "C" fn sweep_at_exit() {
    // Nothing may unwind out of an atexit handler
    let _ = std::panic::catch_unwind(|| {
        let arenas = std::mem::take(&mut *LIVE_ARENAS.lock().unwrap_or_else(PoisonError::into_inner));
        for arena in arenas.iter().filter_map(Weak::upgrade) {
            sweep(&arena, SweepTrigger::ProcessExit);
        }
    });
}

fn install_exit_hook() -> Result<()> {
    let installed = *EXIT_HOOK.get_or_init(|| {
        // SAFETY: `sweep_at_exit` takes no arguments and never unwinds
        let rc = unsafe { libc::atexit(sweep_at_exit) };
        rc == 0
    });
    if installed {
        Ok(())
    } else {
        tracing::error!("could not register the process exit hook");
        Err(Error::new(ErrorKind::Init {
            message: "atexit registration failed".to_string(),
        }))
    }
}

fn sweep(arena: &Mutex<PinArena<BoundaryObject>>, trigger: SweepTrigger) -> SweepSummary {
    let mut guard = arena.lock().unwrap_or_else(PoisonError::into_inner);
    if guard.is_swept() {
        return SweepSummary::default();
    }
    let summary = guard.finalize();
    let stats = guard.stats();
    drop(guard);

    if !summary.is_empty() {
        tracing::debug!(
            reclaimed = summary.total(),
            trigger = trigger.as_str(),
            "swept leaked boundary objects"
        );
    }
    report::emit(&SweepReport {
        trigger,
        summary,
        stats,
    });
    summary
}

// =============================================================================
// Context
// =============================================================================

pub struct Context {
    arena: SharedArena,
}

impl Context {
    /// Create a context, installing the process exit hook on first use
    ///
    /// Failing to install the hook is fatal: without it leaked objects could
    /// outlive the process teardown unswept.
    pub fn init() -> Result<Context> {
        install_exit_hook()?;

        let arena: SharedArena = Arc::new(Mutex::new(PinArena::new()));
        let mut live = LIVE_ARENAS.lock().unwrap_or_else(PoisonError::into_inner);
        live.retain(|weak| weak.strong_count() > 0);
        live.push(Arc::downgrade(&arena));
        drop(live);

        tracing::debug!("boundary context initialized");
        Ok(Context { arena })
    }

    /// Sweep every object still pinned. Idempotent: later calls (and the
    /// exit hook) find nothing left to do.
    pub fn shutdown(&self) -> SweepSummary {
        sweep(&self.arena, SweepTrigger::Shutdown)
    }

    pub fn is_shut_down(&self) -> bool {
        self.lock().is_swept()
    }

    /// Sweep for a context dropped without `shutdown`; `None` if it was
    /// already shut down
    fn sweep_on_drop(&self) -> Option<SweepSummary> {
        if self.is_shut_down() {
            return None;
        }
        let summary = sweep(&self.arena, SweepTrigger::Drop);
        tracing::warn!(
            reclaimed = summary.total(),
            "boundary context dropped without shutdown"
        );
        Some(summary)
    }

    fn lock(&self) -> MutexGuard<'_, PinArena<BoundaryObject>> {
        self.arena.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[track_caller]
    pub fn pin(&self, object: BoundaryObject, origin: Origin) -> Result<PinId> {
        let mut arena = self.lock();
        if arena.is_swept() {
            return Err(Error::new(ErrorKind::NotInitialized));
        }
        arena.pin(object, origin)
    }

    #[track_caller]
    pub fn pin_value(&self, value: Value, origin: Origin) -> Result<PinId> {
        self.pin(BoundaryObject::Value(value), origin)
    }

    #[track_caller]
    pub fn pin_vector(&self, vector: Vector, origin: Origin) -> Result<PinId> {
        self.pin(BoundaryObject::Vector(vector), origin)
    }

    #[track_caller]
    pub fn pin_table(&self, table: Table, origin: Origin) -> Result<PinId> {
        self.pin(BoundaryObject::Table(table), origin)
    }

    #[track_caller]
    pub fn pin_manager(&self, manager: SessionManager) -> Result<PinId> {
        self.pin(
            BoundaryObject::Manager(Arc::new(RwLock::new(manager))),
            Origin::BoundaryNew,
        )
    }

    /// Free any boundary object. Idempotent: `false` if nothing was freed.
    pub fn release(&self, id: PinId) -> bool {
        // Dropped after the arena lock is released
        let object = self.lock().unpin(id);
        object.is_some()
    }

    /// Free an object that must be of `kind`
    ///
    /// A dead handle is a no-op; a live handle of another kind is an error.
    #[track_caller]
    pub fn release_as(&self, id: PinId, kind: ObjectKind) -> Result<bool> {
        let object = {
            let mut arena = self.lock();
            match arena.get(id) {
                Ok(object) if object.kind() != kind => {
                    return Err(Error::invalid_handle(id.to_raw()));
                }
                Ok(_) => arena.unpin(id),
                Err(_) => None,
            }
        };
        Ok(object.is_some())
    }

    /// Take an object out of the arena, marking its handle freed
    pub fn unpin(&self, id: PinId) -> Option<BoundaryObject> {
        self.lock().unpin(id)
    }

    pub fn kind_of(&self, id: PinId) -> Option<ObjectKind> {
        self.lock().get(id).ok().map(BoundaryObject::kind)
    }

    /// Run `f` on a pinned Value
    #[track_caller]
    pub fn with_value<R>(&self, id: PinId, f: impl FnOnce(&mut Value) -> Result<R>) -> Result<R> {
        let mut arena = self.lock();
        match arena.get_mut(id)? {
            BoundaryObject::Value(value) => f(value),
            _ => Err(Error::invalid_handle(id.to_raw())),
        }
    }

    /// Run `f` on a pinned Vector
    #[track_caller]
    pub fn with_vector<R>(
        &self,
        id: PinId,
        f: impl FnOnce(&mut Vector) -> Result<R>,
    ) -> Result<R> {
        let mut arena = self.lock();
        match arena.get_mut(id)? {
            BoundaryObject::Vector(vector) => f(vector),
            _ => Err(Error::invalid_handle(id.to_raw())),
        }
    }

    /// Run `f` on a pinned Table
    #[track_caller]
    pub fn with_table<R>(&self, id: PinId, f: impl FnOnce(&mut Table) -> Result<R>) -> Result<R> {
        let mut arena = self.lock();
        match arena.get_mut(id)? {
            BoundaryObject::Table(table) => f(table),
            _ => Err(Error::invalid_handle(id.to_raw())),
        }
    }

    /// Shared handle to a pinned manager, usable without the arena lock
    #[track_caller]
    pub fn manager(&self, id: PinId) -> Result<Arc<RwLock<SessionManager>>> {
        match self.lock().get(id)? {
            BoundaryObject::Manager(manager) => Ok(Arc::clone(manager)),
            _ => Err(Error::invalid_handle(id.to_raw())),
        }
    }

    /// Number of objects currently pinned
    pub fn live(&self) -> usize {
        self.lock().live()
    }

    pub fn stats(&self) -> ArenaStats {
        self.lock().stats()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.sweep_on_drop();
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("stats", &self.stats())
            .finish()
    }
}
