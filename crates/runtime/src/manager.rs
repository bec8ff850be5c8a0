//! Session manager: many independent sessions behind opaque UIDs
//!
//! UIDs come from one process-wide counter, so they are unique across every
//! manager for the life of the process and are never reused. `0` is never a
//! valid UID.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use tether_core::{Error, ErrorKind, Result};

use crate::config::SessionOptions;
use crate::session::Session;

/// Next UID to hand out
static NEXT_SESSION_UID: AtomicU64 = AtomicU64::new(1);

/// Shared, lockable reference to one session
#[derive(Clone)]
pub struct SessionHandle {
    uid: u64,
    inner: Arc<Mutex<Session>>,
}

impl SessionHandle {
    pub fn uid(&self) -> u64 {
        self.uid
    }

    /// Block until the session is free
    pub fn lock(&self) -> MutexGuard<'_, Session> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail with `SessionBusy` instead of waiting (or deadlocking when a
    /// callback re-enters its own session)
    #[track_caller]
    pub fn try_lock(&self) -> Result<MutexGuard<'_, Session>> {
        match self.inner.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => Err(Error::new(ErrorKind::SessionBusy)),
        }
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("uid", &self.uid)
            .finish()
    }
}

#[derive(Default)]
pub struct SessionManager {
    sessions: HashMap<u64, SessionHandle>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session with default options and the given stdlib choice
    ///
    /// Returns `0` (never a valid UID) if the runtime could not be created.
    pub fn new_session(&mut self, with_standard_library: bool) -> u64 {
        let options = SessionOptions::new().with_stdlib(with_standard_library);
        match self.new_session_with(options) {
            Ok(uid) => uid,
            Err(e) => {
                tracing::error!(error = %e, "could not create session");
                0
            }
        }
    }

    pub fn new_session_with(&mut self, options: SessionOptions) -> Result<u64> {
        let session = Session::new(options)?;
        let uid = NEXT_SESSION_UID.fetch_add(1, Ordering::Relaxed);
        self.sessions.insert(
            uid,
            SessionHandle {
                uid,
                inner: Arc::new(Mutex::new(session)),
            },
        );
        tracing::debug!(uid, "session created");
        Ok(uid)
    }

    /// Remove and close a session. Returns whether one was registered.
    pub fn delete_session(&mut self, uid: u64) -> bool {
        match self.sessions.remove(&uid) {
            Some(handle) => {
                handle.lock().close();
                tracing::debug!(uid, "session deleted");
                true
            }
            None => false,
        }
    }

    pub fn is_valid(&self, uid: u64) -> bool {
        self.sessions.contains_key(&uid)
    }

    /// Handle to a live session, or `InvalidSession`
    #[track_caller]
    pub fn get(&self, uid: u64) -> Result<SessionHandle> {
        match self.sessions.get(&uid) {
            Some(handle) => Ok(handle.clone()),
            None => {
                tracing::warn!(uid, "lookup of invalid session UID");
                Err(Error::new(ErrorKind::InvalidSession { uid }))
            }
        }
    }

    /// Lock a session and run `f` on it
    pub fn with_session<R>(&self, uid: u64, f: impl FnOnce(&mut Session) -> Result<R>) -> Result<R> {
        let handle = self.get(uid)?;
        let mut session = handle.lock();
        f(&mut session)
    }

    /// Registered UIDs in ascending order
    pub fn uids(&self) -> Vec<u64> {
        let mut uids: Vec<u64> = self.sessions.keys().copied().collect();
        uids.sort_unstable();
        uids
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        let count = self.sessions.len();
        for (_, handle) in self.sessions.drain() {
            handle.lock().close();
        }
        if count > 0 {
            tracing::debug!(count, "session manager closed remaining sessions");
        }
    }
}
