//! Interpreter session: one Lua runtime plus its native callbacks
//!
//! ```text
//! Uninitialized --load ok--> Loaded --close--> Closed
//! ```
//!
//! A failed `load` leaves the state where it was. Once closed, every
//! operation except `good`, `state` and `close` fails with `SessionClosed`.

use mlua::{Lua, LuaOptions, StdLib, Value as LuaValue};
use std::io::ErrorKind as IoErrorKind;
use std::sync::{Arc, Mutex, PoisonError};
use tether_core::{Error, ErrorKind, Result, Value, Vector};

use crate::callback::{self, CallbackRegistry, NativeCallback, SharedRegistry};
use crate::codec::{self, lua_error};
use crate::config::SessionOptions;
use crate::path::{self, DottedPath};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Loaded,
    Closed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Loaded => "loaded",
            SessionState::Closed => "closed",
        }
    }
}

pub struct Session {
    lua: Option<Lua>,
    callbacks: SharedRegistry,
    state: SessionState,
    options: SessionOptions,
}

impl Session {
    /// Create a runtime configured by `options`
    pub fn new(options: SessionOptions) -> Result<Session> {
        let lua = if options.stdlib {
            Lua::new()
        } else {
            Lua::new_with(StdLib::NONE, LuaOptions::new()).map_err(|e| lua_error(&e))?
        };
        if let Some(limit) = options.memory_limit {
            lua.set_memory_limit(limit).map_err(|e| lua_error(&e))?;
        }

        Ok(Session {
            lua: Some(lua),
            callbacks: Arc::new(Mutex::new(CallbackRegistry::new())),
            state: SessionState::Uninitialized,
            options,
        })
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The runtime is live (the session has not been closed)
    pub fn good(&self) -> bool {
        self.lua.is_some()
    }

    #[track_caller]
    fn runtime(&self) -> Result<&Lua> {
        self.lua
            .as_ref()
            .ok_or_else(|| Error::new(ErrorKind::SessionClosed))
    }

    /// Source bytes and chunk name for `source`
    fn chunk(&self, source: &str, is_file: bool) -> Result<(Vec<u8>, String)> {
        if source.is_empty() {
            return Err(Error::null_argument("source"));
        }
        if !is_file {
            return Ok((
                source.as_bytes().to_vec(),
                format!("={}", self.options.chunk_name),
            ));
        }
        match std::fs::read(source) {
            Ok(bytes) => Ok((bytes, format!("@{}", source))),
            Err(e) if e.kind() == IoErrorKind::NotFound => Err(Error::new(ErrorKind::FileNotFound {
                path: source.to_string(),
            })),
            Err(e) => Err(e.into()),
        }
    }

    /// Compile and execute a chunk; on success the session is `Loaded`
    pub fn load(&mut self, source: &str, is_file: bool) -> Result<()> {
        let lua = self.runtime()?;
        let (bytes, name) = self.chunk(source, is_file)?;
        lua.load(bytes)
            .set_name(name)
            .exec()
            .map_err(|e| lua_error(&e))?;

        if self.state == SessionState::Uninitialized {
            tracing::debug!("session loaded");
        }
        self.state = SessionState::Loaded;
        Ok(())
    }

    /// Execute a chunk without changing state
    pub fn run(&self, source: &str, is_file: bool) -> Result<()> {
        let lua = self.runtime()?;
        let (bytes, name) = self.chunk(source, is_file)?;
        lua.load(bytes)
            .set_name(name)
            .exec()
            .map_err(|e| lua_error(&e))
    }

    /// Compile a chunk without executing it
    pub fn check(&self, source: &str, is_file: bool) -> Result<()> {
        let lua = self.runtime()?;
        let (bytes, name) = self.chunk(source, is_file)?;
        lua.load(bytes)
            .set_name(name)
            .into_function()
            .map(|_| ())
            .map_err(|e| lua_error(&e))
    }

    /// Call the function at a dotted `path`
    pub fn call(&self, path: &str, args: &Vector) -> Result<Vector> {
        let lua = self.runtime()?;
        codec::call(lua, self.options.encoding, path, args)
    }

    /// Assign `value` to a dotted global path, creating missing tables
    pub fn push_value(&self, path: &str, value: &Value) -> Result<()> {
        let lua = self.runtime()?;
        let parsed = DottedPath::parse(path)?;
        let parent = path::ensure_parent(lua, &parsed)?;
        let pushed = codec::push(lua, value, self.options.encoding)?;
        parent
            .set(parsed.last(), pushed)
            .map_err(|e| lua_error(&e))
    }

    /// Read a dotted global path; an absent final field reads as Nil
    pub fn get_value(&self, path: &str) -> Result<Value> {
        let lua = self.runtime()?;
        let parsed = DottedPath::parse(path)?;
        let parent = path::parent_table(lua, &parsed)?;
        let field = parent
            .get::<LuaValue>(parsed.last())
            .map_err(|e| lua_error(&e))?;
        codec::read(&field)
    }

    /// Register a native callback as `namespace.name` (or global `name` when
    /// `namespace` is empty). Returns the fully-qualified name.
    pub fn push_callback<F>(&self, name: &str, namespace: &str, callback: F) -> Result<String>
    where
        F: Fn(&Vector) -> Result<Vector> + Send + Sync + 'static,
    {
        self.push_native_callback(name, namespace, Arc::new(callback))
    }

    pub fn push_native_callback(
        &self,
        name: &str,
        namespace: &str,
        callback: NativeCallback,
    ) -> Result<String> {
        let lua = self.runtime()?;
        callback::register_callback(
            lua,
            &self.callbacks,
            self.options.encoding,
            name,
            namespace,
            callback,
        )
    }

    /// Unregister a callback by fully-qualified name
    pub fn remove_callback(&self, fq_name: &str) -> Result<bool> {
        let lua = self.runtime()?;
        callback::remove_callback(lua, &self.callbacks, fq_name)
    }

    /// Fully-qualified names of the registered callbacks, sorted
    pub fn callbacks(&self) -> Vec<String> {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .names()
    }

    /// A function exists at `path`
    ///
    /// Fails with `SessionClosed` once closed; an absent or ill-formed path
    /// is `Ok(false)`.
    pub fn has_method(&self, path: &str) -> Result<bool> {
        let lua = self.runtime()?;
        Ok(path::resolve(lua, path).is_ok())
    }

    /// Drop the runtime and every registered callback. Idempotent.
    pub fn close(&mut self) {
        if let Some(lua) = self.lua.take() {
            self.callbacks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
            drop(lua);
            self.state = SessionState::Closed;
            tracing::debug!("session closed");
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("callbacks", &self.callbacks())
            .field("options", &self.options)
            .finish()
    }
}
