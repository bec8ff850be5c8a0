//! Native callbacks exposed to scripts
//!
//! Each session owns one [`CallbackRegistry`]. The Lua binding installed for
//! a callback is a trampoline that captures only that registry and the
//! callback's fully-qualified name, so a callback registered on one session
//! can never be reached from another.
//!
//! The trampoline looks the callback up at invocation time and releases the
//! registry lock before running it, so a callback may register or remove
//! callbacks itself.

use mlua::{Lua, MultiValue};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tether_core::{Error, ErrorKind, Result, Vector};

use crate::codec::{self, Encoding, lua_error};
use crate::path::{self, DottedPath};

/// A native function callable from scripts
pub type NativeCallback = Arc<dyn Fn(&Vector) -> Result<Vector> + Send + Sync>;

/// Callbacks of one session, keyed by fully-qualified name
#[derive(Default)]
pub struct CallbackRegistry {
    callbacks: HashMap<String, NativeCallback>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: String, callback: NativeCallback) {
        self.callbacks.insert(name, callback);
    }

    pub fn get(&self, name: &str) -> Option<NativeCallback> {
        self.callbacks.get(name).cloned()
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.callbacks.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.callbacks.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.callbacks.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub fn clear(&mut self) {
        self.callbacks.clear();
    }
}

/// Shared handle to a session's registry
pub type SharedRegistry = Arc<Mutex<CallbackRegistry>>;

/// `namespace.name`, or `name` when the namespace is empty
pub fn qualified_name(name: &str, namespace: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", namespace, name)
    }
}

/// Register `callback` as `namespace.name` (or global `name`)
///
/// Missing namespace levels are created. Returns the fully-qualified name.
pub fn register_callback(
    lua: &Lua,
    registry: &SharedRegistry,
    encoding: Encoding,
    name: &str,
    namespace: &str,
    callback: NativeCallback,
) -> Result<String> {
    if name.is_empty() {
        return Err(Error::null_argument("name"));
    }
    if name.contains('.') {
        return Err(Error::new(ErrorKind::IllFormedPath {
            path: name.to_string(),
            reason: "callback name must be a single segment",
        }));
    }

    let target = if namespace.is_empty() {
        lua.globals()
    } else {
        path::ensure_table(lua, &DottedPath::parse(namespace)?)?
    };

    let fq_name = qualified_name(name, namespace);
    registry
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(fq_name.clone(), callback);

    let trampoline = {
        let registry = Arc::clone(registry);
        let fq_name = fq_name.clone();
        lua.create_function(move |lua, args: MultiValue| {
            invoke(lua, &registry, encoding, &fq_name, &args)
        })
        .map_err(|e| lua_error(&e))?
    };
    target.set(name, trampoline).map_err(|e| lua_error(&e))?;

    tracing::debug!(callback = %fq_name, "registered native callback");
    Ok(fq_name)
}

fn invoke(
    lua: &Lua,
    registry: &SharedRegistry,
    encoding: Encoding,
    fq_name: &str,
    args: &MultiValue,
) -> mlua::Result<MultiValue> {
    // Clone out and drop the guard before running user code
    let callback = registry
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(fq_name);
    let Some(callback) = callback else {
        return Err(mlua::Error::RuntimeError(format!(
            "native callback `{}` is no longer registered",
            fq_name
        )));
    };

    let args = codec::read_all(args).map_err(mlua::Error::external)?;
    let results = callback(&args).map_err(mlua::Error::external)?;
    codec::push_all(lua, &results, encoding).map_err(mlua::Error::external)
}

/// Unregister `fq_name` and clear its script binding
///
/// Returns whether a callback was registered under that name.
pub fn remove_callback(lua: &Lua, registry: &SharedRegistry, fq_name: &str) -> Result<bool> {
    let parsed = DottedPath::parse(fq_name)?;
    let removed = registry
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(fq_name);
    if removed {
        // The namespace may have been replaced by a script since registration
        if let Ok(parent) = path::parent_table(lua, &parsed) {
            parent
                .set(parsed.last(), mlua::Value::Nil)
                .map_err(|e| lua_error(&e))?;
        }
        tracing::debug!(callback = fq_name, "removed native callback");
    }
    Ok(removed)
}
