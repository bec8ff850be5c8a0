//! Dotted global paths (`"a.b.c"`)
//!
//! A path names a field reachable from the globals table by successive table
//! lookups. Resolution never creates anything unless asked to
//! ([`ensure_table`]).

use mlua::{Function, Lua, Table as LuaTable, Value as LuaValue};
use tether_core::{Error, ErrorKind, Result};

use crate::codec::lua_error;

/// A parsed, non-empty dotted path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DottedPath<'a> {
    raw: &'a str,
    segments: Vec<&'a str>,
}

impl<'a> DottedPath<'a> {
    /// Split on `.`; an empty path or an empty segment is ill-formed
    #[track_caller]
    pub fn parse(raw: &'a str) -> Result<Self> {
        if raw.is_empty() {
            return Err(Error::new(ErrorKind::IllFormedPath {
                path: raw.to_string(),
                reason: "path is empty",
            }));
        }
        let segments: Vec<&str> = raw.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(Error::new(ErrorKind::IllFormedPath {
                path: raw.to_string(),
                reason: "path has an empty segment",
            }));
        }
        Ok(DottedPath { raw, segments })
    }

    pub fn as_str(&self) -> &'a str {
        self.raw
    }

    pub fn segments(&self) -> &[&'a str] {
        &self.segments
    }

    /// Every segment but the last
    pub fn parents(&self) -> &[&'a str] {
        &self.segments[..self.segments.len() - 1]
    }

    pub fn last(&self) -> &'a str {
        self.segments[self.segments.len() - 1]
    }

    fn not_a_table(&self, segment: &str) -> Error {
        Error::new(ErrorKind::NotATable {
            path: self.raw.to_string(),
            segment: segment.to_string(),
        })
    }
}

/// Walk `path.parents()` from the globals table, returning the table that
/// holds the final segment
pub fn parent_table(lua: &Lua, path: &DottedPath<'_>) -> Result<LuaTable> {
    let mut current = lua.globals();
    for segment in path.parents() {
        match current.get::<LuaValue>(*segment).map_err(|e| lua_error(&e))? {
            LuaValue::Table(next) => current = next,
            _ => return Err(path.not_a_table(segment)),
        }
    }
    Ok(current)
}

/// Resolve `path` to a function without invoking it
pub fn resolve(lua: &Lua, path: &str) -> Result<Function> {
    let parsed = DottedPath::parse(path)?;
    let parent = parent_table(lua, &parsed)?;
    match parent
        .get::<LuaValue>(parsed.last())
        .map_err(|e| lua_error(&e))?
    {
        LuaValue::Function(f) => Ok(f),
        _ => Err(Error::new(ErrorKind::NotAFunction {
            path: path.to_string(),
        })),
    }
}

/// Walk every segment of `path`, creating missing tables on the way
///
/// Idempotent. Fails with `NotATable` if an existing level holds anything
/// other than a table.
pub fn ensure_table(lua: &Lua, path: &DottedPath<'_>) -> Result<LuaTable> {
    ensure_segments(lua, path, path.segments())
}

/// Like [`ensure_table`] for every segment but the last; returns the table
/// that will hold the final segment
pub fn ensure_parent(lua: &Lua, path: &DottedPath<'_>) -> Result<LuaTable> {
    ensure_segments(lua, path, path.parents())
}

fn ensure_segments(lua: &Lua, path: &DottedPath<'_>, segments: &[&str]) -> Result<LuaTable> {
    let mut current = lua.globals();
    for segment in segments {
        current = match current.get::<LuaValue>(*segment).map_err(|e| lua_error(&e))? {
            LuaValue::Table(next) => next,
            LuaValue::Nil => {
                let fresh = lua.create_table().map_err(|e| lua_error(&e))?;
                current
                    .set(*segment, fresh.clone())
                    .map_err(|e| lua_error(&e))?;
                tracing::debug!(path = path.as_str(), segment, "created namespace table");
                fresh
            }
            _ => return Err(path.not_a_table(segment)),
        };
    }
    Ok(current)
}
