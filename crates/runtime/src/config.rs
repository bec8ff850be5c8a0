//! Session configuration
//!
//! ```rust,ignore
//! use tether_runtime::{Encoding, SessionOptions};
//!
//! let options = SessionOptions::new()
//!     .with_stdlib(false)
//!     .with_encoding(Encoding::Sentinel)
//!     .with_memory_limit(16 * 1024 * 1024)
//!     .with_chunk_name("level-script");
//!
//! let uid = manager.new_session_with(options)?;
//! ```

use crate::codec::Encoding;

/// Chunk name used for source strings when none is configured
pub const DEFAULT_CHUNK_NAME: &str = "tether";

/// How a session's runtime is created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Load the safe standard libraries (`string`, `math`, `table`, ...)
    pub stdlib: bool,

    /// Representation of Binary and OpaqueId values inside scripts
    pub encoding: Encoding,

    /// Upper bound on the runtime's heap, in bytes
    pub memory_limit: Option<usize>,

    /// Name reported in error messages for chunks loaded from strings
    pub chunk_name: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            stdlib: true,
            encoding: Encoding::default(),
            memory_limit: None,
            chunk_name: DEFAULT_CHUNK_NAME.to_string(),
        }
    }
}

impl SessionOptions {
    /// Standard library on, tagged encoding, no memory limit
    pub fn new() -> Self {
        SessionOptions::default()
    }

    pub fn with_stdlib(mut self, stdlib: bool) -> Self {
        self.stdlib = stdlib;
        self
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    pub fn with_chunk_name(mut self, name: impl Into<String>) -> Self {
        self.chunk_name = name.into();
        self
    }
}
