//! Tether Core: the data model shared by every side of the boundary
//!
//! This crate has no knowledge of the scripting runtime. It defines what the
//! host and scripts exchange and how boundary objects are kept alive.
//!
//! Key design principles:
//! - Value: the tagged datum exchanged with scripts (Int, Float, String, ...)
//! - Vector / Table: owned containers of Values (call arguments, results, maps)
//! - PinArena: every boundary object is reclaimed exactly once, even if leaked
//!
//! # Modules
//!
//! - `error`: Error kinds, boundary categories and statuses
//! - `value`: Core Value enum with content equality and hashing
//! - `vector`: Ordered sequence of Values
//! - `table`: Associative Value -> Value map
//! - `pin`: Generation-checked arena with a shutdown sweep

pub mod error;
pub mod pin;
pub mod table;
pub mod value;
pub mod vector;

pub use error::{Category, Error, ErrorKind, Result, SourceLocation, Status};
pub use pin::{ArenaStats, Origin, OriginCounts, PinArena, PinId, Pinnable, SweepSummary};
pub use table::Table;
pub use value::{Kind, OpaqueId, Value};
pub use vector::Vector;
