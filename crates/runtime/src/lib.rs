//! Tether Runtime: embedded Lua sessions behind a leak-proof boundary
//!
//! Key design principles:
//! - Session: one isolated Lua state with its own native callback registry
//! - SessionManager: many sessions addressed by process-unique UIDs
//! - Context: pins every object handed to a host and sweeps leftovers at
//!   shutdown or process exit
//!
//! # Modules
//!
//! - `codec`: Value <-> Lua marshalling and dotted-path calls
//! - `path`: Dotted global path parsing and resolution
//! - `callback`: Per-session native callback registry and trampolines
//! - `config`: Session options
//! - `session`: Interpreter session lifecycle
//! - `manager`: Session manager and UID allocation
//! - `context`: Boundary context, pin arena ownership, exit hook
//! - `report`: Sweep report (`TETHER_REPORT`)
//! - `ffi`: Flat C ABI (`tether_*` symbols)

pub mod callback;
pub mod codec;
pub mod config;
pub mod context;
pub mod ffi;
pub mod manager;
pub mod path;
pub mod report;
pub mod session;

pub use callback::NativeCallback;
pub use codec::{Blob, Encoding, OpaqueHandle};
pub use config::SessionOptions;
pub use context::{BoundaryObject, Context, ObjectKind};
pub use manager::{SessionHandle, SessionManager};
pub use session::{Session, SessionState};

pub use tether_core::{
    Category, Error, ErrorKind, Kind, OpaqueId, Origin, PinArena, PinId, Result, Status,
    SweepSummary, Table, Value, Vector,
};
