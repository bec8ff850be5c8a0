//! Error taxonomy shared by every Tether crate
//!
//! Internally every fallible operation returns [`Result<T>`] carrying an
//! [`Error`]: a precise [`ErrorKind`] plus the source location where the
//! failure was raised. At the C boundary an error collapses to a [`Status`],
//! whose [`Category`] is the stable, numeric classification callers switch on.
//!
//! # Usage
//!
//! ```ignore
//! let n = value.as_int()?; // TypeMismatch -> Category::InvalidType
//!
//! if path.is_empty() {
//!     return Err(Error::new(ErrorKind::IllFormedPath {
//!         path: path.to_string(),
//!         reason: "path is empty",
//!     }));
//! }
//! ```

use crate::value::Kind;
use serde::Serialize;
use std::fmt;
use std::panic::Location;

/// Result alias used throughout the workspace
pub type Result<T> = std::result::Result<T, Error>;

/// Stable classification of a boundary status
///
/// The discriminants are part of the C ABI and must never be reordered.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Category {
    Ok = 0,
    GenericError = 1,
    Unknown = 2,
    InvalidPointer = 3,
    FileNotFound = 4,
    NotATable = 5,
    InvalidType = 6,
    NullOrEmptyArgument = 7,
    ExecutionError = 8,
    IllFormedPath = 9,
    PromotedNativeException = 10,
    SdkException = 11,
}

impl Category {
    /// Human-readable name, as printed in formatted statuses
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Ok => "ok",
            Category::GenericError => "error",
            Category::Unknown => "unknown error",
            Category::InvalidPointer => "invalid pointer",
            Category::FileNotFound => "file not found",
            Category::NotATable => "not a table",
            Category::InvalidType => "invalid type",
            Category::NullOrEmptyArgument => "null or empty argument",
            Category::ExecutionError => "execution error",
            Category::IllFormedPath => "ill-formed path",
            Category::PromotedNativeException => "promoted native exception",
            Category::SdkException => "sdk exception",
        }
    }

    /// Numeric code as exposed through the C ABI
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Decode a numeric code; unknown codes map to [`Category::Unknown`]
    pub fn from_code(code: i32) -> Category {
        match code {
            0 => Category::Ok,
            1 => Category::GenericError,
            3 => Category::InvalidPointer,
            4 => Category::FileNotFound,
            5 => Category::NotATable,
            6 => Category::InvalidType,
            7 => Category::NullOrEmptyArgument,
            8 => Category::ExecutionError,
            9 => Category::IllFormedPath,
            10 => Category::PromotedNativeException,
            11 => Category::SdkException,
            _ => Category::Unknown,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What went wrong
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    /// A typed accessor was used on a Value of another kind
    TypeMismatch { expected: Kind, found: Kind },
    /// A runtime table nests deeper than the reader allows (likely a cycle)
    TooDeep { limit: usize },
    /// An integral float table key would land on the same slot as an
    /// integer key in the runtime
    KeyCollision { key: String },
    /// Vector index outside `[0, len)`
    IndexOutOfRange { index: i64, len: usize },
    /// Table lookup of an absent key
    KeyNotFound { key: String },
    /// An intermediate segment of a dotted path is not a table
    NotATable { path: String, segment: String },
    /// The final segment of a dotted path is not callable
    NotAFunction { path: String },
    /// Empty path, or a path with an empty segment
    IllFormedPath { path: String, reason: &'static str },
    /// The scripting runtime reported an error
    Execution { message: String },
    /// A script file could not be found
    FileNotFound { path: String },
    /// A boundary handle does not name a live object of the expected type
    InvalidHandle { handle: u64 },
    /// A required argument was null or empty
    NullArgument { argument: &'static str },
    /// The session has been closed
    SessionClosed,
    /// No session is registered under this UID
    InvalidSession { uid: u64 },
    /// The session is already in use (for example re-entered from a callback)
    SessionBusy,
    /// A boundary constructor was used before `init()` or after shutdown
    NotInitialized,
    /// A native callback reported a failure
    Callback { name: String, message: String },
    /// A panic was caught at the boundary
    Promoted { message: String },
    /// Process-level initialization failed
    Init { message: String },
    /// I/O failure other than a missing file
    Io { message: String },
}

impl ErrorKind {
    /// Boundary category this kind collapses to
    pub fn category(&self) -> Category {
        match self {
            ErrorKind::TypeMismatch { .. }
            | ErrorKind::TooDeep { .. }
            | ErrorKind::KeyCollision { .. } => Category::InvalidType,
            ErrorKind::IndexOutOfRange { .. } | ErrorKind::KeyNotFound { .. } => {
                Category::GenericError
            }
            ErrorKind::NotATable { .. } => Category::NotATable,
            ErrorKind::NotAFunction { .. } | ErrorKind::Execution { .. } => {
                Category::ExecutionError
            }
            ErrorKind::IllFormedPath { .. } => Category::IllFormedPath,
            ErrorKind::FileNotFound { .. } => Category::FileNotFound,
            ErrorKind::InvalidHandle { .. }
            | ErrorKind::SessionClosed
            | ErrorKind::InvalidSession { .. } => Category::InvalidPointer,
            ErrorKind::NullArgument { .. } => Category::NullOrEmptyArgument,
            ErrorKind::SessionBusy | ErrorKind::NotInitialized | ErrorKind::Io { .. } => {
                Category::GenericError
            }
            ErrorKind::Callback { .. } => Category::SdkException,
            ErrorKind::Promoted { .. } => Category::PromotedNativeException,
            ErrorKind::Init { .. } => Category::Unknown,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::TypeMismatch { expected, found } => {
                write!(f, "type mismatch: expected {}, found {}", expected, found)
            }
            ErrorKind::TooDeep { limit } => {
                write!(f, "table nesting exceeds {} levels", limit)
            }
            ErrorKind::KeyCollision { key } => {
                write!(f, "table key {} collides with an integer key", key)
            }
            ErrorKind::IndexOutOfRange { index, len } => {
                write!(f, "index {} out of range for vector of size {}", index, len)
            }
            ErrorKind::KeyNotFound { key } => write!(f, "key {} not found", key),
            ErrorKind::NotATable { path, segment } => {
                write!(f, "`{}` in path `{}` is not a table", segment, path)
            }
            ErrorKind::NotAFunction { path } => write!(f, "`{}` is not a function", path),
            ErrorKind::IllFormedPath { path, reason } => {
                write!(f, "ill-formed path `{}`: {}", path, reason)
            }
            ErrorKind::Execution { message } => f.write_str(message),
            ErrorKind::FileNotFound { path } => write!(f, "cannot open `{}`", path),
            ErrorKind::InvalidHandle { handle } => {
                write!(f, "handle {:#x} does not name a live object", handle)
            }
            ErrorKind::NullArgument { argument } => {
                write!(f, "argument `{}` is null or empty", argument)
            }
            ErrorKind::SessionClosed => f.write_str("session is closed"),
            ErrorKind::InvalidSession { uid } => write!(f, "{}: invalid session UID", uid),
            ErrorKind::SessionBusy => f.write_str("session is already in use"),
            ErrorKind::NotInitialized => {
                f.write_str("boundary used before init() or after shutdown")
            }
            ErrorKind::Callback { name, message } => {
                write!(f, "native callback `{}` failed: {}", name, message)
            }
            ErrorKind::Promoted { message } => write!(f, "native panic: {}", message),
            ErrorKind::Init { message } => write!(f, "initialization failed: {}", message),
            ErrorKind::Io { message } => write!(f, "I/O error: {}", message),
        }
    }
}

/// Where a status or error was raised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    /// Operation name (boundary function, or empty for internal errors)
    pub function: &'static str,
    pub file: &'static str,
    pub line: u32,
}

impl SourceLocation {
    /// Location of the caller (propagated through `#[track_caller]` frames)
    #[track_caller]
    pub fn caller() -> Self {
        let location = Location::caller();
        SourceLocation {
            function: "",
            file: location.file(),
            line: location.line(),
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)?;
        if !self.function.is_empty() {
            write!(f, ".{}", self.function)?;
        }
        Ok(())
    }
}

/// An error with the location it was raised at
#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    kind: ErrorKind,
    location: SourceLocation,
}

impl Error {
    /// Create an error located at the caller
    #[track_caller]
    pub fn new(kind: ErrorKind) -> Self {
        Error {
            kind,
            location: SourceLocation::caller(),
        }
    }

    #[track_caller]
    pub fn execution(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Execution {
            message: message.into(),
        })
    }

    #[track_caller]
    pub fn null_argument(argument: &'static str) -> Self {
        Error::new(ErrorKind::NullArgument { argument })
    }

    #[track_caller]
    pub fn invalid_handle(handle: u64) -> Self {
        Error::new(ErrorKind::InvalidHandle { handle })
    }

    #[track_caller]
    pub fn type_mismatch(expected: Kind, found: Kind) -> Self {
        Error::new(ErrorKind::TypeMismatch { expected, found })
    }

    /// Attach the name of the operation that surfaced this error
    ///
    /// Keeps an operation name that was set closer to the failure.
    pub fn within(mut self, function: &'static str) -> Self {
        if self.location.function.is_empty() {
            self.location.function = function;
        }
        self
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn location(&self) -> SourceLocation {
        self.location
    }

    pub fn category(&self) -> Category {
        self.kind.category()
    }

    /// Rendered message without location
    pub fn message(&self) -> String {
        self.kind.to_string()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for Error {}

impl From<ErrorKind> for Error {
    #[track_caller]
    fn from(kind: ErrorKind) -> Self {
        Error::new(kind)
    }
}

impl From<std::io::Error> for Error {
    #[track_caller]
    fn from(e: std::io::Error) -> Self {
        Error::new(ErrorKind::Io {
            message: e.to_string(),
        })
    }
}

/// Boundary-facing outcome of an operation: `{category, source, message}`
///
/// `Category::Ok` is the only success value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Status {
    pub category: Category,
    pub source: SourceLocation,
    pub message: String,
}

impl Status {
    #[track_caller]
    pub fn ok() -> Self {
        Status {
            category: Category::Ok,
            source: SourceLocation::caller(),
            message: "success!".to_string(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.category == Category::Ok
    }

    /// Convert a `Result` into a status, naming the operation that produced it
    #[track_caller]
    pub fn from_result<T>(result: &Result<T>, function: &'static str) -> Self {
        match result {
            Ok(_) => {
                let mut status = Status::ok();
                status.source.function = function;
                status
            }
            Err(e) => Status::from(e.clone().within(function)),
        }
    }
}

impl From<Error> for Status {
    fn from(e: Error) -> Self {
        Status {
            category: e.category(),
            source: e.location,
            message: e.message(),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{} : {}\nfrom {}",
            self.category,
            self.category.code(),
            self.message,
            self.source
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_codes_are_stable() {
        assert_eq!(Category::Ok.code(), 0);
        assert_eq!(Category::ExecutionError.code(), 8);
        assert_eq!(Category::SdkException.code(), 11);
        for code in 0..12 {
            if code == 2 {
                continue;
            }
            assert_eq!(Category::from_code(code).code(), code);
        }
        assert_eq!(Category::from_code(99), Category::Unknown);
    }

    #[test]
    fn test_kind_category_mapping() {
        let err = Error::type_mismatch(Kind::Int, Kind::String);
        assert_eq!(err.category(), Category::InvalidType);

        let err = Error::new(ErrorKind::NotAFunction {
            path: "a.b".to_string(),
        });
        assert_eq!(err.category(), Category::ExecutionError);

        let err = Error::new(ErrorKind::InvalidSession { uid: 7 });
        assert_eq!(err.category(), Category::InvalidPointer);
    }

    #[test]
    fn test_error_records_caller_location() {
        let err = Error::execution("boom");
        assert!(err.location().file.ends_with("error.rs"));
        assert!(err.location().line > 0);
        assert_eq!(err.location().function, "");
    }

    #[test]
    fn test_within_keeps_innermost_function() {
        let err = Error::execution("boom").within("inner").within("outer");
        assert_eq!(err.location().function, "inner");
    }

    #[test]
    fn test_status_from_error() {
        let err = Error::new(ErrorKind::KeyNotFound {
            key: "\"missing\"".to_string(),
        })
        .within("tether_table_at");
        let status = Status::from(err);
        assert_eq!(status.category, Category::GenericError);
        assert_eq!(status.source.function, "tether_table_at");
        assert_eq!(status.message, "key \"missing\" not found");
        assert!(!status.is_ok());
    }

    #[test]
    fn test_status_display() {
        let status = Status::from(Error::execution("attempt to call a nil value"));
        let text = status.to_string();
        assert!(text.starts_with("execution error#8 : attempt to call a nil value"));
        assert!(text.contains("\nfrom "));
    }

    #[test]
    fn test_status_from_result() {
        let ok: Result<()> = Ok(());
        let status = Status::from_result(&ok, "tether_session_load");
        assert!(status.is_ok());
        assert_eq!(status.source.function, "tether_session_load");

        let failed: Result<()> = Err(Error::null_argument("source"));
        let status = Status::from_result(&failed, "tether_session_load");
        assert_eq!(status.category, Category::NullOrEmptyArgument);
    }
}
