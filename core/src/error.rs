//! Error types shared by the converters, the context and the bridge

use std::fmt;
use uuid::Uuid;

/// Source location of a script fault (1-indexed)
///
/// The engine reports a column only for some faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub column: Option<usize>,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.column {
            Some(column) => write!(f, "{}:{}", self.line, column),
            None => write!(f, "{}", self.line),
        }
    }
}

/// An uncaught script exception or a syntax error
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptFault {
    /// Error name, e.g. `TypeError` or `SyntaxError`
    pub name: String,
    pub message: String,
    pub location: Option<Location>,
}

impl fmt::Display for ScriptFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{}: {} (at {})", self.name, self.message, loc),
            None => write!(f, "{}: {}", self.name, self.message),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Script execution raised an error that was not caught
    #[error("{0}")]
    ScriptFault(ScriptFault),

    /// A host value or destination shape cannot cross the boundary
    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    #[error("type mismatch at {path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: String,
        found: String,
    },

    #[error("range error at {path}: {message}")]
    RangeError { path: String, message: String },

    /// The context owning a function has been destroyed
    #[error("context {context} owning this function has been destroyed")]
    DanglingContext { context: Uuid },

    #[error("nesting depth limit of {limit} exceeded at {path}")]
    DepthLimit { limit: usize, path: String },

    #[error("invalid context options: {0}")]
    InvalidOptions(String),
}

impl Error {
    /// Name used when this error surfaces inside a script as an Error object
    pub fn script_name(&self) -> &'static str {
        match self {
            Error::ScriptFault(_) => "Error",
            Error::UnsupportedType(_) => "UnsupportedType",
            Error::TypeMismatch { .. } => "TypeMismatch",
            Error::RangeError { .. } => "RangeError",
            Error::DanglingContext { .. } => "DanglingContextError",
            Error::DepthLimit { .. } => "RangeError",
            Error::InvalidOptions(_) => "Error",
        }
    }

    pub(crate) fn type_mismatch(
        path: &str,
        expected: impl fmt::Display,
        found: impl fmt::Display,
    ) -> Self {
        Error::TypeMismatch {
            path: path.to_string(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    pub(crate) fn range(path: &str, message: impl Into<String>) -> Self {
        Error::RangeError {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
