//! Error types. `ParseError` and `EvaluationError` both carry a source
//! location; `IoError` is the `Loader` contract's failure mode.

use std::fmt;
use std::path::PathBuf;

/// A source location: line and column are 1-based; `file` is `None` for
/// formulas parsed directly from a string with no enclosing skeleton.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub file: Option<PathBuf>,
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(line: usize, column: usize) -> Self {
        Self {
            file: None,
            line,
            column,
        }
    }

    pub fn with_file(mut self, file: PathBuf) -> Self {
        self.file = Some(file);
        self
    }

    /// Fill in this location with `other` if this one is the default
    /// (unlocated) placeholder; used when an inner error bubbles up without
    /// ever having recorded a location of its own.
    pub fn or(self, other: &Location) -> Self {
        if self.line == 0 && self.column == 0 {
            other.clone()
        } else {
            self
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(file) = &self.file {
            write!(f, "{}:{}:{}", file.display(), self.line, self.column)
        } else {
            write!(f, "{}:{}", self.line, self.column)
        }
    }
}

/// A failure during lexing, parsing, or post-process name resolution.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{location}: {message}")]
pub struct ParseError {
    pub location: Location,
    pub message: String,
}

impl ParseError {
    pub fn new(location: Location, message: impl Into<String>) -> Self {
        Self {
            location,
            message: message.into(),
        }
    }
}

/// A failure while evaluating a formula or rendering a skeleton.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{location}: {message}")]
pub struct EvaluationError {
    pub location: Location,
    pub message: String,
}

impl EvaluationError {
    pub fn new(location: Location, message: impl Into<String>) -> Self {
        Self {
            location,
            message: message.into(),
        }
    }

    /// Attach `location` to this error only if it has none of its own yet,
    /// matching the rule that an outer node fills in a missing location
    /// rather than overwriting one that already exists.
    pub fn with_outer_location(mut self, location: &Location) -> Self {
        if self.location.line == 0 && self.location.column == 0 {
            self.location = location.clone();
        }
        self
    }
}

/// Failure reading a file through the host's [`crate::loader::Loader`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("could not read {path}: {message}")]
pub struct IoError {
    pub path: PathBuf,
    pub message: String,
}

impl IoError {
    pub fn new(path: PathBuf, message: impl Into<String>) -> Self {
        Self {
            path,
            message: message.into(),
        }
    }
}

impl From<IoError> for EvaluationError {
    fn from(err: IoError) -> Self {
        EvaluationError::new(Location::default(), err.to_string())
    }
}

impl From<IoError> for ParseError {
    fn from(err: IoError) -> Self {
        ParseError::new(Location::default(), err.to_string())
    }
}

pub type ParseResult<T> = Result<T, ParseError>;
pub type EvalResult<T> = Result<T, EvaluationError>;
