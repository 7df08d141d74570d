//! Error types for NFO detection, parsing, editing and writing

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::model::NfoFormat;

/// File system operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessOp {
    /// Reading a file's contents
    Read,
    /// Writing a rendered model
    Write,
    /// Copying an existing file aside before an overwrite
    Backup,
    /// Walking a directory during discovery
    Scan,
}

impl fmt::Display for AccessOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            AccessOp::Read => "read",
            AccessOp::Write => "write",
            AccessOp::Backup => "back up",
            AccessOp::Scan => "scan",
        };
        f.write_str(op)
    }
}

/// 1-based position of a parse failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    /// Compute the line/column of a byte offset within `text`
    pub fn from_offset(text: &str, offset: usize) -> Self {
        let mut offset = offset.min(text.len());
        while !text.is_char_boundary(offset) {
            offset -= 1;
        }
        let before = &text[..offset];
        let line = before.matches('\n').count() + 1;
        let column = match before.rfind('\n') {
            Some(pos) => before[pos + 1..].chars().count() + 1,
            None => before.chars().count() + 1,
        };
        Self { line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Errors raised by the NFO core
#[derive(Debug, Error)]
pub enum NfoError {
    /// A path is missing, unreadable or unwritable
    #[error("cannot {op} {}: {source}", path.display())]
    Access {
        path: PathBuf,
        op: AccessOp,
        #[source]
        source: std::io::Error,
    },

    /// Content does not conform to the claimed (or any) format
    #[error("{format} parse error{}: {message}", location.map(|l| format!(" at {l}")).unwrap_or_default())]
    Parse {
        format: NfoFormat,
        location: Option<Location>,
        message: String,
    },

    /// No writer accepts the model, or a forced format does not fit
    #[error("format error: {0}")]
    Format(String),

    /// A dotted path cannot be resolved for writing
    #[error("field error at '{path}': {message}")]
    Field { path: String, message: String },
}

impl NfoError {
    pub fn access(path: impl AsRef<Path>, op: AccessOp, source: std::io::Error) -> Self {
        NfoError::Access {
            path: path.as_ref().to_path_buf(),
            op,
            source,
        }
    }

    pub fn parse(format: NfoFormat, location: Option<Location>, message: impl Into<String>) -> Self {
        NfoError::Parse {
            format,
            location,
            message: message.into(),
        }
    }

    pub fn field(path: impl Into<String>, message: impl Into<String>) -> Self {
        NfoError::Field {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, NfoError>;
