use std::path::Path;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Typed failures surfaced by every engine operation.
///
/// Each variant names the offending path or command so callers can report
/// failures without re-deriving context. The engine never retries silently.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("project root is not set")]
    RootUnset,

    #[error("path '{path}' resolves outside the project root")]
    OutsideRoot { path: String },

    #[error("refusing to remove the project root")]
    RootRemoval,

    #[error("path not found: {path}")]
    NotFound { path: String },

    #[error("path already exists: {path}")]
    AlreadyExists { path: String },

    #[error("parent directory does not exist for '{path}'")]
    ParentMissing { path: String },

    #[error("'{path}' is not a file")]
    NotAFile { path: String },

    #[error("'{path}' is not a directory")]
    NotADirectory { path: String },

    #[error("line range {start}..={end} is entirely beyond end of '{path}' ({line_count} lines)")]
    RangeOutOfBounds {
        path: String,
        start: usize,
        end: usize,
        line_count: usize,
    },

    #[error("invalid line number {line} for '{path}' ({line_count} lines)")]
    InvalidLineNumber {
        path: String,
        line: usize,
        line_count: usize,
    },

    #[error("invalid line range {start}..={end} for '{path}' ({line_count} lines)")]
    InvalidRange {
        path: String,
        start: usize,
        end: usize,
        line_count: usize,
    },

    #[error("encoding error for '{path}': {reason}")]
    Encoding { path: String, reason: String },

    #[error("file too large: '{path}' is {size} bytes (limit {limit})")]
    FileTooLarge { path: String, size: u64, limit: u64 },

    #[error("command '{command}' is not in the allow-list")]
    CommandNotAllowed { command: String },

    #[error("permission denied: {path}")]
    PermissionDenied { path: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid glob pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Attach the offending path to a raw IO error, mapping the common
    /// kinds onto their typed variants.
    pub(crate) fn from_io(err: std::io::Error, path: &Path) -> Self {
        let display = path.display().to_string();
        match err.kind() {
            std::io::ErrorKind::NotFound => EngineError::NotFound { path: display },
            std::io::ErrorKind::PermissionDenied => EngineError::PermissionDenied { path: display },
            std::io::ErrorKind::AlreadyExists => EngineError::AlreadyExists { path: display },
            _ => EngineError::Io(err),
        }
    }
}
