//! Unified error type for the ctxbank library.
//!
//! Library code returns `CtxbankError` so callers can match on the failure
//! kind; the CLI keeps using `anyhow::Result` for convenience.
//!
//! # Error Categories
//!
//! - **Io**: file system operations (open, read, write)
//! - **NotFound**: missing file or directory
//! - **AlreadyExists**: creating a directory or bucket file that is already there
//! - **Format**: invalid file format (magic bytes, version, truncated record)
//! - **InvalidArgument**: invalid parameters (zero cache, undersized buffer)
//! - **OutOfRange**: random access past the end of a bucket
//! - **Exhausted**: extraction from a spent tour or an empty key class

use std::fmt;
use std::path::PathBuf;

/// Unified error type for the ctxbank library.
#[derive(Debug)]
pub enum CtxbankError {
    /// I/O error with path context.
    Io {
        path: PathBuf,
        operation: &'static str,
        source: std::io::Error,
    },

    /// A file or directory that must exist does not.
    NotFound { path: PathBuf },

    /// A file or directory that must not exist is already there.
    AlreadyExists { path: PathBuf },

    /// Invalid file format (magic bytes, version, structure).
    Format { path: PathBuf, detail: String },

    /// Invalid parameter (cache sizes, buffer sizes).
    InvalidArgument(String),

    /// Random access past the end of a bucket.
    OutOfRange { index: u64, size: u64 },

    /// No value left to extract.
    Exhausted(String),
}

impl fmt::Display for CtxbankError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CtxbankError::Io {
                path,
                operation,
                source,
            } => {
                write!(
                    f,
                    "I/O error during {} on '{}': {}",
                    operation,
                    path.display(),
                    source
                )
            }
            CtxbankError::NotFound { path } => {
                write!(f, "'{}' does not exist", path.display())
            }
            CtxbankError::AlreadyExists { path } => {
                write!(f, "'{}' already exists", path.display())
            }
            CtxbankError::Format { path, detail } => {
                write!(f, "Invalid format in '{}': {}", path.display(), detail)
            }
            CtxbankError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            CtxbankError::OutOfRange { index, size } => {
                write!(
                    f,
                    "Index {} is out of the bucket's boundaries (size {})",
                    index, size
                )
            }
            CtxbankError::Exhausted(msg) => write!(f, "Exhausted: {}", msg),
        }
    }
}

impl std::error::Error for CtxbankError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CtxbankError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Convenience type alias for Results using CtxbankError.
pub type Result<T> = std::result::Result<T, CtxbankError>;

// ============================================================================
// Helper constructors
// ============================================================================

impl CtxbankError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, operation: &'static str, source: std::io::Error) -> Self {
        CtxbankError::Io {
            path: path.into(),
            operation,
            source,
        }
    }

    /// Create a not-found error.
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        CtxbankError::NotFound { path: path.into() }
    }

    /// Create an already-exists error.
    pub fn already_exists(path: impl Into<PathBuf>) -> Self {
        CtxbankError::AlreadyExists { path: path.into() }
    }

    /// Create a format error.
    pub fn format(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        CtxbankError::Format {
            path: path.into(),
            detail: detail.into(),
        }
    }

    /// Create an invalid-argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        CtxbankError::InvalidArgument(msg.into())
    }

    /// Create an out-of-range error.
    pub fn out_of_range(index: u64, size: u64) -> Self {
        CtxbankError::OutOfRange { index, size }
    }

    /// Create an exhausted error.
    pub fn exhausted(msg: impl Into<String>) -> Self {
        CtxbankError::Exhausted(msg.into())
    }
}

// ============================================================================
// Tests
// ============================================================================
