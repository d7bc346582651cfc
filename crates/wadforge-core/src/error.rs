//! Unified error handling for wadforge
//!
//! Every decoder, container reader and codec in the workspace reports
//! failures through this one error type. Detectors never produce errors;
//! they answer with a confidence instead.

use thiserror::Error;

/// Unified error type for all wadforge operations
#[derive(Error, Debug)]
pub enum Error {
    // ==================== Structural Errors ====================

    /// Magic bytes, counts or header fields do not describe a valid file
    #[error("Malformed header: {message}")]
    MalformedHeader {
        message: String,
    },

    /// The buffer ended before a structure was complete
    #[error("Truncated data at offset {offset}: needed {needed} bytes, {available} available")]
    TruncatedData {
        offset: u64,
        needed: u64,
        available: u64,
    },

    /// An offset (or offset + size) points outside the buffer
    #[error("Offset {offset} out of bounds (buffer length {length})")]
    OutOfBoundsOffset {
        offset: u64,
        length: u64,
    },

    /// The data is recognised but uses a variant that is not handled
    #[error("Unsupported variant: {message}")]
    UnsupportedVariant {
        message: String,
    },

    // ==================== Compression Errors ====================

    /// The compression backend rejected the stream
    #[error("Compression failure: {message}")]
    CompressionFailure {
        message: String,
    },

    /// Decompressed size differs from the size recorded on disk
    #[error("Size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        expected: u64,
        actual: u64,
    },

    // ==================== Archive Errors ====================

    /// No entry or directory exists at the given path
    #[error("Archive entry not found: {path}")]
    EntryNotFound {
        path: String,
    },

    /// The operation is not valid for the archive or entry in its current state
    #[error("Invalid operation: {message}")]
    InvalidOperation {
        message: String,
    },

    // ==================== General Errors ====================

    /// Error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

/// Result type using the unified Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an error with additional context
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Error::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a malformed header error
    pub fn malformed(message: impl Into<String>) -> Self {
        Error::MalformedHeader {
            message: message.into(),
        }
    }

    /// Create an unsupported variant error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Error::UnsupportedVariant {
            message: message.into(),
        }
    }

    /// Create a compression failure error
    pub fn compression(message: impl Into<String>) -> Self {
        Error::CompressionFailure {
            message: message.into(),
        }
    }

    /// Create an invalid operation error
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Error::InvalidOperation {
            message: message.into(),
        }
    }

    /// Create an entry not found error
    pub fn entry_not_found(path: impl Into<String>) -> Self {
        Error::EntryNotFound { path: path.into() }
    }

    /// Create a truncated data error
    pub fn truncated(offset: usize, needed: usize, available: usize) -> Self {
        Error::TruncatedData {
            offset: offset as u64,
            needed: needed as u64,
            available: available as u64,
        }
    }

    /// Create an out of bounds error
    pub fn out_of_bounds(offset: usize, length: usize) -> Self {
        Error::OutOfBoundsOffset {
            offset: offset as u64,
            length: length as u64,
        }
    }

    /// The innermost error, with every context layer removed
    pub fn root(&self) -> &Error {
        match self {
            Error::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if this is a "not found" type error
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Error::EntryNotFound { .. })
    }

    /// Check if this is a parse/format error
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self.root(),
            Error::MalformedHeader { .. }
                | Error::TruncatedData { .. }
                | Error::OutOfBoundsOffset { .. }
        )
    }

    /// Check if this came from the compression layer
    pub fn is_compression_error(&self) -> bool {
        matches!(
            self.root(),
            Error::CompressionFailure { .. } | Error::SizeMismatch { .. }
        )
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
