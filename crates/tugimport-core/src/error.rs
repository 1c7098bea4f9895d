//! Error taxonomy for tugimport.
//!
//! Every subsystem has its own error enum; they are bridged into
//! [`TugImportError`] before crossing the public operation surface.
//!
//! ## Error Kinds
//!
//! - `2`: user error (bad request, missing configuration, short query)
//! - `3`: index corruption (store unusable, always recovered by a rebuild)
//! - `4`: parse failure (a single source file could not be parsed)
//! - `10`: fatal (anything else; terminates the current operation)
//!
//! User errors, index corruption and parse failures are reported to the
//! caller as structured values and the process keeps serving. Fatal errors
//! end the operation; the document store guarantees that a pending write
//! batch is either committed in full or abandoned.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::store::StoreError;

// ============================================================================
// Error Kinds
// ============================================================================

/// Stable classification of a [`TugImportError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorKind {
    User = 2,
    IndexCorruption = 3,
    ParseFailure = 4,
    Fatal = 10,
}

impl ErrorKind {
    /// Numeric code.
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Tag used in JSON responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::User => "user_error",
            ErrorKind::IndexCorruption => "index_corruption",
            ErrorKind::ParseFailure => "parse_failure",
            ErrorKind::Fatal => "fatal",
        }
    }

    /// Whether a request loop may keep serving after this kind of error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ErrorKind::Fatal)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Unified Error Type
// ============================================================================

/// Unified error returned by every public operation.
#[derive(Debug, Error)]
pub enum TugImportError {
    /// Recoverable mistake by the caller.
    #[error("{message}")]
    UserError { message: String },

    /// The persisted index cannot be used and must be rebuilt.
    #[error("index corrupt: {message}")]
    IndexCorruption { message: String },

    /// A source file failed to parse.
    #[error("failed to parse {}: {message}", path.display())]
    ParseFailure { path: PathBuf, message: String },

    /// Anything else.
    #[error("{message}")]
    Fatal {
        message: String,
        /// Where the failure happened (operation name, file, ...).
        context: Option<String>,
    },
}

impl TugImportError {
    /// Create a user error.
    pub fn user(message: impl Into<String>) -> Self {
        TugImportError::UserError {
            message: message.into(),
        }
    }

    /// Create a fatal error without context.
    pub fn fatal(message: impl Into<String>) -> Self {
        TugImportError::Fatal {
            message: message.into(),
            context: None,
        }
    }

    /// Attach operation context to a fatal error. Other kinds are returned unchanged.
    pub fn with_context(self, ctx: impl Into<String>) -> Self {
        match self {
            TugImportError::Fatal {
                message,
                context: None,
            } => TugImportError::Fatal {
                message,
                context: Some(ctx.into()),
            },
            other => other,
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TugImportError::UserError { .. } => ErrorKind::User,
            TugImportError::IndexCorruption { .. } => ErrorKind::IndexCorruption,
            TugImportError::ParseFailure { .. } => ErrorKind::ParseFailure,
            TugImportError::Fatal { .. } => ErrorKind::Fatal,
        }
    }

    /// Context string for fatal errors.
    pub fn context(&self) -> Option<&str> {
        match self {
            TugImportError::Fatal { context, .. } => context.as_deref(),
            _ => None,
        }
    }
}

/// Result type for public operations.
pub type TugImportResult<T> = Result<T, TugImportError>;

// ============================================================================
// Bridge: StoreError -> TugImportError
// ============================================================================

impl From<StoreError> for TugImportError {
    fn from(err: StoreError) -> Self {
        if err.is_corruption() {
            return TugImportError::IndexCorruption {
                message: err.to_string(),
            };
        }
        TugImportError::fatal(err.to_string()).with_context("document store")
    }
}

// ============================================================================
// Bridge: ConfigError -> TugImportError
// ============================================================================

impl From<ConfigError> for TugImportError {
    fn from(err: ConfigError) -> Self {
        TugImportError::user(err.to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================
