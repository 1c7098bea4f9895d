//! Conversion from request envelope errors to [`TugImportError`].
//!
//! Store and configuration errors convert in `tugimport-core`, parser, build
//! and runtime errors in `tugimport-python`. Only the request errors belong
//! to this crate.

use tugimport_core::error::TugImportError;

use crate::command::RequestError;

// ============================================================================
// Bridge: RequestError -> TugImportError
// ============================================================================

impl From<RequestError> for TugImportError {
    fn from(err: RequestError) -> Self {
        TugImportError::user(err.to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================
