//! Conversions from Python-side errors into [`TugImportError`].
//!
//! A syntax error inside one file is a parse failure for that file; the
//! parser failing to start or the runtime probe failing are fatal.

use tugimport_core::error::TugImportError;

use crate::env::RuntimeError;
use crate::indexer::BuildError;
use crate::syntax::SyntaxError;

// ============================================================================
// Bridge: SyntaxError -> TugImportError
// ============================================================================

impl From<SyntaxError> for TugImportError {
    fn from(err: SyntaxError) -> Self {
        match err {
            SyntaxError::Invalid { .. } => TugImportError::ParseFailure {
                path: Default::default(),
                message: err.to_string(),
            },
            SyntaxError::LanguageInit(_) | SyntaxError::NoTree => {
                TugImportError::fatal(err.to_string()).with_context("parser")
            }
        }
    }
}

// ============================================================================
// Bridge: BuildError -> TugImportError
// ============================================================================

impl From<BuildError> for TugImportError {
    fn from(err: BuildError) -> Self {
        let path = err.path().to_path_buf();
        let message = match &err {
            BuildError::Read { source, .. } => source.to_string(),
            BuildError::Parse { source, .. } => source.to_string(),
        };
        TugImportError::ParseFailure { path, message }
    }
}

// ============================================================================
// Bridge: RuntimeError -> TugImportError
// ============================================================================

impl From<RuntimeError> for TugImportError {
    fn from(err: RuntimeError) -> Self {
        TugImportError::fatal(err.to_string()).with_context("Python runtime discovery")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::path::PathBuf;
    use tugimport_core::error::ErrorKind;

    use crate::syntax::Position;

    #[test]
    fn syntax_errors_split_by_cause() {
        let err = TugImportError::from(SyntaxError::Invalid {
            position: Position { line: 0, column: 3 },
        });
        assert_eq!(err.kind(), ErrorKind::ParseFailure);
        let err = TugImportError::from(SyntaxError::NoTree);
        assert_eq!(err.kind(), ErrorKind::Fatal);
    }

    #[test]
    fn build_errors_keep_the_path() {
        let err = TugImportError::from(BuildError::Read {
            path: PathBuf::from("/w/broken.py"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        });
        match err {
            TugImportError::ParseFailure { path, message } => {
                assert_eq!(path, PathBuf::from("/w/broken.py"));
                assert!(message.contains("denied"));
            }
            other => panic!("expected ParseFailure, got {other:?}"),
        }
    }

    #[test]
    fn runtime_errors_are_fatal() {
        let err = TugImportError::from(RuntimeError::NotFound {
            searched: vec!["python3".into()],
        });
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert_eq!(err.context(), Some("Python runtime discovery"));
    }
}
