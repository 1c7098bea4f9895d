//! tugimport: symbol index and import insertion for Python workspaces
//!
//! Indexes the symbols of a workspace and its Python runtime into a
//! persistent store, searches them by name, finds the unresolved names of a
//! source file, and computes the minimal edit that adds an import to a file's
//! import block.

// Core infrastructure - re-exported from tugimport-core
pub use tugimport_core::config;
pub use tugimport_core::diff;
pub use tugimport_core::error;
pub use tugimport_core::output;
pub use tugimport_core::store;
pub use tugimport_core::types;

// Python language support
pub use tugimport_python as python;

// Operation surface and request loop
pub mod command;
pub mod session;

// Error bridges - converts subsystem errors to TugImportError
mod error_bridges;
