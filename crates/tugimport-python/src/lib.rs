//! Python language support for tugimport.
//!
//! This crate provides the Python-specific halves of the import workflow:
//! - Tree-sitter parsing
//! - Python runtime discovery
//! - Module symbol extraction and the scored symbol tree
//! - Symbol index builder
//! - Scope resolution (unresolved names, unreferenced imports)
//! - Import block engine

pub mod builtins;
pub mod env;
mod error_bridges;
pub mod extract;
pub mod imports;
pub mod indexer;
pub mod resolver;
pub mod symbols;
pub mod syntax;
