//! Core infrastructure for tugimport.
//!
//! This crate provides language-agnostic infrastructure:
//! - Error taxonomy and error kinds
//! - Shared index types (locations, symbol kinds, documents, weights)
//! - Validated session configuration
//! - Workspace identity and staleness checksum
//! - SQLite document store
//! - Line diff engine
//! - Throttled progress reporting
//! - JSON response types

pub mod checksum;
pub mod config;
pub mod diff;
pub mod error;
pub mod output;
pub mod progress;
pub mod store;
pub mod types;
