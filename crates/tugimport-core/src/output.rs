//! JSON response types for the request loop and the CLI.
//!
//! Every response is a single JSON line. Payload structs are flattened into
//! an envelope carrying the request id:
//!
//! ```text
//! {"id": "7", "items": [...]}
//! {"id": "7", "error": true, "kind": "user_error", "code": 2, "message": "..."}
//! {"progress": "Indexing... 40%"}
//! ```

use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use crate::diff::LineEdit;
use crate::error::TugImportError;
use crate::types::{IndexDocument, SymbolKind};

// ============================================================================
// Payloads
// ============================================================================

/// One search hit as sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolItem {
    pub symbol: String,
    pub module: String,
    pub kind: SymbolKind,
}

impl From<&IndexDocument> for SymbolItem {
    fn from(doc: &IndexDocument) -> Self {
        SymbolItem {
            symbol: doc.symbol.clone(),
            module: doc.module.clone(),
            kind: doc.kind,
        }
    }
}

/// Response for `getSymbols` and `importSuggestions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemsResponse {
    pub items: Vec<SymbolItem>,
}

/// Response for `configure`, `rebuildIndex` and `changeFiles`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexResponse {
    pub success: bool,
    pub docs_count: usize,
    /// Files that failed to parse during this operation.
    pub parse_failures: usize,
    /// Whether the persisted index was reused (configure only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reused: Option<bool>,
}

/// Response for `insertImport`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertImportResponse {
    pub from_line: usize,
    pub end_line: usize,
    pub text: String,
    /// Individual edits, last first.
    pub diff: Vec<LineEdit>,
}

/// Unresolved and unreferenced names of one file (CLI `resolve`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolveResponse {
    pub unresolved: Vec<String>,
    pub unreferenced: Vec<String>,
}

// ============================================================================
// Envelopes
// ============================================================================

/// Successful response tagged with its request id.
#[derive(Debug, Clone, Serialize)]
pub struct Reply<'a, T: Serialize> {
    pub id: &'a str,
    #[serde(flatten)]
    pub payload: T,
}

/// Progress notification; carries no request id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub progress: String,
}

impl ProgressEvent {
    pub fn scan(count: usize) -> Self {
        ProgressEvent {
            progress: format!("Scan files... {}", count),
        }
    }

    pub fn indexing(percent: usize) -> Self {
        ProgressEvent {
            progress: format!("Indexing... {}%", percent.min(100)),
        }
    }
}

/// Error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub error: bool,
    pub kind: String,
    pub code: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl ErrorResponse {
    pub fn from_error(id: Option<&str>, err: &TugImportError) -> Self {
        let kind = err.kind();
        ErrorResponse {
            id: id.map(str::to_string),
            error: true,
            kind: kind.as_str().to_string(),
            code: kind.code(),
            message: err.to_string(),
            context: err.context().map(str::to_string),
        }
    }
}

/// Emit a response as compact JSON (single line) to a writer and flush it.
pub fn emit_response_compact<T: Serialize>(
    response: &T,
    writer: &mut impl Write,
) -> io::Result<()> {
    let json = serde_json::to_string(response)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(writer, "{}", json)?;
    writer.flush()
}

/// Emit a response as pretty JSON to a writer.
pub fn emit_response<T: Serialize>(response: &T, writer: &mut impl Write) -> io::Result<()> {
    let json = serde_json::to_string_pretty(response)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(writer, "{}", json)
}

// ============================================================================
// Tests
// ============================================================================
