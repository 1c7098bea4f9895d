//! Request handling for the line-oriented JSON protocol.
//!
//! Each input line is one request object carrying an `action` tag and a
//! `requestId`. Each request produces exactly one response line tagged with
//! the same id, preceded by any number of progress lines:
//!
//! ```text
//! > {"requestId": 1, "action": "getSymbols", "text": "OrderedDict"}
//! < {"id": "1", "items": [{"symbol": "OrderedDict", "module": "collections", "kind": "C"}]}
//! ```
//!
//! User errors, index corruption and parse failures are answered with an
//! error response and the loop continues. A fatal error is answered the
//! same way and then ends the loop unless `keep_alive` is set.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, warn};
use tugimport_core::config::SessionConfig;
use tugimport_core::error::{TugImportError, TugImportResult};
use tugimport_core::output::{
    emit_response_compact, ErrorResponse, IndexResponse, InsertImportResponse, ItemsResponse,
    ProgressEvent, Reply,
};

use crate::session::ImportSession;

/// Process exit code after a fatal error ends the request loop.
pub const FATAL_EXIT_CODE: u8 = 102;

// ============================================================================
// Requests
// ============================================================================

/// Errors in the request envelope itself.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("malformed request: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("empty request id")]
    MissingId,
}

/// Every operation a client can ask for.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    Configure(Box<SessionConfig>),
    RebuildIndex,
    ChangeFiles {
        files: Vec<PathBuf>,
    },
    GetSymbols {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    InsertImport {
        source_file: PathBuf,
        #[serde(default)]
        module: Option<String>,
        symbol: String,
    },
    #[serde(rename_all = "camelCase")]
    ImportSuggestions {
        source_file: PathBuf,
        unresolved_name: String,
    },
}

/// Successful payloads.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Index(IndexResponse),
    Items(ItemsResponse),
    InsertImport(InsertImportResponse),
}

/// Split one input line into its request id and request.
///
/// The id is returned whenever it can be read, so even a malformed request
/// gets an answer its sender can match.
pub fn parse_line(line: &str) -> (Option<String>, Result<Request, RequestError>) {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => return (None, Err(e.into())),
    };
    let id = match value.get("requestId") {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };
    if id.is_none() {
        return (None, Err(RequestError::MissingId));
    }
    (id, serde_json::from_value(value).map_err(RequestError::from))
}

/// Run one request against the session.
pub fn dispatch(
    session: &mut ImportSession,
    request: Request,
    progress: &mut dyn FnMut(ProgressEvent),
) -> TugImportResult<Response> {
    match request {
        Request::Configure(config) => session.configure(*config, progress).map(Response::Index),
        Request::RebuildIndex => session.rebuild_index(progress).map(Response::Index),
        Request::ChangeFiles { files } => {
            session.change_files(&files, progress).map(Response::Index)
        }
        Request::GetSymbols { text } => session.get_symbols(&text).map(Response::Items),
        Request::InsertImport {
            source_file,
            module,
            symbol,
        } => session
            .insert_import(&source_file, module.as_deref(), &symbol)
            .map(Response::InsertImport),
        Request::ImportSuggestions {
            source_file,
            unresolved_name,
        } => session
            .import_suggestions(&source_file, &unresolved_name)
            .map(Response::Items),
    }
}

// ============================================================================
// Serve loop
// ============================================================================

/// Options of the request loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServeOptions {
    /// Keep serving after a fatal error.
    pub keep_alive: bool,
}

/// Why the request loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeExit {
    EndOfInput,
    Fatal,
}

/// Answer requests from `input` on `output` until input ends or a fatal
/// error stops the loop.
pub fn serve<R: BufRead, W: Write>(
    input: R,
    output: &mut W,
    options: ServeOptions,
) -> io::Result<ServeExit> {
    let mut session = ImportSession::new();

    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let (id, request) = parse_line(&line);

        let result = request.map_err(TugImportError::from).and_then(|request| {
            debug!(?request, "dispatching request");
            let mut progress = |event: ProgressEvent| {
                if let Err(e) = emit_response_compact(&event, &mut *output) {
                    debug!("failed to emit progress: {}", e);
                }
            };
            dispatch(&mut session, request, &mut progress)
        });

        match result {
            Ok(payload) => {
                let reply = Reply {
                    id: id.as_deref().unwrap_or_default(),
                    payload,
                };
                emit_response_compact(&reply, &mut *output)?;
            }
            Err(err) => {
                let response = ErrorResponse::from_error(id.as_deref(), &err);
                emit_response_compact(&response, &mut *output)?;
                if err.kind().is_recoverable() {
                    warn!(kind = %err.kind(), "request failed: {}", err);
                } else {
                    error!(context = ?err.context(), "fatal error: {}", err);
                    if !options.keep_alive {
                        return Ok(ServeExit::Fatal);
                    }
                }
            }
        }
    }
    Ok(ServeExit::EndOfInput)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod parsing {
        use super::*;

        #[test]
        fn numeric_and_string_ids() {
            let (id, request) = parse_line(r#"{"requestId": 7, "action": "rebuildIndex"}"#);
            assert_eq!(id.as_deref(), Some("7"));
            assert_eq!(request.unwrap(), Request::RebuildIndex);

            let (id, request) =
                parse_line(r#"{"requestId": "a1", "action": "getSymbols", "text": "Ord"}"#);
            assert_eq!(id.as_deref(), Some("a1"));
            assert_eq!(
                request.unwrap(),
                Request::GetSymbols {
                    text: "Ord".to_string()
                }
            );
        }

        #[test]
        fn missing_id_is_rejected() {
            let (id, request) = parse_line(r#"{"action": "rebuildIndex"}"#);
            assert_eq!(id, None);
            assert!(matches!(request, Err(RequestError::MissingId)));
            let (_, request) = parse_line(r#"{"requestId": "", "action": "rebuildIndex"}"#);
            assert!(matches!(request, Err(RequestError::MissingId)));
        }

        #[test]
        fn unknown_action_keeps_the_id() {
            let (id, request) = parse_line(r#"{"requestId": 3, "action": "explode"}"#);
            assert_eq!(id.as_deref(), Some("3"));
            assert!(matches!(request, Err(RequestError::Malformed(_))));
        }

        #[test]
        fn configure_carries_the_config() {
            let (_, request) = parse_line(
                r#"{"requestId": 1, "action": "configure", "paths": ["/w"], "skipTest": false,
                    "style": {"multiline": "parentheses", "maxColumns": 100}}"#,
            );
            let Request::Configure(config) = request.unwrap() else {
                panic!("expected configure");
            };
            assert_eq!(config.paths, vec![PathBuf::from("/w")]);
            assert!(!config.skip_test);
            assert_eq!(config.style.max_columns, 100);
        }

        #[test]
        fn insert_import_module_is_optional() {
            let (_, request) = parse_line(
                r#"{"requestId": 1, "action": "insertImport", "sourceFile": "/w/a.py", "symbol": "os"}"#,
            );
            assert_eq!(
                request.unwrap(),
                Request::InsertImport {
                    source_file: PathBuf::from("/w/a.py"),
                    module: None,
                    symbol: "os".to_string(),
                }
            );
        }
    }

    mod serving {
        use super::*;

        fn run(input: &str, options: ServeOptions) -> (ServeExit, Vec<Value>) {
            let mut out = Vec::new();
            let exit = serve(input.as_bytes(), &mut out, options).unwrap();
            let lines = String::from_utf8(out)
                .unwrap()
                .lines()
                .map(|l| serde_json::from_str(l).unwrap())
                .collect();
            (exit, lines)
        }

        #[test]
        fn user_errors_keep_the_loop_alive() {
            let input = "{\"requestId\": 1, \"action\": \"getSymbols\", \"text\": \"foo\"}\n\
                         not json\n\
                         {\"requestId\": 2, \"action\": \"rebuildIndex\"}\n";
            let (exit, lines) = run(input, ServeOptions::default());
            assert_eq!(exit, ServeExit::EndOfInput);
            assert_eq!(lines.len(), 3);
            assert_eq!(lines[0]["id"], "1");
            assert_eq!(lines[0]["error"], true);
            assert_eq!(lines[0]["code"], 2);
            assert!(lines[1].get("id").is_none());
            assert_eq!(lines[2]["id"], "2");
        }
    }
}
