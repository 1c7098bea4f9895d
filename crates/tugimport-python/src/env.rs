//! Python runtime discovery.
//!
//! The index covers the workspace roots plus whatever the interpreter would
//! import from. This module finds an interpreter and asks it for its search
//! path, version string, standard library directories and builtin module
//! names.
//!
//! ## Resolution Order
//!
//! 1. Explicit `pythonPath` from the session configuration
//! 2. `$TUGIMPORT_PYTHON` environment variable
//! 3. `$VIRTUAL_ENV/bin/python` (user's active venv)
//! 4. `python3`/`python` from `$PATH`
//!
//! Discovery failure is not an error for the session: it degrades to
//! [`RuntimeInfo::unavailable`] so workspace-only indexing keeps working.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

/// Upper bound on how long the interpreter may take to answer.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Version string used when no interpreter is available.
pub const UNKNOWN_VERSION: &str = "unknown";

#[cfg(windows)]
const VENV_BIN_DIR: &str = "Scripts";
#[cfg(not(windows))]
const VENV_BIN_DIR: &str = "bin";

const PYTHON_NAMES: [&str; 2] = ["python3", "python"];

const PROBE_SCRIPT: &str = r#"
import json, sys, sysconfig
paths = sysconfig.get_paths()
print(json.dumps({
    "version": sys.version,
    "searchPaths": [p for p in sys.path if p],
    "stdlibDirs": [d for d in {paths.get("stdlib"), paths.get("platstdlib")} if d],
    "builtinModules": sorted(sys.builtin_module_names),
}))
"#;

// ============================================================================
// Error Types
// ============================================================================

/// Errors from interpreter discovery and probing.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// No interpreter found in any location.
    #[error("no Python interpreter found (searched: {})", .searched.join(", "))]
    NotFound { searched: Vec<String> },

    /// The interpreter could not be started.
    #[error("failed to execute Python at {}: {reason}", .path.display())]
    ExecutionFailed { path: PathBuf, reason: String },

    /// The interpreter did not answer in time.
    #[error("Python at {} did not answer within {}s", .path.display(), .timeout.as_secs())]
    Timeout { path: PathBuf, timeout: Duration },

    /// The probe output was not the expected JSON.
    #[error("unexpected probe output: {0}")]
    BadOutput(#[from] serde_json::Error),
}

// ============================================================================
// Runtime Info
// ============================================================================

/// Where the interpreter was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    Config,
    EnvTugImportPython,
    VirtualEnv,
    Path,
}

/// What the interpreter reported about itself.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeInfo {
    /// Full version string, part of the staleness checksum.
    pub version: String,
    /// Implicit import roots.
    pub search_paths: Vec<PathBuf>,
    /// Standard library directories, for the location heuristic.
    pub stdlib_dirs: Vec<PathBuf>,
    /// Modules compiled into the interpreter.
    pub builtin_modules: Vec<String>,
}

impl RuntimeInfo {
    /// Placeholder used when no interpreter is available or wanted.
    pub fn unavailable() -> Self {
        RuntimeInfo {
            version: UNKNOWN_VERSION.to_string(),
            ..RuntimeInfo::default()
        }
    }

    /// Discover an interpreter and probe it, degrading to
    /// [`RuntimeInfo::unavailable`] on failure.
    pub fn detect(python_path: Option<&Path>) -> Self {
        match find_python(python_path).and_then(|(path, source)| {
            debug!(python = %path.display(), ?source, "probing Python runtime");
            probe(&path, PROBE_TIMEOUT)
        }) {
            Ok(info) => {
                info!(
                    version = %info.version.lines().next().unwrap_or(""),
                    search_paths = info.search_paths.len(),
                    "Python runtime detected"
                );
                info
            }
            Err(e) => {
                warn!("Python runtime unavailable, indexing workspace only: {}", e);
                RuntimeInfo::unavailable()
            }
        }
    }
}

/// Locate an interpreter following the resolution order.
pub fn find_python(explicit: Option<&Path>) -> Result<(PathBuf, ResolutionSource), RuntimeError> {
    let mut searched = Vec::new();

    if let Some(path) = explicit {
        if path.exists() {
            return Ok((path.to_path_buf(), ResolutionSource::Config));
        }
        return Err(RuntimeError::ExecutionFailed {
            path: path.to_path_buf(),
            reason: "path does not exist".to_string(),
        });
    }

    if let Ok(value) = std::env::var("TUGIMPORT_PYTHON") {
        let path = PathBuf::from(value);
        if path.exists() {
            return Ok((path, ResolutionSource::EnvTugImportPython));
        }
        searched.push(format!("$TUGIMPORT_PYTHON ({})", path.display()));
    } else {
        searched.push("$TUGIMPORT_PYTHON (not set)".to_string());
    }

    if let Ok(venv) = std::env::var("VIRTUAL_ENV") {
        for name in PYTHON_NAMES {
            let path = Path::new(&venv).join(VENV_BIN_DIR).join(name);
            if path.exists() {
                return Ok((path, ResolutionSource::VirtualEnv));
            }
        }
        searched.push(format!("$VIRTUAL_ENV ({})", venv));
    } else {
        searched.push("$VIRTUAL_ENV (not set)".to_string());
    }

    for name in PYTHON_NAMES {
        if let Ok(path) = which::which(name) {
            return Ok((path, ResolutionSource::Path));
        }
    }
    searched.push("$PATH (python3/python)".to_string());

    Err(RuntimeError::NotFound { searched })
}

/// Run the probe script under `python` with a bounded wait.
pub fn probe(python: &Path, timeout: Duration) -> Result<RuntimeInfo, RuntimeError> {
    let failed = |reason: String| RuntimeError::ExecutionFailed {
        path: python.to_path_buf(),
        reason,
    };

    let mut child = Command::new(python)
        .args(["-c", PROBE_SCRIPT])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| failed(e.to_string()))?;

    let status = match child.wait_timeout(timeout).map_err(|e| failed(e.to_string()))? {
        Some(status) => status,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(RuntimeError::Timeout {
                path: python.to_path_buf(),
                timeout,
            });
        }
    };
    if !status.success() {
        return Err(failed(format!("probe exited with {}", status)));
    }

    let mut stdout = Vec::new();
    if let Some(mut out) = child.stdout.take() {
        out.read_to_end(&mut stdout)
            .map_err(|e| failed(e.to_string()))?;
    }
    parse_probe_output(&stdout)
}

fn parse_probe_output(stdout: &[u8]) -> Result<RuntimeInfo, RuntimeError> {
    Ok(serde_json::from_slice(stdout)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_has_unknown_version() {
        let info = RuntimeInfo::unavailable();
        assert_eq!(info.version, UNKNOWN_VERSION);
        assert!(info.search_paths.is_empty());
        assert!(info.builtin_modules.is_empty());
    }

    #[test]
    fn parses_probe_output() {
        let out = br#"{"version": "3.12.1 (main)", "searchPaths": ["/usr/lib/python3.12"],
            "stdlibDirs": ["/usr/lib/python3.12"], "builtinModules": ["sys", "time"]}"#;
        let info = parse_probe_output(out).unwrap();
        assert_eq!(info.version, "3.12.1 (main)");
        assert_eq!(info.stdlib_dirs, vec![PathBuf::from("/usr/lib/python3.12")]);
        assert_eq!(info.builtin_modules, vec!["sys", "time"]);
    }

    #[test]
    fn garbage_probe_output_is_an_error() {
        assert!(matches!(
            parse_probe_output(b"Python 2.7"),
            Err(RuntimeError::BadOutput(_))
        ));
    }

    #[test]
    fn missing_explicit_interpreter_is_an_error() {
        let err = find_python(Some(Path::new("/definitely/not/python"))).unwrap_err();
        assert!(matches!(err, RuntimeError::ExecutionFailed { .. }));
    }

    #[test]
    fn probe_integration() {
        // Only meaningful when an interpreter is installed.
        if let Ok(python) = which::which("python3") {
            let info = probe(&python, PROBE_TIMEOUT).unwrap();
            assert!(info.version.starts_with('3'));
            assert!(info.builtin_modules.iter().any(|m| m == "sys"));
        }
    }
}
