//! Session configuration.
//!
//! A [`SessionConfig`] is deserialized once from the `configure` payload,
//! validated eagerly, and then treated as immutable for the rest of the
//! session. Components receive it (or pieces of it) by reference.

use std::path::{Path, PathBuf};

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::checksum::workspace_identity;
use crate::types::ScoreWeights;

/// Smallest accepted `maxColumns`.
pub const MIN_MAX_COLUMNS: usize = 20;

/// Directory under the user cache dir used when no `tempPath` is given.
const DATA_DIR_NAME: &str = "tugimport";

// ============================================================================
// Error Types
// ============================================================================

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Neither `paths` nor `workspacePath` name a root to index.
    #[error("empty paths: configure at least one root path")]
    NoRootPaths,

    #[error("maxColumns must be at least {MIN_MAX_COLUMNS}, got {0}")]
    MaxColumnsTooSmall(usize),

    /// No `tempPath` and no platform cache directory.
    #[error("no data directory: set tempPath")]
    NoDataDir,

    /// An ignore-folder entry produced an invalid pattern.
    #[error("invalid ignore pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Payload did not match the configuration schema.
    #[error("invalid configuration: {0}")]
    Invalid(#[from] serde_json::Error),
}

// ============================================================================
// Style
// ============================================================================

/// How an import line exceeding `maxColumns` is continued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MultilineMode {
    /// Trailing `\` with a hanging indent.
    #[default]
    Backslash,
    /// `(` ... `)` grid wrapping.
    Parentheses,
}

/// Import rendering style.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StyleConfig {
    pub multiline: MultilineMode,
    pub max_columns: usize,
    pub indent_with_tabs: bool,
}

impl Default for StyleConfig {
    fn default() -> Self {
        StyleConfig {
            multiline: MultilineMode::Backslash,
            max_columns: 79,
            indent_with_tabs: false,
        }
    }
}

impl StyleConfig {
    /// Indentation used for continuation lines.
    pub fn indent_unit(&self) -> &'static str {
        if self.indent_with_tabs {
            "\t"
        } else {
            "    "
        }
    }
}

// ============================================================================
// Session Configuration
// ============================================================================

/// Everything a session needs to know, as sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// Root paths to index, in priority order.
    pub paths: Vec<PathBuf>,
    /// Folder names whose files are never indexed.
    pub ignore_folders: Vec<String>,
    /// Skip anything that looks like a test module or directory.
    pub skip_test: bool,
    /// Data directory for persisted indexes.
    pub temp_path: Option<PathBuf>,
    /// Used as the single root when `paths` is empty.
    pub workspace_path: Option<PathBuf>,
    pub workspace_name: String,
    /// Interpreter used for runtime discovery.
    pub python_path: Option<PathBuf>,
    /// Also index the interpreter's own search paths.
    pub use_runtime_paths: bool,
    pub style: StyleConfig,
    pub weights: ScoreWeights,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            paths: Vec::new(),
            ignore_folders: Vec::new(),
            skip_test: true,
            temp_path: None,
            workspace_path: None,
            workspace_name: "default".to_string(),
            python_path: None,
            use_runtime_paths: true,
            style: StyleConfig::default(),
            weights: ScoreWeights::default(),
        }
    }
}

impl SessionConfig {
    /// Deserialize and validate a `configure` payload.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        let config: SessionConfig = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Fail fast on settings no component can work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.root_paths().is_empty() {
            return Err(ConfigError::NoRootPaths);
        }
        if self.style.max_columns < MIN_MAX_COLUMNS {
            return Err(ConfigError::MaxColumnsTooSmall(self.style.max_columns));
        }
        self.blacklist()?;
        Ok(())
    }

    /// Configured roots, falling back to the workspace path.
    pub fn root_paths(&self) -> Vec<PathBuf> {
        if !self.paths.is_empty() {
            return self.paths.clone();
        }
        self.workspace_path.iter().cloned().collect()
    }

    /// Directory holding persisted indexes for all workspaces.
    pub fn data_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.temp_path {
            Some(path) => Ok(path.clone()),
            None => dirs::cache_dir()
                .map(|dir| dir.join(DATA_DIR_NAME))
                .ok_or(ConfigError::NoDataDir),
        }
    }

    /// Short hash identifying this workspace's store.
    pub fn identity(&self) -> String {
        workspace_identity(&self.workspace_name)
    }

    /// Pattern of filenames the index builder skips.
    pub fn blacklist(&self) -> Result<Regex, ConfigError> {
        build_blacklist(self.skip_test, &self.ignore_folders)
    }
}

/// Build the skip pattern from the "skip tests" flag and ignore folders.
///
/// With nothing to skip the pattern only matches the empty string, so it
/// never matches a real filename.
pub fn build_blacklist(skip_test: bool, ignore_folders: &[String]) -> Result<Regex, ConfigError> {
    let mut alternatives = Vec::new();
    if skip_test {
        alternatives.push(r"\btest[s]?|test[s]?\b".to_string());
    }
    for folder in ignore_folders.iter().filter(|f| !f.is_empty()) {
        alternatives.push(format!(r"\b{}\b", regex::escape(folder)));
    }
    if alternatives.is_empty() {
        return Ok(Regex::new("^$")?);
    }
    Ok(RegexBuilder::new(&alternatives.join("|"))
        .case_insensitive(true)
        .build()?)
}

/// True when `path` should be skipped according to `blacklist`.
pub fn is_blacklisted(blacklist: &Regex, path: &Path) -> bool {
    blacklist.is_match(&path.to_string_lossy())
}

// ============================================================================
// Tests
// ============================================================================
