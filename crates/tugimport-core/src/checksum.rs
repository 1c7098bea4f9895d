//! Workspace identity and staleness checksum.
//!
//! A persisted index is keyed by a short hash of the workspace name and is
//! reused only when its staleness checksum matches the current one.

use sha2::{Digest, Sha256};

/// Version of the persisted document schema. Bump when the document layout
/// or the flattening rules change.
pub const INDEX_SCHEMA_VERSION: u32 = 1;

/// Number of hex characters in a workspace identity.
const IDENTITY_LEN: usize = 8;

/// Directory name identifying a workspace: the first 8 hex characters of the
/// SHA-256 of its human-readable name.
pub fn workspace_identity(workspace_name: &str) -> String {
    let digest = Sha256::digest(workspace_name.as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(IDENTITY_LEN);
    id
}

/// Inputs that decide whether a persisted index is still valid, apart from
/// the file count which is only known after a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumInputs {
    /// Configured root paths, in configuration order.
    pub paths: Vec<String>,
    /// Version string of the language runtime.
    pub runtime_version: String,
    pub schema_version: u32,
}

impl ChecksumInputs {
    pub fn new(paths: Vec<String>, runtime_version: impl Into<String>) -> Self {
        ChecksumInputs {
            paths,
            runtime_version: runtime_version.into(),
            schema_version: INDEX_SCHEMA_VERSION,
        }
    }

    /// Hex SHA-256 of `paths+version+schema+count`.
    pub fn checksum(&self, file_count: usize) -> String {
        let material = format!(
            "{}+{}+{}+{}",
            self.paths.join("+"),
            self.runtime_version,
            self.schema_version,
            file_count
        );
        hex::encode(Sha256::digest(material.as_bytes()))
    }
}
