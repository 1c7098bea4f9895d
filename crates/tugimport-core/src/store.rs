//! Persistent document store for the symbol index.
//!
//! One store exists per workspace identity, under `<data_dir>/<identity>/`:
//!
//! ```text
//! <data_dir>/<identity>/
//!   index.sqlite3     flattened IndexDocuments (WAL mode)
//!   checksum.json     staleness record written on commit
//! ```
//!
//! # Writer Discipline
//!
//! The store keeps two connections to the same database. All mutations go
//! through the writer connection inside a single explicit transaction that
//! is opened lazily by the first `append`/`remove_by_filename` and closed by
//! [`IndexStore::commit`] or [`IndexStore::abandon`]. Queries run on the
//! reader connection and therefore only ever observe committed documents.
//!
//! # Staleness
//!
//! [`IndexStore::open`] never fails because of a damaged or outdated store.
//! Every such condition is reported as [`OpenStatus::NotFound`] and the
//! caller is expected to [`IndexStore::recreate`] and rebuild.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use rusqlite::{params, Connection, ErrorCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::checksum::ChecksumInputs;
use crate::progress::ProgressThrottle;
use crate::types::{IndexDocument, Location, LocationLookup, SymbolKind};

/// Default number of results returned by [`IndexStore::search`].
pub const DEFAULT_SEARCH_LIMIT: usize = 50;

const DB_FILE: &str = "index.sqlite3";
const CHECKSUM_FILE: &str = "checksum.json";

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised by the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store has not been opened or recreated yet.
    #[error("index store is not open")]
    NotOpen,

    /// `commit` was called without any pending write.
    #[error("commit called with no pending writer")]
    NoPendingWriter,

    /// A stored row could not be decoded.
    #[error("invalid stored document: {0}")]
    InvalidDocument(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether the error means the database itself is damaged, as opposed
    /// to a misuse or an environment failure.
    pub fn is_corruption(&self) -> bool {
        match self {
            StoreError::InvalidDocument(_) => true,
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase
            ),
            _ => false,
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

// ============================================================================
// Open Status
// ============================================================================

/// Why a persisted store could not be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundReason {
    /// No staleness record exists (first run or never committed).
    MissingChecksum,
    /// The staleness record could not be read or parsed.
    UnreadableChecksum,
    /// The stored checksum differs from the current one.
    StaleChecksum,
    /// The database failed to open or has an unexpected schema.
    CorruptStore,
}

/// Outcome of [`IndexStore::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenStatus {
    Found,
    NotFound(NotFoundReason),
}

impl OpenStatus {
    pub fn is_found(&self) -> bool {
        matches!(self, OpenStatus::Found)
    }
}

/// Staleness record persisted next to the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecksumRecord {
    pub checksum: String,
    pub schema_version: u32,
    pub runtime_version: String,
    pub total_files: usize,
    pub committed_at: String,
}

// ============================================================================
// Store
// ============================================================================

struct Connections {
    writer: Connection,
    reader: Connection,
}

/// SQLite-backed store of [`IndexDocument`]s for one workspace identity.
pub struct IndexStore {
    dir: PathBuf,
    inputs: ChecksumInputs,
    conns: Option<Connections>,
    writer_open: bool,
}

impl IndexStore {
    /// Prepare the store directory for `identity` under `data_dir`.
    ///
    /// Nothing is opened yet; call [`IndexStore::open`] or
    /// [`IndexStore::recreate`].
    pub fn new(data_dir: &Path, identity: &str, inputs: ChecksumInputs) -> StoreResult<Self> {
        let dir = data_dir.join(identity);
        fs::create_dir_all(&dir)?;
        Ok(IndexStore {
            dir,
            inputs,
            conns: None,
            writer_open: false,
        })
    }

    /// Directory holding this workspace's files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Checksum inputs this store validates against.
    pub fn inputs(&self) -> &ChecksumInputs {
        &self.inputs
    }

    /// Whether a write batch is pending.
    pub fn has_pending_writer(&self) -> bool {
        self.writer_open
    }

    /// Try to reuse the persisted store.
    ///
    /// `file_count` is the number of source files found by a quick scan; it
    /// is part of the staleness checksum.
    pub fn open(&mut self, file_count: usize) -> StoreResult<OpenStatus> {
        self.conns = None;
        self.writer_open = false;

        let expected = self.inputs.checksum(file_count);
        match self.read_checksum() {
            ChecksumRead::Missing => return Ok(self.not_found(NotFoundReason::MissingChecksum)),
            ChecksumRead::Unreadable => {
                return Ok(self.not_found(NotFoundReason::UnreadableChecksum))
            }
            ChecksumRead::Found(record) if record.checksum != expected => {
                debug!(
                    stored = %record.checksum,
                    expected = %expected,
                    "index checksum mismatch"
                );
                return Ok(self.not_found(NotFoundReason::StaleChecksum));
            }
            ChecksumRead::Found(_) => {}
        }

        match self.connect() {
            Ok(conns) => match verify_schema(&conns.reader) {
                Ok(()) => {
                    self.conns = Some(conns);
                    info!(dir = %self.dir.display(), "reusing persisted index");
                    Ok(OpenStatus::Found)
                }
                Err(e) => {
                    warn!("persisted index has an unexpected schema: {}", e);
                    Ok(self.not_found(NotFoundReason::CorruptStore))
                }
            },
            Err(e) => {
                warn!("persisted index failed to open: {}", e);
                Ok(self.not_found(NotFoundReason::CorruptStore))
            }
        }
    }

    fn not_found(&self, reason: NotFoundReason) -> OpenStatus {
        info!(?reason, dir = %self.dir.display(), "persisted index not usable");
        OpenStatus::NotFound(reason)
    }

    /// Destroy and reinitialize storage for this identity.
    pub fn recreate(&mut self) -> StoreResult<()> {
        // Close before deleting so no handle keeps the old files alive.
        self.conns = None;
        self.writer_open = false;

        for name in [
            DB_FILE.to_string(),
            format!("{}-wal", DB_FILE),
            format!("{}-shm", DB_FILE),
            CHECKSUM_FILE.to_string(),
        ] {
            let path = self.dir.join(name);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        let conns = self.connect()?;
        create_schema(&conns.writer)?;
        self.conns = Some(conns);
        info!(dir = %self.dir.display(), "index store recreated");
        Ok(())
    }

    fn connect(&self) -> StoreResult<Connections> {
        let path = self.dir.join(DB_FILE);
        let writer = Connection::open(&path)?;
        let _mode: String = writer.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        writer.busy_timeout(std::time::Duration::from_secs(5))?;
        let reader = Connection::open(&path)?;
        reader.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Connections { writer, reader })
    }

    fn conns(&self) -> StoreResult<&Connections> {
        self.conns.as_ref().ok_or(StoreError::NotOpen)
    }

    fn begin_write(&mut self) -> StoreResult<&Connection> {
        let open = self.writer_open;
        let conns = self.conns.as_ref().ok_or(StoreError::NotOpen)?;
        if !open {
            conns.writer.execute_batch("BEGIN IMMEDIATE")?;
            self.writer_open = true;
        }
        Ok(&conns.writer)
    }

    /// Append documents to the pending write batch.
    ///
    /// `progress` receives the running document count (throttled, plus one
    /// final report).
    pub fn append<'d, I>(
        &mut self,
        documents: I,
        progress: Option<&mut dyn FnMut(usize)>,
    ) -> StoreResult<usize>
    where
        I: IntoIterator<Item = &'d IndexDocument>,
    {
        let writer = self.begin_write()?;
        let mut throttle = ProgressThrottle::new(progress);
        {
            let mut stmt = writer.prepare_cached(
                "INSERT INTO documents \
                 (filename, symbol, search_key, module, location, kind, sort_score) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for doc in documents {
                stmt.execute(params![
                    doc.filename,
                    doc.symbol,
                    search_key(&doc.symbol),
                    doc.module,
                    doc.location.tag(),
                    doc.kind.code(),
                    doc.sort_score,
                ])?;
                throttle.tick();
            }
        }
        let added = throttle.finish();
        debug!(added, "documents appended");
        Ok(added)
    }

    /// Delete every document whose filename is exactly one of `filenames`.
    /// Returns the number of documents removed.
    pub fn remove_by_filename<'f, I>(&mut self, filenames: I) -> StoreResult<usize>
    where
        I: IntoIterator<Item = &'f str>,
    {
        let writer = self.begin_write()?;
        let mut stmt = writer.prepare_cached("DELETE FROM documents WHERE filename = ?1")?;
        let mut removed = 0;
        for filename in filenames {
            removed += stmt.execute(params![filename])?;
        }
        debug!(removed, "documents removed");
        Ok(removed)
    }

    /// Commit the pending write batch atomically.
    ///
    /// When `total_files` is given the staleness record is rewritten so a
    /// later [`IndexStore::open`] with the same inputs succeeds.
    pub fn commit(&mut self, total_files: Option<usize>) -> StoreResult<()> {
        if !self.writer_open {
            return Err(StoreError::NoPendingWriter);
        }
        let conns = self.conns()?;
        conns.writer.execute_batch("COMMIT")?;
        self.writer_open = false;

        if let Some(total) = total_files {
            let record = ChecksumRecord {
                checksum: self.inputs.checksum(total),
                schema_version: self.inputs.schema_version,
                runtime_version: self.inputs.runtime_version.clone(),
                total_files: total,
                committed_at: format_timestamp(SystemTime::now()),
            };
            let json = serde_json::to_vec_pretty(&record)?;
            atomic_write(&self.dir.join(CHECKSUM_FILE), &json)?;
        }
        info!(total_files = ?total_files, "index committed");
        Ok(())
    }

    /// Roll back the pending write batch, if any.
    pub fn abandon(&mut self) -> StoreResult<()> {
        if self.writer_open {
            let conns = self.conns()?;
            conns.writer.execute_batch("ROLLBACK")?;
            self.writer_open = false;
            warn!("pending index writes abandoned");
        }
        Ok(())
    }

    /// Case- and underscore-insensitive substring search on symbol names,
    /// best score first, ties in insertion order.
    pub fn search(&self, pattern: &str, limit: usize) -> StoreResult<Vec<IndexDocument>> {
        let key = search_key(pattern);
        if key.is_empty() {
            return Ok(Vec::new());
        }
        let conns = self.conns()?;
        let mut stmt = conns.reader.prepare_cached(
            "SELECT filename, symbol, module, location, kind, sort_score \
             FROM documents \
             WHERE instr(search_key, ?1) > 0 \
             ORDER BY sort_score DESC, id ASC \
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![key, limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?;

        let mut docs = Vec::new();
        for row in rows {
            let (filename, symbol, module, location, kind, sort_score) = row?;
            let kind: SymbolKind = kind.parse().map_err(StoreError::InvalidDocument)?;
            docs.push(IndexDocument {
                filename,
                symbol,
                module,
                location: Location::from_tag(&location),
                kind,
                sort_score,
            });
        }
        Ok(docs)
    }

    /// Location of the best-scoring document contained in `module_path`,
    /// third-party when the module is unknown.
    pub fn location_for(&self, module_path: &str) -> StoreResult<Location> {
        let conns = self.conns()?;
        let mut stmt = conns.reader.prepare_cached(
            "SELECT location FROM documents WHERE module = ?1 \
             ORDER BY sort_score DESC, id ASC LIMIT 1",
        )?;
        let mut rows = stmt.query(params![module_path])?;
        match rows.next()? {
            Some(row) => Ok(Location::from_tag(&row.get::<_, String>(0)?)),
            None => Ok(Location::ThirdParty),
        }
    }

    /// Number of committed documents.
    pub fn document_count(&self) -> StoreResult<usize> {
        let conns = self.conns()?;
        let count: i64 = conns
            .reader
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn read_checksum(&self) -> ChecksumRead {
        let path = self.dir.join(CHECKSUM_FILE);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return ChecksumRead::Missing,
            Err(e) => {
                warn!("cannot read {}: {}", path.display(), e);
                return ChecksumRead::Unreadable;
            }
        };
        match serde_json::from_slice::<ChecksumRecord>(&bytes) {
            Ok(record) => ChecksumRead::Found(record),
            Err(e) => {
                warn!("cannot parse {}: {}", path.display(), e);
                ChecksumRead::Unreadable
            }
        }
    }
}

impl LocationLookup for IndexStore {
    fn location_for(&self, module_path: &str) -> Location {
        match IndexStore::location_for(self, module_path) {
            Ok(location) => location,
            Err(e) => {
                warn!("location lookup for {} failed: {}", module_path, e);
                Location::ThirdParty
            }
        }
    }
}

enum ChecksumRead {
    Missing,
    Unreadable,
    Found(ChecksumRecord),
}

fn create_schema(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            filename TEXT NOT NULL,
            symbol TEXT NOT NULL,
            search_key TEXT NOT NULL,
            module TEXT NOT NULL,
            location TEXT NOT NULL,
            kind TEXT NOT NULL,
            sort_score INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_documents_filename ON documents(filename);
        CREATE INDEX IF NOT EXISTS idx_documents_module ON documents(module, sort_score DESC, id);
        CREATE INDEX IF NOT EXISTS idx_documents_rank ON documents(sort_score DESC, id);
        "#,
    )?;
    Ok(())
}

fn verify_schema(conn: &Connection) -> StoreResult<()> {
    conn.query_row(
        "SELECT filename, symbol, search_key, module, location, kind, sort_score \
         FROM documents LIMIT 1",
        [],
        |_| Ok(()),
    )
    .or_else(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => Ok(()),
        other => Err(other),
    })?;
    Ok(())
}

/// Normalized form used for matching: lowercase, underscores removed.
pub fn search_key(text: &str) -> String {
    text.chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Write content to a file atomically using temp + rename.
fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let temp_path = path.with_file_name(format!(
        ".{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id()
    ));
    fs::write(&temp_path, content)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

fn format_timestamp(time: SystemTime) -> String {
    use chrono::{DateTime, Utc};

    let datetime: DateTime<Utc> = time.into();
    datetime.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

// ============================================================================
// Tests
// ============================================================================
