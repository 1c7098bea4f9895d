//! Import session: the public operation surface.
//!
//! An [`ImportSession`] starts unconfigured. `configure` validates the
//! configuration once, probes the Python runtime, and either reuses the
//! persisted index for the workspace or rebuilds it. Every other operation
//! requires a configured session and returns a `UserError` otherwise.
//!
//! Index writes follow the store's single-writer discipline: a batch is
//! committed as a whole, and any failure inside the batch abandons it so a
//! fatal error never leaves a partial commit behind.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use tracing::{info, warn};
use tugimport_core::checksum::ChecksumInputs;
use tugimport_core::config::{SessionConfig, StyleConfig};
use tugimport_core::error::{TugImportError, TugImportResult};
use tugimport_core::output::{
    IndexResponse, InsertImportResponse, ItemsResponse, ProgressEvent, SymbolItem,
};
use tugimport_core::store::{IndexStore, StoreResult, DEFAULT_SEARCH_LIMIT};
use tugimport_core::types::LocationLookup;
use tugimport_python::env::RuntimeInfo;
use tugimport_python::imports::Imports;
use tugimport_python::indexer::{build, BuildOptions, BuildScope};
use tugimport_python::resolver::resolve_source;

/// Minimum length of a search or suggestion query.
pub const MIN_QUERY_LEN: usize = 2;

const PACKAGE_MARKER: &str = "__init__.py";

/// State that exists once `configure` succeeded.
struct Configured {
    config: SessionConfig,
    /// Build inputs with [`BuildScope::Full`]; other scopes are derived.
    base: BuildOptions,
    store: IndexStore,
}

impl Configured {
    fn options(&self, scope: BuildScope) -> BuildOptions {
        BuildOptions {
            scope,
            ..self.base.clone()
        }
    }
}

/// One editor session over one workspace.
#[derive(Default)]
pub struct ImportSession {
    state: Option<Configured>,
}

impl ImportSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_configured(&self) -> bool {
        self.state.is_some()
    }

    /// The validated configuration, once configured.
    pub fn config(&self) -> Option<&SessionConfig> {
        self.state.as_ref().map(|s| &s.config)
    }

    fn configured(&self) -> TugImportResult<&Configured> {
        self.state
            .as_ref()
            .ok_or_else(|| TugImportError::user("session is not configured: run configure first"))
    }

    fn configured_mut(&mut self) -> TugImportResult<&mut Configured> {
        self.state
            .as_mut()
            .ok_or_else(|| TugImportError::user("session is not configured: run configure first"))
    }

    // ========================================================================
    // Index lifecycle
    // ========================================================================

    /// Validate `config`, then reuse the persisted index when its staleness
    /// checksum still matches a quick scan of the roots, or rebuild it.
    pub fn configure(
        &mut self,
        config: SessionConfig,
        progress: &mut dyn FnMut(ProgressEvent),
    ) -> TugImportResult<IndexResponse> {
        if self.state.is_some() {
            return Err(TugImportError::user(
                "session is already configured: restart to reconfigure",
            ));
        }
        config.validate()?;

        let runtime = if config.use_runtime_paths {
            RuntimeInfo::detect(config.python_path.as_deref())
        } else {
            RuntimeInfo::unavailable()
        };
        let roots = config.root_paths();
        let inputs = ChecksumInputs::new(
            roots
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
            runtime.version.clone(),
        );
        let mut store = IndexStore::new(&config.data_dir()?, &config.identity(), inputs)?;
        let base = BuildOptions {
            roots,
            runtime,
            blacklist: config.blacklist()?,
            scope: BuildScope::Full,
            weights: config.weights.clone(),
        };

        let scan = {
            let mut report = |count: usize| progress(ProgressEvent::scan(count));
            build(
                &BuildOptions {
                    scope: BuildScope::CountOnly,
                    ..base.clone()
                },
                Some(&mut report),
            )
        };
        let status = store.open(scan.total_files)?;
        info!(
            workspace = %config.workspace_name,
            files = scan.total_files,
            reused = status.is_found(),
            "session configured"
        );
        self.state = Some(Configured {
            config,
            base,
            store,
        });

        let result = if status.is_found() {
            self.configured()
                .and_then(|state| state.store.document_count().map_err(TugImportError::from))
                .map(|docs_count| IndexResponse {
                    success: true,
                    docs_count,
                    parse_failures: 0,
                    reused: Some(true),
                })
        } else {
            self.rebuild_index(progress).map(|response| IndexResponse {
                reused: Some(false),
                ..response
            })
        };
        // A session whose index never became usable stays unconfigured.
        if let Err(err) = &result {
            warn!(kind = %err.kind(), "configure failed: {}", err);
            self.state = None;
        }
        result
    }

    /// Discard the persisted index and build it from scratch.
    pub fn rebuild_index(
        &mut self,
        progress: &mut dyn FnMut(ProgressEvent),
    ) -> TugImportResult<IndexResponse> {
        let state = self.configured_mut()?;
        state.store.recreate()?;

        let outcome = {
            let mut report = |count: usize| progress(ProgressEvent::scan(count));
            build(&state.options(BuildScope::Full), Some(&mut report))
        };
        let documents = outcome.tree.flatten(&state.base.weights, None);
        let power = outcome.tree.power().max(1);

        write_batch(&mut state.store, |store| {
            let mut report = |count: usize| progress(ProgressEvent::indexing(count * 100 / power));
            store.append(&documents, Some(&mut report))?;
            store.commit(Some(outcome.total_files))
        })?;
        progress(ProgressEvent::indexing(100));

        let docs_count = state.store.document_count()?;
        info!(
            docs_count,
            files = outcome.total_files,
            failures = outcome.parse_failures(),
            "index rebuilt"
        );
        Ok(IndexResponse {
            success: true,
            docs_count,
            parse_failures: outcome.parse_failures(),
            reused: None,
        })
    }

    /// Re-index the given files.
    ///
    /// A changed `__init__.py` re-indexes its whole package. Documents of
    /// re-parsed files are replaced; documents of files that no longer
    /// exist are removed.
    pub fn change_files(
        &mut self,
        files: &[PathBuf],
        progress: &mut dyn FnMut(ProgressEvent),
    ) -> TugImportResult<IndexResponse> {
        let state = self.configured_mut()?;
        if files.is_empty() {
            return Err(TugImportError::user("changeFiles requires at least one file"));
        }

        let mut prefixes = Vec::new();
        let mut vanished = BTreeSet::new();
        for file in files {
            let path = file.to_string_lossy().into_owned();
            if !file.exists() {
                vanished.insert(path.clone());
            }
            if file.file_name().is_some_and(|name| name == PACKAGE_MARKER) {
                if let Some(package) = file.parent() {
                    prefixes.push(format!("{}{}", package.display(), MAIN_SEPARATOR));
                }
            }
            prefixes.push(path);
        }

        let outcome = {
            let mut report = |count: usize| progress(ProgressEvent::scan(count));
            build(
                &state.options(BuildScope::Incremental(prefixes)),
                Some(&mut report),
            )
        };
        let documents = outcome
            .tree
            .flatten(&state.base.weights, Some(&outcome.affected_files));
        let stale: BTreeSet<&str> = outcome
            .affected_files
            .iter()
            .chain(&vanished)
            .map(String::as_str)
            .collect();

        write_batch(&mut state.store, |store| {
            let removed = store.remove_by_filename(stale.iter().copied())?;
            let added = store.append(&documents, None)?;
            info!(removed, added, "incremental index update");
            store.commit(Some(outcome.total_files))
        })?;

        Ok(IndexResponse {
            success: true,
            docs_count: state.store.document_count()?,
            parse_failures: outcome.parse_failures(),
            reused: None,
        })
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Best-scoring symbols whose name contains `text`.
    pub fn get_symbols(&self, text: &str) -> TugImportResult<ItemsResponse> {
        let state = self.configured()?;
        check_query(text)?;
        search_items(&state.store, text)
    }

    /// Compute the edit that adds `from module import symbol`, or
    /// `import symbol` when `module` is absent, to `source_file`.
    pub fn insert_import(
        &self,
        source_file: &Path,
        module: Option<&str>,
        symbol: &str,
    ) -> TugImportResult<InsertImportResponse> {
        let state = self.configured()?;
        let source = read_source(source_file)?;
        plan_insert(&source, &state.store, module, symbol, &state.config.style)
    }

    /// Symbols that could satisfy `unresolved_name` in `source_file`.
    pub fn import_suggestions(
        &self,
        source_file: &Path,
        unresolved_name: &str,
    ) -> TugImportResult<ItemsResponse> {
        let state = self.configured()?;
        check_query(unresolved_name)?;

        let source = read_source(source_file)?;
        let resolution = resolve_source(&source).map_err(|e| TugImportError::ParseFailure {
            path: source_file.to_path_buf(),
            message: e.to_string(),
        })?;
        let unresolved: BTreeSet<&str> = resolution
            .unresolved
            .iter()
            .flat_map(|name| name.split('.'))
            .collect();
        if !unresolved.contains(unresolved_name) {
            return Err(TugImportError::user(format!(
                "'{}' is not unresolved in {}",
                unresolved_name,
                source_file.display()
            )));
        }
        search_items(&state.store, unresolved_name)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Merge one import into `source`'s import block and describe the edit.
pub fn plan_insert(
    source: &str,
    lookup: &dyn LocationLookup,
    module: Option<&str>,
    symbol: &str,
    style: &StyleConfig,
) -> TugImportResult<InsertImportResponse> {
    if symbol.is_empty() {
        return Err(TugImportError::user("empty symbol"));
    }
    let mut imports = Imports::parse(source, lookup)?;
    match module.filter(|m| !m.is_empty()) {
        Some(module) => imports.add_import_from(module, symbol),
        None => imports.add_import(symbol),
    }
    let update = imports.update(style);
    Ok(InsertImportResponse {
        from_line: update.start_line,
        end_line: update.end_line,
        text: update.text,
        diff: update.edits,
    })
}

/// Read a source file, replacing invalid UTF-8.
pub fn read_source(path: &Path) -> TugImportResult<String> {
    if path.as_os_str().is_empty() {
        return Err(TugImportError::user("empty sourceFile"));
    }
    let bytes = fs::read(path)
        .map_err(|e| TugImportError::user(format!("cannot read {}: {}", path.display(), e)))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn check_query(text: &str) -> TugImportResult<()> {
    if text.chars().count() < MIN_QUERY_LEN {
        return Err(TugImportError::user(format!(
            "query must be at least {} characters",
            MIN_QUERY_LEN
        )));
    }
    Ok(())
}

fn search_items(store: &IndexStore, text: &str) -> TugImportResult<ItemsResponse> {
    let items = store
        .search(text, DEFAULT_SEARCH_LIMIT)?
        .iter()
        .map(SymbolItem::from)
        .collect();
    Ok(ItemsResponse { items })
}

/// Run one write batch, abandoning it when any step fails.
fn write_batch(
    store: &mut IndexStore,
    batch: impl FnOnce(&mut IndexStore) -> StoreResult<()>,
) -> TugImportResult<()> {
    match batch(store) {
        Ok(()) => Ok(()),
        Err(err) => {
            if let Err(rollback) = store.abandon() {
                warn!("failed to abandon index batch: {}", rollback);
            }
            Err(err.into())
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
