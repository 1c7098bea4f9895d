//! Symbol index builder.
//!
//! Building runs in three phases:
//!
//! 1. **Walk** (sequential): list root directories, create package and
//!    extension-module nodes, count module files, report progress, and
//!    queue every Python source that needs parsing.
//! 2. **Parse** (parallel): read, parse and extract each queued module on
//!    the rayon pool. Jobs share nothing.
//! 3. **Assemble** (sequential): attach extracted symbols in walk order,
//!    record parse failures, and apply `__all__` export lists.
//!
//! A [`BuildScope`] decides which files are parsed. Incremental builds still
//! walk every root so package nodes and file counts stay correct, but only
//! files under one of the target prefixes are parsed and reported as
//! affected.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, warn};
use tugimport_core::config::is_blacklisted;
use tugimport_core::progress::ProgressThrottle;
use tugimport_core::types::{Location, LocationLookup, ScoreWeights, SymbolKind};
use walkdir::WalkDir;

use crate::env::RuntimeInfo;
use crate::extract::{extract_module, ExtractedSymbol, ModuleSymbols};
use crate::symbols::{NodeId, SymbolTree, ROOT};
use crate::syntax::{ParsedSource, SyntaxError};

/// Paths containing this marker belong to tugimport itself and are never
/// indexed.
pub const INSTALL_MARKER: &str = "tugimport-runtime";

const PACKAGE_MARKER: &str = "__init__.py";
const INIT_STEM: &str = "__init__";
const SOURCE_EXT: &str = "py";
const EXTENSION_EXTS: [&str; 2] = ["so", "pyd"];
const THIRD_PARTY_DIRS: [&str; 2] = ["site-packages", "dist-packages"];

// ============================================================================
// Error Types
// ============================================================================

/// Per-file failures recorded during a build. None of them stop the build.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: SyntaxError,
    },
}

impl BuildError {
    pub fn path(&self) -> &Path {
        match self {
            BuildError::Read { path, .. } | BuildError::Parse { path, .. } => path,
        }
    }
}

// ============================================================================
// Options and Outcome
// ============================================================================

/// Which files a build parses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildScope {
    /// Parse everything.
    Full,
    /// Parse only files whose path starts with one of the prefixes.
    Incremental(Vec<String>),
    /// Parse nothing; only count files.
    CountOnly,
}

impl BuildScope {
    fn admits(&self, path: &str) -> bool {
        match self {
            BuildScope::Full => true,
            BuildScope::Incremental(prefixes) => {
                prefixes.iter().any(|p| path.starts_with(p.as_str()))
            }
            BuildScope::CountOnly => false,
        }
    }

    fn tracks_affected(&self) -> bool {
        !matches!(self, BuildScope::Full)
    }
}

/// Inputs of one build.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Configured roots, highest priority first.
    pub roots: Vec<PathBuf>,
    pub runtime: RuntimeInfo,
    /// Tested against full filenames.
    pub blacklist: Regex,
    pub scope: BuildScope,
    pub weights: ScoreWeights,
}

/// Result of a build.
#[derive(Debug)]
pub struct BuildOutcome {
    pub tree: SymbolTree,
    /// Files parsed by an incremental build.
    pub affected_files: BTreeSet<String>,
    /// Module files seen during the walk, parsed or not.
    pub total_files: usize,
    pub failures: Vec<BuildError>,
}

impl BuildOutcome {
    pub fn parse_failures(&self) -> usize {
        self.failures.len()
    }
}

// ============================================================================
// Builder
// ============================================================================

struct ParseJob {
    parent: NodeId,
    /// `None` for a package's `__init__.py`.
    module: Option<String>,
    path: PathBuf,
    location: Location,
}

struct Walker<'o, 'p> {
    options: &'o BuildOptions,
    tree: SymbolTree,
    jobs: Vec<ParseJob>,
    affected: BTreeSet<String>,
    progress: ProgressThrottle<'p>,
}

/// Build the symbol tree for `options`.
///
/// `progress` receives the running number of module files seen, at most
/// every 300ms plus once with the final count.
pub fn build(options: &BuildOptions, progress: Option<&mut dyn FnMut(usize)>) -> BuildOutcome {
    let roots = effective_roots(&options.roots, &options.runtime.search_paths);
    let mut walker = Walker {
        options,
        tree: SymbolTree::new(),
        jobs: Vec::new(),
        affected: BTreeSet::new(),
        progress: ProgressThrottle::new(progress),
    };

    for name in &options.runtime.builtin_modules {
        walker.tree.add_child(
            ROOT,
            name,
            SymbolKind::Module,
            options.weights.module,
            Location::System,
            "",
        );
    }
    for root in &roots {
        if !root.is_dir() {
            debug!(root = %root.display(), "skipping missing root");
            continue;
        }
        for entry in list_dir(root) {
            walker.index_path(ROOT, &entry);
        }
    }

    let Walker {
        mut tree,
        jobs,
        affected,
        progress,
        ..
    } = walker;
    let total_files = progress.finish();

    let parsed: Vec<Result<ModuleSymbols, BuildError>> =
        jobs.par_iter().map(|job| parse_file(&job.path)).collect();

    let mut failures = Vec::new();
    let mut exports = Vec::new();
    for (job, result) in jobs.iter().zip(parsed) {
        let module = match result {
            Ok(module) => module,
            Err(e) => {
                warn!("{}", e);
                failures.push(e);
                continue;
            }
        };
        let filename = job.path.to_string_lossy();
        let target = match &job.module {
            Some(name) => {
                let location = if name == "__future__" {
                    Location::Future
                } else {
                    job.location
                };
                tree.add_child(
                    job.parent,
                    name,
                    SymbolKind::Module,
                    options.weights.module,
                    location,
                    &filename,
                )
            }
            None => job.parent,
        };
        insert_symbols(
            &mut tree,
            target,
            &module.symbols,
            job.location,
            &filename,
            &options.weights,
        );
        if let Some(names) = module.exports {
            exports.push((target, names));
        }
    }

    for (node, names) in &exports {
        let removed = tree.retain_exports(*node, names);
        if removed > 0 {
            debug!(module = tree.node(*node).path(), removed, "unexported names pruned");
        }
    }

    info!(
        roots = roots.len(),
        total_files,
        parsed = jobs.len(),
        failures = failures.len(),
        "symbol index built"
    );

    BuildOutcome {
        tree,
        affected_files: affected,
        total_files,
        failures,
    }
}

impl Walker<'_, '_> {
    fn index_path(&mut self, parent: NodeId, path: &Path) {
        let Some(basename) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            return;
        };
        let stem = basename.split('.').next().unwrap_or("");
        if basename.starts_with('_') && stem != INIT_STEM {
            return;
        }

        if path.is_file() {
            self.index_module(parent, path);
        } else if path.is_dir() && path.join(PACKAGE_MARKER).is_file() {
            self.index_package(parent, path, &basename);
        }
    }

    fn index_package(&mut self, parent: NodeId, dir: &Path, name: &str) {
        if is_blacklisted(&self.options.blacklist, dir) {
            debug!(package = %dir.display(), "blacklisted package skipped");
            return;
        }
        let location = location_for_path(dir, &self.options.runtime.stdlib_dirs);
        let init = dir.join(PACKAGE_MARKER);
        let node = self.tree.add_child(
            parent,
            name,
            SymbolKind::Package,
            self.options.weights.package,
            location,
            &init.to_string_lossy(),
        );
        for entry in list_dir(dir) {
            self.index_path(node, &entry);
        }
    }

    fn index_module(&mut self, parent: NodeId, path: &Path) {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let is_source = ext == SOURCE_EXT;
        if !is_source && !EXTENSION_EXTS.contains(&ext) {
            return;
        }

        self.progress.tick();

        if is_blacklisted(&self.options.blacklist, path) {
            return;
        }
        let filename = path.to_string_lossy().into_owned();
        if !self.options.scope.admits(&filename) {
            return;
        }
        if self.options.scope.tracks_affected() {
            self.affected.insert(filename.clone());
        }

        let stem = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.split('.').next())
            .unwrap_or("");
        let module = (stem != INIT_STEM).then(|| stem.to_string());
        let location = location_for_path(path, &self.options.runtime.stdlib_dirs);

        if !is_source {
            // Compiled extensions cannot be inspected; index the name only.
            if let Some(name) = module {
                self.tree.add_child(
                    parent,
                    &name,
                    SymbolKind::Module,
                    self.options.weights.module,
                    location,
                    &filename,
                );
            }
            return;
        }
        if module.is_none() && parent == ROOT {
            debug!(file = %path.display(), "root-level __init__.py ignored");
            return;
        }
        self.jobs.push(ParseJob {
            parent,
            module,
            path: path.to_path_buf(),
            location,
        });
    }
}

fn parse_file(path: &Path) -> Result<ModuleSymbols, BuildError> {
    let bytes = fs::read(path).map_err(|source| BuildError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let source = String::from_utf8_lossy(&bytes);
    let parsed = ParsedSource::parse_strict(source).map_err(|source| BuildError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(extract_module(&parsed))
}

fn insert_symbols(
    tree: &mut SymbolTree,
    parent: NodeId,
    symbols: &[ExtractedSymbol],
    location: Location,
    filename: &str,
    weights: &ScoreWeights,
) {
    for symbol in symbols {
        let id = tree.add_child(
            parent,
            &symbol.name,
            symbol.kind,
            weights.score_for(symbol.kind),
            location,
            filename,
        );
        if !symbol.children.is_empty() && tree.node(id).kind == SymbolKind::Class {
            insert_symbols(tree, id, &symbol.children, location, filename, weights);
        }
    }
}

/// Configured roots followed by runtime paths, deduplicated in order, with
/// empty paths and tugimport's own install excluded.
pub fn effective_roots(roots: &[PathBuf], runtime_paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    roots
        .iter()
        .chain(runtime_paths)
        .filter(|p| !p.as_os_str().is_empty())
        .filter(|p| !p.to_string_lossy().contains(INSTALL_MARKER))
        .filter(|p| seen.insert((*p).clone()))
        .cloned()
        .collect()
}

/// Classify a path by where it lives.
pub fn location_for_path(path: &Path, stdlib_dirs: &[PathBuf]) -> Location {
    let third_party = path.components().any(|c| {
        let part = c.as_os_str().to_string_lossy();
        THIRD_PARTY_DIRS.iter().any(|dir| *dir == part)
    });
    if third_party {
        Location::ThirdParty
    } else if stdlib_dirs.iter().any(|dir| path.starts_with(dir)) {
        Location::System
    } else {
        Location::Local
    }
}

/// Location lookup that inspects the file system instead of an index.
///
/// A module is System when the runtime reports it builtin, Local when it
/// exists under one of the local roots, and otherwise classified by where
/// it is found on the runtime search path.
#[derive(Debug, Clone)]
pub struct RuntimeLocator {
    runtime: RuntimeInfo,
    local_roots: Vec<PathBuf>,
}

impl RuntimeLocator {
    pub fn new(runtime: RuntimeInfo, local_roots: Vec<PathBuf>) -> Self {
        RuntimeLocator {
            runtime,
            local_roots,
        }
    }
}

impl LocationLookup for RuntimeLocator {
    fn location_for(&self, module_path: &str) -> Location {
        let top = module_path.split('.').next().unwrap_or(module_path);
        if top == "__future__" {
            return Location::Future;
        }
        if self.runtime.builtin_modules.iter().any(|m| m == top) {
            return Location::System;
        }
        if self.local_roots.iter().any(|dir| module_exists(dir, top)) {
            return Location::Local;
        }
        self.runtime
            .search_paths
            .iter()
            .find(|dir| module_exists(dir, top))
            .map(|dir| location_for_path(&dir.join(top), &self.runtime.stdlib_dirs))
            .unwrap_or(Location::ThirdParty)
    }
}

fn module_exists(dir: &Path, name: &str) -> bool {
    dir.join(name).is_dir() || dir.join(format!("{name}.py")).is_file()
}

/// Direct entries of `dir`, sorted by name. Unreadable directories are
/// treated as empty.
fn list_dir(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.into_path()),
            Err(e) => {
                debug!("skipping unreadable entry: {}", e);
                None
            }
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tugimport_core::config::build_blacklist;
    use tugimport_core::types::IndexDocument;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn options(root: &Path, scope: BuildScope) -> BuildOptions {
        BuildOptions {
            roots: vec![root.to_path_buf()],
            runtime: RuntimeInfo::unavailable(),
            blacklist: build_blacklist(true, &[]).unwrap(),
            scope,
            weights: ScoreWeights::default(),
        }
    }

    fn docs(outcome: &BuildOutcome) -> Vec<IndexDocument> {
        outcome.tree.flatten(&ScoreWeights::default(), None)
    }

    mod walk {
        use super::*;

        #[test]
        fn package_with_module() {
            let tmp = TempDir::new().unwrap();
            write(tmp.path(), "pkg/__init__.py", "");
            write(tmp.path(), "pkg/mod.py", "def foo():\n    pass\n");

            let outcome = build(&options(tmp.path(), BuildScope::Full), None);
            assert_eq!(outcome.total_files, 2);
            assert_eq!(outcome.parse_failures(), 0);

            let docs = docs(&outcome);
            let foo: Vec<_> = docs.iter().filter(|d| d.symbol == "foo").collect();
            assert_eq!(foo.len(), 1);
            assert_eq!(foo[0].module, "pkg.mod");
            assert_eq!(foo[0].kind, SymbolKind::Function);
            assert_eq!(foo[0].location, Location::Local);
            assert!(foo[0].filename.ends_with("mod.py"));
        }

        #[test]
        fn init_symbols_attach_to_package() {
            let tmp = TempDir::new().unwrap();
            write(tmp.path(), "pkg/__init__.py", "VERSION = '1'\n");
            let outcome = build(&options(tmp.path(), BuildScope::Full), None);
            let docs = docs(&outcome);
            let version = docs.iter().find(|d| d.symbol == "VERSION").unwrap();
            assert_eq!(version.module, "pkg");
            assert!(version.filename.ends_with("__init__.py"));
        }

        #[test]
        fn directories_without_marker_are_not_packages() {
            let tmp = TempDir::new().unwrap();
            write(tmp.path(), "scripts/run.py", "def main():\n    pass\n");
            let outcome = build(&options(tmp.path(), BuildScope::Full), None);
            assert!(docs(&outcome).is_empty());
            assert_eq!(outcome.total_files, 0);
        }

        #[test]
        fn private_and_blacklisted_entries_produce_nothing() {
            let tmp = TempDir::new().unwrap();
            write(tmp.path(), "_private.py", "def hidden():\n    pass\n");
            write(tmp.path(), "tests/__init__.py", "");
            write(tmp.path(), "tests/test_a.py", "def check():\n    pass\n");
            write(tmp.path(), "test_top.py", "def check2():\n    pass\n");
            write(tmp.path(), "app.py", "def visible():\n    pass\n");

            let outcome = build(&options(tmp.path(), BuildScope::Full), None);
            let symbols: Vec<_> = docs(&outcome).into_iter().map(|d| d.symbol).collect();
            assert_eq!(symbols, vec!["visible".to_string(), "app".to_string()]);
        }

        #[test]
        fn ignore_folders_are_skipped() {
            let tmp = TempDir::new().unwrap();
            write(tmp.path(), "build/__init__.py", "");
            write(tmp.path(), "build/gen.py", "GENERATED = 1\n");
            let mut opts = options(tmp.path(), BuildScope::Full);
            opts.blacklist = build_blacklist(false, &["build".to_string()]).unwrap();
            let outcome = build(&opts, None);
            assert!(docs(&outcome).is_empty());
        }

        #[test]
        fn blacklist_matches_full_filenames() {
            let tmp = TempDir::new().unwrap();
            let root = tmp.path().join("vendor");
            write(&root, "lib.py", "def vendored():\n    pass\n");
            let mut opts = options(&root, BuildScope::Full);
            opts.blacklist = build_blacklist(false, &["vendor".to_string()]).unwrap();
            let outcome = build(&opts, None);
            assert!(docs(&outcome).is_empty());
            assert_eq!(outcome.total_files, 1);
        }

        #[test]
        fn extension_modules_are_childless() {
            let tmp = TempDir::new().unwrap();
            write(tmp.path(), "fast.cpython-312-x86_64-linux-gnu.so", "\u{0}ELF");
            let outcome = build(&options(tmp.path(), BuildScope::Full), None);
            let docs = docs(&outcome);
            assert_eq!(docs.len(), 1);
            assert_eq!(docs[0].symbol, "fast");
            assert_eq!(docs[0].kind, SymbolKind::Module);
        }

        #[test]
        fn builtin_modules_are_system() {
            let tmp = TempDir::new().unwrap();
            let mut opts = options(tmp.path(), BuildScope::Full);
            opts.runtime.builtin_modules = vec!["sys".to_string()];
            let outcome = build(&opts, None);
            let docs = docs(&outcome);
            assert_eq!(docs.len(), 1);
            assert_eq!(docs[0].location, Location::System);
        }
    }

    mod failures {
        use super::*;

        #[test]
        fn syntax_error_prunes_module_only() {
            let tmp = TempDir::new().unwrap();
            write(tmp.path(), "broken.py", "def broken(:\n");
            write(tmp.path(), "good.py", "def fine():\n    pass\n");

            let outcome = build(&options(tmp.path(), BuildScope::Full), None);
            assert_eq!(outcome.parse_failures(), 1);
            assert!(outcome.failures[0].path().ends_with("broken.py"));
            let symbols: BTreeSet<_> = docs(&outcome).into_iter().map(|d| d.symbol).collect();
            assert!(symbols.contains("fine"));
            assert!(!symbols.contains("broken"));
        }
    }

    mod exports {
        use super::*;

        #[test]
        fn package_all_prunes_children() {
            let tmp = TempDir::new().unwrap();
            write(tmp.path(), "pkg/__init__.py", "__all__ = ['a']\n");
            write(tmp.path(), "pkg/a.py", "X = 1\n");
            write(tmp.path(), "pkg/b.py", "Y = 1\n");

            let outcome = build(&options(tmp.path(), BuildScope::Full), None);
            let pkg = outcome.tree.find("pkg").unwrap();
            let children: Vec<_> = outcome.tree.node(pkg).children.keys().cloned().collect();
            assert_eq!(children, vec!["a".to_string()]);
        }
    }

    mod scope {
        use super::*;

        #[test]
        fn count_only_parses_nothing() {
            let tmp = TempDir::new().unwrap();
            write(tmp.path(), "a.py", "A = 1\n");
            write(tmp.path(), "b.py", "B = 1\n");
            let outcome = build(&options(tmp.path(), BuildScope::CountOnly), None);
            assert_eq!(outcome.total_files, 2);
            assert!(docs(&outcome).is_empty());
            assert!(outcome.affected_files.is_empty());
        }

        #[test]
        fn incremental_tracks_affected_files() {
            let tmp = TempDir::new().unwrap();
            write(tmp.path(), "a.py", "A = 1\n");
            write(tmp.path(), "b.py", "B = 1\n");
            let target = tmp.path().join("a.py").to_string_lossy().into_owned();
            let outcome = build(
                &options(tmp.path(), BuildScope::Incremental(vec![target.clone()])),
                None,
            );
            assert_eq!(outcome.total_files, 2);
            assert_eq!(outcome.affected_files.iter().collect::<Vec<_>>(), vec![&target]);
            let docs = outcome
                .tree
                .flatten(&ScoreWeights::default(), Some(&outcome.affected_files));
            let symbols: Vec<_> = docs.into_iter().map(|d| d.symbol).collect();
            assert_eq!(symbols, vec!["A".to_string(), "a".to_string()]);
        }

        #[test]
        fn progress_reports_final_count() {
            let tmp = TempDir::new().unwrap();
            for i in 0..5 {
                write(tmp.path(), &format!("m{}.py", i), "X = 1\n");
            }
            let mut last = 0;
            let mut cb = |n: usize| last = n;
            build(&options(tmp.path(), BuildScope::CountOnly), Some(&mut cb));
            assert_eq!(last, 5);
        }
    }

    mod helpers {
        use super::*;

        #[test]
        fn roots_are_deduplicated_and_filtered() {
            let roots = vec![PathBuf::from("/w"), PathBuf::from("")];
            let runtime = vec![
                PathBuf::from("/usr/lib/python3.12"),
                PathBuf::from("/w"),
                PathBuf::from("/opt/tugimport-runtime/lib"),
            ];
            assert_eq!(
                effective_roots(&roots, &runtime),
                vec![PathBuf::from("/w"), PathBuf::from("/usr/lib/python3.12")]
            );
        }

        #[test]
        fn location_heuristic() {
            let stdlib = vec![PathBuf::from("/usr/lib/python3.12")];
            assert_eq!(
                location_for_path(Path::new("/usr/lib/python3.12/os.py"), &stdlib),
                Location::System
            );
            assert_eq!(
                location_for_path(
                    Path::new("/usr/lib/python3.12/site-packages/requests/api.py"),
                    &stdlib
                ),
                Location::ThirdParty
            );
            assert_eq!(
                location_for_path(Path::new("/w/app.py"), &stdlib),
                Location::Local
            );
        }

        #[test]
        fn runtime_locator_checks_the_file_system() {
            let local = TempDir::new().unwrap();
            let stdlib = TempDir::new().unwrap();
            let site = TempDir::new().unwrap();
            let site_packages = site.path().join("site-packages");
            write(local.path(), "app/__init__.py", "");
            write(stdlib.path(), "json/__init__.py", "");
            write(&site_packages, "requests.py", "");

            let runtime = RuntimeInfo {
                version: "3.12".to_string(),
                search_paths: vec![stdlib.path().to_path_buf(), site_packages.clone()],
                stdlib_dirs: vec![stdlib.path().to_path_buf()],
                builtin_modules: vec!["sys".to_string()],
            };
            let locator = RuntimeLocator::new(runtime, vec![local.path().to_path_buf()]);

            assert_eq!(locator.location_for("__future__"), Location::Future);
            assert_eq!(locator.location_for("sys"), Location::System);
            assert_eq!(locator.location_for("json.decoder"), Location::System);
            assert_eq!(locator.location_for("requests"), Location::ThirdParty);
            assert_eq!(locator.location_for("app.models"), Location::Local);
            assert_eq!(locator.location_for("unknown"), Location::ThirdParty);
        }
    }
}
