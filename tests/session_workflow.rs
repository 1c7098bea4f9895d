//! End-to-end session tests.
//!
//! Every test configures a session over a temp workspace with a separate temp
//! data directory and no runtime paths, so nothing depends on an installed
//! Python interpreter.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tugimport::config::SessionConfig;
use tugimport::error::ErrorKind;
use tugimport::output::ProgressEvent;
use tugimport::session::ImportSession;
use tugimport::types::SymbolKind;

struct Workspace {
    root: TempDir,
    data: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Workspace {
            root: TempDir::new().unwrap(),
            data: TempDir::new().unwrap(),
        }
    }

    fn path(&self) -> &Path {
        self.root.path()
    }

    fn write(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.root.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    fn config(&self, extra: serde_json::Value) -> SessionConfig {
        let mut value = serde_json::json!({
            "paths": [self.root.path()],
            "tempPath": self.data.path(),
            "useRuntimePaths": false,
        });
        if let (Some(base), Some(extra)) = (value.as_object_mut(), extra.as_object()) {
            for (key, v) in extra {
                base.insert(key.clone(), v.clone());
            }
        }
        SessionConfig::from_value(value).unwrap()
    }

    fn session(&self) -> ImportSession {
        let mut session = ImportSession::new();
        session
            .configure(self.config(serde_json::json!({})), &mut |_| {})
            .unwrap();
        session
    }
}

// ============================================================================
// Indexing
// ============================================================================

mod indexing {
    use super::*;

    #[test]
    fn package_function_is_found() {
        let ws = Workspace::new();
        ws.write("pkg/__init__.py", "");
        ws.write("pkg/mod.py", "def foo():\n    pass\n");

        let session = ws.session();
        let items = session.get_symbols("foo").unwrap().items;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].module, "pkg.mod");
        assert_eq!(items[0].symbol, "foo");
        assert_eq!(items[0].kind, SymbolKind::Function);
    }

    #[test]
    fn tests_and_ignored_folders_are_skipped() {
        let ws = Workspace::new();
        ws.write("app/core.py", "def visible_name():\n    pass\n");
        ws.write("tests/test_core.py", "def hidden_test_helper():\n    pass\n");
        ws.write("build/gen.py", "def hidden_generated():\n    pass\n");
        ws.write("_private.py", "def hidden_private():\n    pass\n");

        let mut session = ImportSession::new();
        session
            .configure(
                ws.config(serde_json::json!({ "ignoreFolders": ["build"] })),
                &mut |_| {},
            )
            .unwrap();

        assert_eq!(session.get_symbols("visible").unwrap().items.len(), 1);
        assert!(session.get_symbols("hidden").unwrap().items.is_empty());
    }

    #[test]
    fn syntax_error_is_counted_and_siblings_survive() {
        let ws = Workspace::new();
        ws.write("good.py", "def fine_function():\n    pass\n");
        ws.write("bad.py", "def broken(:\n");

        let mut session = ImportSession::new();
        let response = session
            .configure(ws.config(serde_json::json!({})), &mut |_| {})
            .unwrap();
        assert!(response.success);
        assert_eq!(response.parse_failures, 1);
        assert_eq!(session.get_symbols("fine_function").unwrap().items.len(), 1);
        assert!(session.get_symbols("broken").unwrap().items.is_empty());
    }

    #[test]
    fn rebuild_reports_progress() {
        let ws = Workspace::new();
        ws.write("a.py", "ALPHA = 1\n");
        let mut session = ws.session();

        let mut events: Vec<ProgressEvent> = Vec::new();
        let response = session.rebuild_index(&mut |e| events.push(e)).unwrap();
        assert!(response.success);
        assert_eq!(response.reused, None);
        assert!(response.docs_count >= 2);
        assert!(events.iter().any(|e| e.progress.starts_with("Scan files... ")));
        assert_eq!(events.last().unwrap().progress, "Indexing... 100%");
    }

    #[test]
    fn changed_init_reindexes_the_package() {
        let ws = Workspace::new();
        let init = ws.write("pkg/__init__.py", "OLD_EXPORT = 1\n");
        ws.write("pkg/util.py", "def util_helper():\n    pass\n");
        let mut session = ws.session();

        fs::write(&init, "NEW_EXPORT = 1\n").unwrap();
        session.change_files(&[init], &mut |_| {}).unwrap();

        assert!(session.get_symbols("old_export").unwrap().items.is_empty());
        assert_eq!(session.get_symbols("new_export").unwrap().items.len(), 1);
        assert_eq!(session.get_symbols("util_helper").unwrap().items.len(), 1);
    }
}

// ============================================================================
// Editing
// ============================================================================

mod editing {
    use super::*;

    #[test]
    fn insert_places_sections_in_order() {
        let ws = Workspace::new();
        ws.write("app/__init__.py", "");
        ws.write("app/models.py", "class User:\n    pass\n");
        let source = ws.write("main.py", "import app\n\nprint(app)\n");
        let session = ws.session();

        let response = session
            .insert_import(&source, Some("app.models"), "User")
            .unwrap();
        assert_eq!(response.from_line, 1);
        assert_eq!(response.end_line, 1);
        assert_eq!(response.text, "from app.models import User\n");
        assert_eq!(response.diff.len(), 1);
    }

    #[test]
    fn second_identical_insert_is_empty() {
        let ws = Workspace::new();
        let source = ws.write("main.py", "from collections import OrderedDict\n\nOrderedDict()\n");
        let session = ws.session();

        let response = session
            .insert_import(&source, Some("collections"), "OrderedDict")
            .unwrap();
        assert_eq!(response.text, "");
        assert_eq!(response.from_line, response.end_line);
        assert!(response.diff.is_empty());
    }

    #[test]
    fn suggestions_for_dotted_use() {
        let ws = Workspace::new();
        ws.write("helpers/__init__.py", "");
        ws.write("helpers/paths.py", "def join_paths(a, b):\n    pass\n");
        let source = ws.write("main.py", "paths.join_paths('a', 'b')\n");
        let session = ws.session();

        let items = session.import_suggestions(&source, "paths").unwrap().items;
        assert!(items.iter().any(|i| i.symbol == "paths" && i.module == "helpers"));
    }

    #[test]
    fn missing_source_file_is_a_user_error() {
        let ws = Workspace::new();
        let session = ws.session();
        let err = session
            .insert_import(&ws.path().join("nope.py"), None, "os")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::User);
        let err = session.insert_import(Path::new(""), None, "os").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::User);
    }
}
