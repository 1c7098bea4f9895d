//! Resolver and import engine working together on whole files.
//!
//! The tests apply the collapsed `(start_line, end_line, text)` edit the
//! way an editor does and feed the result back through the resolver.

use std::collections::BTreeSet;

use tugimport_core::config::{MultilineMode, StyleConfig};
use tugimport_core::diff::{apply_edits, split_lines};
use tugimport_core::types::{Location, LocationLookup, NoIndex};
use tugimport_python::imports::{ImportUpdate, Imports};
use tugimport_python::resolver::resolve_source;

struct Sections;

impl LocationLookup for Sections {
    fn location_for(&self, module_path: &str) -> Location {
        match module_path {
            "collections" | "os" | "sys" | "typing" => Location::System,
            "app" | "app.models" => Location::Local,
            _ => Location::ThirdParty,
        }
    }
}

fn apply(source: &str, update: &ImportUpdate) -> String {
    let lines = split_lines(source);
    let mut out: String = lines[..update.start_line].concat();
    out.push_str(&update.text);
    out.push_str(&lines[update.end_line.min(lines.len())..].concat());
    out
}

fn names(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// Resolution
// ============================================================================

mod resolution {
    use super::*;

    #[test]
    fn used_import_is_clean() {
        let resolution = resolve_source("import os\nprint(os.getcwd())").unwrap();
        assert!(resolution.unresolved.is_empty());
        assert!(resolution.unreferenced.is_empty());
    }

    #[test]
    fn unused_import_is_reported() {
        let resolution = resolve_source("import os\nimport sys\nprint(os.getcwd())").unwrap();
        assert!(resolution.unresolved.is_empty());
        assert_eq!(resolution.unreferenced, names(&["sys"]));
    }

    #[test]
    fn realistic_module() {
        let source = r#"
from typing import Optional
import json


class Config:
    default_name = "app"

    def __init__(self, path: "Optional[str]" = None):
        self.path = path or default_path()

    def load(self):
        with open(self.path) as fh:
            return yaml.safe_load(fh)


def main(argv):
    config = Config(argv[1] if len(argv) > 1 else None)
    try:
        config.load()
    except ParseError as exc:
        log.error("bad config: %s", exc)
    return [name for name in config.names if name]
"#;
        let resolution = resolve_source(source).unwrap();
        assert_eq!(
            resolution.unresolved,
            names(&["ParseError", "default_path", "log", "yaml"])
        );
        assert_eq!(resolution.unreferenced, names(&["json"]));
    }
}

// ============================================================================
// Insertion
// ============================================================================

mod insertion {
    use super::*;

    fn style() -> StyleConfig {
        StyleConfig::default()
    }

    #[test]
    fn into_file_with_no_imports() {
        let mut imports = Imports::parse("", &NoIndex).unwrap();
        imports.add_import_from("collections", "OrderedDict");
        let update = imports.update(&style());
        assert_eq!(update.start_line, 0);
        assert_eq!(update.end_line, 0);
        assert_eq!(update.text, "from collections import OrderedDict\n");
    }

    #[test]
    fn insert_then_insert_again_is_empty() {
        let source = "\"\"\"Tools.\"\"\"\nimport os\n\nprint(os.sep)\n";
        let mut imports = Imports::parse(source, &Sections).unwrap();
        imports.add_import_from("collections", "OrderedDict");
        let update = imports.update(&style());
        let edited = apply(source, &update);
        assert_eq!(
            edited,
            "\"\"\"Tools.\"\"\"\nimport os\nfrom collections import OrderedDict\n\nprint(os.sep)\n"
        );

        let mut again = Imports::parse(&edited, &Sections).unwrap();
        again.add_import_from("collections", "OrderedDict");
        let update = again.update(&style());
        assert!(update.is_empty());
        assert_eq!(update.text, "");
        assert_eq!(update.start_line, update.end_line);
    }

    #[test]
    fn collapsed_edit_matches_edit_commands() {
        let source = "import sys\nimport requests\nfrom app import models\n\nrun()\n";
        let mut imports = Imports::parse(source, &Sections).unwrap();
        imports.add_import_from("app.models", "User");
        imports.add_import("os");
        let update = imports.update(&style());

        let by_commands = apply_edits(&split_lines(source), &update.edits);
        assert_eq!(apply(source, &update), by_commands);
        assert_eq!(
            by_commands,
            "import os\nimport sys\n\nimport requests\n\nfrom app import models\nfrom app.models import User\n\nrun()\n"
        );
    }

    #[test]
    fn long_import_wraps_in_parentheses() {
        let style = StyleConfig {
            multiline: MultilineMode::Parentheses,
            max_columns: 40,
            indent_with_tabs: false,
        };
        let mut imports = Imports::parse("", &Sections).unwrap();
        for name in ["Dict", "List", "Optional", "Sequence", "Union"] {
            imports.add_import_from("typing", name);
        }
        let text = imports.update(&style).text;
        assert!(text.starts_with("from typing import ("));
        assert!(text.ends_with(")\n"));
        assert!(text.lines().all(|line| line.len() <= 40));
        for name in ["Dict", "List", "Optional", "Sequence", "Union"] {
            assert!(text.contains(name));
        }
    }
}

// ============================================================================
// Fixing a file
// ============================================================================

#[test]
fn prune_unreferenced_and_add_missing() {
    let source = "import sys\nimport requests\n\nd = OrderedDict()\nrequests.post(d)\n";
    let resolution = resolve_source(source).unwrap();
    assert_eq!(resolution.unresolved, names(&["OrderedDict"]));
    assert_eq!(resolution.unreferenced, names(&["sys"]));

    let mut imports = Imports::parse(source, &Sections).unwrap();
    assert_eq!(imports.remove(&resolution.unreferenced), 1);
    imports.add_import_from("collections", "OrderedDict");
    let fixed = apply(source, &imports.update(&StyleConfig::default()));

    assert!(fixed.starts_with("from collections import OrderedDict\n\nimport requests\n"));
    let after = resolve_source(&fixed).unwrap();
    assert!(after.unresolved.is_empty());
    assert!(after.unreferenced.is_empty());
}
