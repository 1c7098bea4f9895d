//! Import block engine.
//!
//! Reads the leading run of import statements of a file, merges requested
//! imports into it, re-renders the block in canonical order and reports
//! the change as line edits against the original text.
//!
//! Canonical order:
//!
//! - sections `__future__`, standard library, third-party, local, separated
//!   by one blank line,
//! - plain `import` statements before `from` imports within a section,
//!   modules ordered case-sensitively, relative modules last,
//! - names of a `from` import ordered constants, classes, then the rest.

use std::collections::BTreeSet;

use tree_sitter::Node;
use tugimport_core::config::{MultilineMode, StyleConfig};
use tugimport_core::diff::{collapsed_edit, line_edits, split_lines, LineEdit};
use tugimport_core::types::{Location, LocationLookup};

use crate::syntax::{field_children, ParsedSource, SyntaxError};

const SECTIONS: [Location; 4] = [
    Location::Future,
    Location::System,
    Location::ThirdParty,
    Location::Local,
];

// ============================================================================
// Model
// ============================================================================

/// One imported name, optionally aliased.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImportedName {
    pub name: String,
    pub alias: Option<String>,
}

impl ImportedName {
    pub fn new(name: impl Into<String>) -> Self {
        ImportedName {
            name: name.into(),
            alias: None,
        }
    }

    /// Name the import introduces into the module namespace, as reported
    /// for unreferenced imports.
    pub fn bound(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    fn render(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{} as {}", self.name, alias),
            None => self.name.clone(),
        }
    }
}

/// Shape of an import statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportForm {
    /// `import module [as alias]`, one module per statement.
    Straight(ImportedName),
    /// `from module import names`.
    From {
        module: String,
        names: Vec<ImportedName>,
    },
}

impl ImportForm {
    fn module(&self) -> &str {
        match self {
            ImportForm::Straight(name) => &name.name,
            ImportForm::From { module, .. } => module,
        }
    }
}

/// An import statement with the comments attached to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportStatement {
    pub form: ImportForm,
    /// Comment lines directly above the statement.
    pub comments: Vec<String>,
    /// Comments on the statement's own lines.
    pub trailing: Vec<String>,
}

impl ImportStatement {
    fn new(form: ImportForm) -> Self {
        ImportStatement {
            form,
            comments: Vec::new(),
            trailing: Vec::new(),
        }
    }
}

/// Result of re-rendering the import block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportUpdate {
    /// First replaced line (0-based).
    pub start_line: usize,
    /// One past the last replaced line.
    pub end_line: usize,
    /// Replacement for `start_line..end_line`.
    pub text: String,
    /// The same change as separate edits, last edit first.
    pub edits: Vec<LineEdit>,
}

impl ImportUpdate {
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }
}

// ============================================================================
// Imports
// ============================================================================

/// The import block of one file.
pub struct Imports<'l> {
    lookup: &'l dyn LocationLookup,
    source: String,
    /// Line range of the existing block; `None` when the file has no
    /// imports.
    block: Option<(usize, usize)>,
    statements: Vec<ImportStatement>,
    /// Imports sharing a line with other code. They stay where they are
    /// and are never re-rendered.
    pinned: Vec<ImportForm>,
}

impl<'l> Imports<'l> {
    /// Read the import block of `source`. Syntax errors after the block do
    /// not matter; the block ends at the first statement that is not an
    /// import. Lines that mix imports with other statements are left out of
    /// the block.
    pub fn parse(source: &str, lookup: &'l dyn LocationLookup) -> Result<Self, SyntaxError> {
        let parsed = ParsedSource::parse(source)?;
        let scanned = scan_block(&parsed);
        let mut imports = Imports {
            lookup,
            source: source.to_string(),
            block: scanned.range,
            statements: Vec::new(),
            pinned: scanned.pinned,
        };
        for statement in scanned.statements {
            imports.merge(statement);
        }
        Ok(imports)
    }

    /// Line range of the existing import block.
    pub fn block_range(&self) -> Option<(usize, usize)> {
        self.block
    }

    pub fn statements(&self) -> &[ImportStatement] {
        &self.statements
    }

    /// Request `import module`.
    pub fn add_import(&mut self, module: &str) {
        self.request(ImportForm::Straight(ImportedName::new(module)));
    }

    /// Request `from module import name`.
    pub fn add_import_from(&mut self, module: &str, name: &str) {
        self.request(ImportForm::From {
            module: module.to_string(),
            names: vec![ImportedName::new(name)],
        });
    }

    fn request(&mut self, form: ImportForm) {
        if !self.is_pinned(&form) {
            self.merge(ImportStatement::new(form));
        }
    }

    /// Whether an import outside the block already provides `form`.
    fn is_pinned(&self, form: &ImportForm) -> bool {
        self.pinned.iter().any(|pinned| match (pinned, form) {
            (ImportForm::Straight(have), ImportForm::Straight(wanted)) => have == wanted,
            (
                ImportForm::From {
                    module: a,
                    names: have,
                },
                ImportForm::From {
                    module: b,
                    names: wanted,
                },
            ) => a == b && wanted.iter().all(|name| have.contains(name)),
            _ => false,
        })
    }

    /// Remove imports by the name they bind. Statements left without names
    /// are dropped. Returns the number of names removed.
    pub fn remove(&mut self, bound: &BTreeSet<String>) -> usize {
        let mut removed = 0;
        self.statements.retain_mut(|statement| match &mut statement.form {
            ImportForm::Straight(name) => {
                let keep = !bound.contains(name.bound());
                removed += usize::from(!keep);
                keep
            }
            ImportForm::From { names, .. } => {
                let before = names.len();
                names.retain(|name| !bound.contains(name.bound()));
                removed += before - names.len();
                !names.is_empty()
            }
        });
        removed
    }

    fn merge(&mut self, incoming: ImportStatement) {
        let existing = self.statements.iter_mut().find(|s| match (&s.form, &incoming.form) {
            (ImportForm::Straight(a), ImportForm::Straight(b)) => a == b,
            (ImportForm::From { module: a, .. }, ImportForm::From { module: b, .. }) => a == b,
            _ => false,
        });
        let Some(existing) = existing else {
            self.statements.push(incoming);
            return;
        };
        if let (ImportForm::From { names, .. }, ImportForm::From { names: added, .. }) =
            (&mut existing.form, incoming.form)
        {
            for name in added {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        existing.comments.extend(incoming.comments);
        existing.trailing.extend(incoming.trailing);
    }

    /// Section of `module`. An unknown dotted module falls back to the
    /// section of its top-level package.
    fn section_of(&self, module: &str) -> Location {
        if module == "__future__" {
            return Location::Future;
        }
        if module.starts_with('.') {
            return Location::Local;
        }
        let location = self.lookup.location_for(module);
        match module.split_once('.') {
            Some((top, _)) if location == Location::ThirdParty => self.lookup.location_for(top),
            _ => location,
        }
    }

    /// Render the canonical block.
    pub fn render(&self, style: &StyleConfig) -> String {
        let mut sections: Vec<(Location, Vec<&ImportStatement>)> =
            SECTIONS.iter().map(|s| (*s, Vec::new())).collect();
        for statement in &self.statements {
            let section = self.section_of(statement.form.module());
            if let Some((_, bucket)) = sections.iter_mut().find(|(s, _)| *s == section) {
                bucket.push(statement);
            }
        }

        let mut out = String::new();
        for (_, mut bucket) in sections {
            if bucket.is_empty() {
                continue;
            }
            bucket.sort_by(|a, b| statement_key(a).cmp(&statement_key(b)));
            if !out.is_empty() {
                out.push('\n');
            }
            for statement in bucket {
                for comment in &statement.comments {
                    out.push_str(comment);
                    out.push('\n');
                }
                let mut rendered = render_statement(&statement.form, style);
                if !statement.trailing.is_empty() {
                    rendered.pop();
                    rendered.push_str("  ");
                    rendered.push_str(&statement.trailing.join(" "));
                    rendered.push('\n');
                }
                out.push_str(&rendered);
            }
        }
        out
    }

    /// Diff the canonical block against the file. The block is rendered
    /// with the line terminator the file already uses.
    pub fn update(&self, style: &StyleConfig) -> ImportUpdate {
        let lines = split_lines(&self.source);
        let (start, end) = self.block.unwrap_or((0, 0));
        let eol = match lines.get(start).or(lines.first()) {
            Some(line) if line.ends_with("\r\n") => "\r\n",
            _ => "\n",
        };

        let mut old: Vec<String> = lines
            .get(start..end.min(lines.len()))
            .unwrap_or_default()
            .iter()
            .map(|line| line.to_string())
            .collect();
        if let Some(last) = old.last_mut() {
            if !last.ends_with('\n') {
                last.push_str(eol);
            }
        }

        let mut text = self.render(style);
        if self.block.is_none() && !text.is_empty() {
            if let Some(first) = lines.first() {
                if !first.trim().is_empty() {
                    text.push('\n');
                }
            }
        }
        if eol != "\n" {
            text = text.replace('\n', eol);
        }
        // Appending after a last line that has no terminator.
        if start >= lines.len()
            && !text.is_empty()
            && lines.last().is_some_and(|line| !line.ends_with('\n'))
        {
            text.insert_str(0, eol);
        }

        let old_refs: Vec<&str> = old.iter().map(String::as_str).collect();
        let new_refs = split_lines(&text);
        let edits = line_edits(&old_refs, &new_refs)
            .into_iter()
            .map(|edit| LineEdit {
                start: edit.start + start,
                end: edit.end + start,
                ..edit
            })
            .collect();

        match collapsed_edit(&old_refs, &new_refs) {
            Some((from, to, text)) => ImportUpdate {
                start_line: from + start,
                end_line: to + start,
                text,
                edits,
            },
            None => ImportUpdate {
                start_line: start,
                end_line: start,
                text: String::new(),
                edits,
            },
        }
    }
}

// ============================================================================
// Ordering and rendering
// ============================================================================

fn statement_key(statement: &ImportStatement) -> (u8, bool, &str, Option<&str>) {
    match &statement.form {
        ImportForm::Straight(name) => (0, false, &name.name, name.alias.as_deref()),
        ImportForm::From { module, .. } => (1, module.starts_with('.'), module, None),
    }
}

/// 0 for constants, 1 for classes, 2 for everything else.
fn name_group(name: &str) -> u8 {
    let is_constant = name.chars().count() > 1
        && name.chars().any(|c| c.is_uppercase())
        && !name.chars().any(|c| c.is_lowercase());
    if is_constant {
        0
    } else if name.chars().next().is_some_and(|c| c.is_uppercase()) {
        1
    } else {
        2
    }
}

fn render_statement(form: &ImportForm, style: &StyleConfig) -> String {
    match form {
        ImportForm::Straight(name) => format!("import {}\n", name.render()),
        ImportForm::From { module, names } => {
            let mut names = names.clone();
            names.sort_by(|a, b| (name_group(&a.name), a).cmp(&(name_group(&b.name), b)));
            let rendered: Vec<String> = names.iter().map(ImportedName::render).collect();
            render_from(module, &rendered, style)
        }
    }
}

/// Render a `from` import, wrapping names that do not fit in
/// `max_columns`.
fn render_from(module: &str, names: &[String], style: &StyleConfig) -> String {
    let single = format!("from {} import {}", module, names.join(", "));
    if single.len() <= style.max_columns || names.len() < 2 {
        return single + "\n";
    }

    let (open, close, continuation) = match style.multiline {
        MultilineMode::Backslash => ("", "", " \\"),
        MultilineMode::Parentheses => ("(", ")", ""),
    };
    let indent = style.indent_unit();
    let mut lines = Vec::new();
    let mut current = format!("from {module} import {open}");
    let mut line_has_names = false;
    for (i, name) in names.iter().enumerate() {
        let last = i + 1 == names.len();
        let piece = if last {
            format!("{name}{close}")
        } else {
            format!("{name},")
        };
        let reserve = if last { 0 } else { continuation.len() };
        let sep = if line_has_names { " " } else { "" };
        if line_has_names && current.len() + sep.len() + piece.len() + reserve > style.max_columns {
            lines.push(format!("{current}{continuation}"));
            current = format!("{indent}{piece}");
        } else {
            current.push_str(sep);
            current.push_str(&piece);
        }
        line_has_names = true;
    }
    lines.push(current);
    lines.join("\n") + "\n"
}

// ============================================================================
// Block scanning
// ============================================================================

fn is_import(kind: &str) -> bool {
    matches!(
        kind,
        "import_statement" | "import_from_statement" | "future_import_statement"
    )
}

/// Leading import run of a file.
#[derive(Default)]
struct ScannedBlock {
    range: Option<(usize, usize)>,
    statements: Vec<ImportStatement>,
    pinned: Vec<ImportForm>,
}

/// Find the first run of import statements. Anything before it is left
/// alone; comments inside it attach to the following statement.
///
/// Imports at the edges of the run that share a line with other code are
/// pinned: the block stops short of those lines so the code on them is
/// never replaced.
fn scan_block(parsed: &ParsedSource) -> ScannedBlock {
    let root = parsed.root();
    let mut cursor = root.walk();
    let children: Vec<Node<'_>> = root
        .children(&mut cursor)
        .filter(|node| node.kind() != ";")
        .collect();

    let Some(first) = children.iter().position(|node| is_import(node.kind())) else {
        return ScannedBlock::default();
    };
    let end = children[first..]
        .iter()
        .position(|node| !is_import(node.kind()) && node.kind() != "comment")
        .map_or(children.len(), |offset| first + offset);
    let run = &children[first..end];
    let imports: Vec<Node<'_>> = run
        .iter()
        .copied()
        .filter(|node| is_import(node.kind()))
        .collect();

    // Leading imports that continue the line of the statement before.
    let mut shared_row = children[..first]
        .iter()
        .rev()
        .find(|node| node.kind() != "comment")
        .map(|node| node.end_position().row);
    let mut pinned_until = None;
    let mut lead = 0;
    while let (Some(node), Some(row)) = (imports.get(lead), shared_row) {
        if node.start_position().row > row {
            break;
        }
        let bottom = row.max(node.end_position().row);
        shared_row = Some(bottom);
        pinned_until = Some(bottom);
        lead += 1;
    }

    // Trailing imports on the line of the statement after.
    let mut shared_row = children.get(end).map(|node| node.start_position().row);
    let mut trail = imports.len();
    while trail > lead {
        let node = imports[trail - 1];
        match shared_row {
            Some(row) if node.end_position().row >= row => {
                shared_row = Some(row.min(node.start_position().row));
                trail -= 1;
            }
            _ => break,
        }
    }

    let start = match pinned_until {
        Some(row) => row + 1,
        None => imports[0].start_position().row,
    };
    let end_row = imports[lead..trail]
        .last()
        .map_or(start, |node| node.end_position().row + 1);

    let mut block = ScannedBlock {
        range: Some((start, end_row)),
        statements: Vec::new(),
        pinned: imports[..lead]
            .iter()
            .chain(&imports[trail..])
            .flat_map(|node| import_forms(parsed, *node))
            .collect(),
    };

    let mut last_row = None;
    let mut pending_comments = Vec::new();
    let mut index = 0;
    for node in run {
        let row = node.start_position().row;
        if node.kind() == "comment" {
            if row < start || row >= end_row {
                continue;
            }
            let text = parsed.text(*node).trim_end().to_string();
            match block.statements.last_mut() {
                Some(last) if last_row == Some(row) => last.trailing.push(text),
                _ => pending_comments.push(text),
            }
            continue;
        }

        index += 1;
        if index <= lead || index > trail {
            continue;
        }
        last_row = Some(node.end_position().row);
        let mut forms = import_forms(parsed, *node).into_iter();
        if let Some(first) = forms.next() {
            let mut statement = ImportStatement::new(first);
            statement.comments = std::mem::take(&mut pending_comments);
            block.statements.push(statement);
        }
        block.statements.extend(forms.map(ImportStatement::new));
    }

    block
}

fn import_forms(parsed: &ParsedSource, node: Node<'_>) -> Vec<ImportForm> {
    let names: Vec<ImportedName> = field_children(node, "name")
        .into_iter()
        .map(|name| imported_name(parsed, name))
        .collect();
    match node.kind() {
        "import_statement" => names.into_iter().map(ImportForm::Straight).collect(),
        "future_import_statement" => vec![ImportForm::From {
            module: "__future__".to_string(),
            names,
        }],
        _ => {
            let module = node
                .child_by_field_name("module_name")
                .map(|m| compact(parsed.text(m)))
                .unwrap_or_default();
            let mut names = names;
            let mut cursor = node.walk();
            if node
                .named_children(&mut cursor)
                .any(|child| child.kind() == "wildcard_import")
            {
                names.push(ImportedName::new("*"));
            }
            vec![ImportForm::From { module, names }]
        }
    }
}

fn imported_name(parsed: &ParsedSource, node: Node<'_>) -> ImportedName {
    match node.kind() {
        "aliased_import" => ImportedName {
            name: node
                .child_by_field_name("name")
                .map(|n| compact(parsed.text(n)))
                .unwrap_or_default(),
            alias: node
                .child_by_field_name("alias")
                .map(|a| parsed.text(a).to_string()),
        },
        _ => ImportedName::new(compact(parsed.text(node))),
    }
}

/// Dotted names may contain whitespace or line continuations.
fn compact(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace() && *c != '\\')
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
