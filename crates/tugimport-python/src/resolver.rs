//! Scope resolution: unresolved names and unreferenced imports.
//!
//! A single pass over the syntax tree keeps a stack of [`Frame`]s, one per
//! module, class, function, lambda or comprehension. A name use is looked up
//! from the innermost frame outward, skipping enclosing class bodies. Uses
//! that find nothing are parked in the current frame's `pending` set:
//!
//! - a later definition in the same frame resolves them (forward
//!   references, e.g. a helper defined below its caller),
//! - when the frame is popped, the rest are retried against the enclosing
//!   frames and otherwise handed to the nearest non-class ancestor,
//! - whatever is still pending in the module frame at the end, minus
//!   builtins, is unresolved.
//!
//! Attribute chains only ever contribute their leftmost name.

use std::collections::{BTreeSet, HashMap, HashSet};

use tree_sitter::Node;

use crate::builtins::is_builtin;
use crate::syntax::{field_children, named_children, string_value, ParsedSource, SyntaxError};

/// Outcome of resolving one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Free names bound nowhere, root segment only.
    pub unresolved: BTreeSet<String>,
    /// Imports never used. Plain `import a.b` is reported as `a.b`, other
    /// imports by the name they bind.
    pub unreferenced: BTreeSet<String>,
}

/// Parse and resolve `source`. Syntax errors are tolerated; the resolver
/// works on whatever tree the parser recovered.
pub fn resolve_source(source: &str) -> Result<Resolution, SyntaxError> {
    let parsed = ParsedSource::parse(source)?;
    Ok(resolve(&parsed))
}

/// Resolve an already parsed file.
pub fn resolve(parsed: &ParsedSource) -> Resolution {
    let mut resolver = Resolver {
        parsed,
        frames: vec![Frame::new(FrameKind::Module)],
        imports: Vec::new(),
    };
    resolver.visit_children(parsed.root());
    resolver.finish()
}

// ============================================================================
// Frames
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Module,
    Class,
    Function,
    Comprehension,
}

#[derive(Debug)]
struct Frame {
    kind: FrameKind,
    /// Bound names with the import records that bound them. A later plain
    /// definition keeps the records so uses still count.
    bindings: HashMap<String, Vec<usize>>,
    pending: BTreeSet<String>,
    globals: HashSet<String>,
}

impl Frame {
    fn new(kind: FrameKind) -> Self {
        Frame {
            kind,
            bindings: HashMap::new(),
            pending: BTreeSet::new(),
            globals: HashSet::new(),
        }
    }
}

#[derive(Debug)]
struct ImportRecord {
    reported: String,
    used: bool,
}

struct Resolver<'s> {
    parsed: &'s ParsedSource,
    frames: Vec<Frame>,
    imports: Vec<ImportRecord>,
}

impl<'s> Resolver<'s> {
    fn text(&self, node: Node<'_>) -> &'s str {
        self.parsed.text(node)
    }

    fn top(&self) -> usize {
        self.frames.len() - 1
    }

    /// Frame index binding `name` as seen from the top frame.
    fn lookup(&self, name: &str) -> Option<usize> {
        let top = self.top();
        if self.frames[top].globals.contains(name) {
            return self.frames[0].bindings.contains_key(name).then_some(0);
        }
        self.visible_from(top + 1, name, Some(top))
    }

    /// Search frames below `end`, newest first. Class frames are only
    /// visible when they are `own`.
    fn visible_from(&self, end: usize, name: &str, own: Option<usize>) -> Option<usize> {
        (0..end).rev().find(|&i| {
            let frame = &self.frames[i];
            (frame.kind != FrameKind::Class || Some(i) == own) && frame.bindings.contains_key(name)
        })
    }

    fn mark_used(&mut self, frame: usize, name: &str) {
        if let Some(imports) = self.frames[frame].bindings.get(name) {
            for &idx in imports {
                self.imports[idx].used = true;
            }
        }
    }

    fn use_name(&mut self, name: &str) {
        if name.is_empty() {
            return;
        }
        match self.lookup(name) {
            Some(frame) => self.mark_used(frame, name),
            None => {
                let top = self.top();
                self.frames[top].pending.insert(name.to_string());
            }
        }
    }

    fn define(&mut self, name: &str, import: Option<usize>) {
        if name.is_empty() {
            return;
        }
        let top = self.top();
        let target = if self.frames[top].globals.contains(name) {
            0
        } else {
            top
        };
        let frame = &mut self.frames[target];
        frame
            .bindings
            .entry(name.to_string())
            .or_default()
            .extend(import);

        if frame.pending.remove(name) {
            self.mark_used(target, name);
        }
    }

    fn push(&mut self, kind: FrameKind) {
        self.frames.push(Frame::new(kind));
    }

    fn pop(&mut self) {
        let Some(frame) = self.frames.pop() else {
            return;
        };
        let end = self.frames.len();
        let heir = (0..end)
            .rev()
            .find(|&i| self.frames[i].kind != FrameKind::Class)
            .unwrap_or(0);
        for name in frame.pending {
            match self.visible_from(end, &name, None) {
                Some(found) => self.mark_used(found, &name),
                None => {
                    self.frames[heir].pending.insert(name);
                }
            }
        }
    }

    fn finish(mut self) -> Resolution {
        while self.frames.len() > 1 {
            self.pop();
        }
        let module = &self.frames[0];
        Resolution {
            unresolved: module
                .pending
                .iter()
                .filter(|name| !is_builtin(name))
                .cloned()
                .collect(),
            unreferenced: self
                .imports
                .iter()
                .filter(|record| !record.used)
                .map(|record| record.reported.clone())
                .collect(),
        }
    }

    // ========================================================================
    // Visiting
    // ========================================================================

    fn visit_children(&mut self, node: Node<'_>) {
        for child in named_children(node) {
            self.visit(child);
        }
    }

    fn visit_field(&mut self, node: Node<'_>, field: &str) {
        for child in field_children(node, field) {
            self.visit(child);
        }
    }

    fn visit(&mut self, node: Node<'_>) {
        match node.kind() {
            "identifier" => {
                let name = self.text(node);
                self.use_name(name);
            }
            "dotted_name" => {
                if let Some(first) = named_children(node).first() {
                    let name = self.text(*first);
                    self.use_name(name);
                }
            }
            "attribute" => {
                if let Some(object) = node.child_by_field_name("object") {
                    self.visit(object);
                }
            }
            "keyword_argument" => {
                if let Some(value) = node.child_by_field_name("value") {
                    self.visit(value);
                }
            }
            "string" => {
                for child in named_children(node) {
                    if child.kind() == "interpolation" {
                        self.visit_children(child);
                    }
                }
            }
            "type" => self.visit_annotation(node),
            "import_statement" => self.visit_import(node),
            "import_from_statement" => self.visit_import_from(node),
            "future_import_statement" => {
                for name in field_children(node, "name") {
                    let bound = self.import_binding_name(name);
                    self.define(bound, None);
                }
            }
            "function_definition" => self.visit_function(node),
            "class_definition" => self.visit_class(node),
            "decorated_definition" => {
                for child in named_children(node) {
                    if child.kind() == "decorator" {
                        self.visit_children(child);
                    }
                }
                if let Some(definition) = node.child_by_field_name("definition") {
                    self.visit(definition);
                }
            }
            "lambda" => self.visit_lambda(node),
            "list_comprehension" | "set_comprehension" | "dictionary_comprehension"
            | "generator_expression" => self.visit_comprehension(node),
            "assignment" => self.visit_assignment(node),
            "augmented_assignment" => {
                self.visit_field(node, "right");
                self.visit_field(node, "left");
                if self.frames.len() == 1 {
                    if let (Some(left), Some(right)) = (
                        node.child_by_field_name("left"),
                        node.child_by_field_name("right"),
                    ) {
                        if self.text(left) == "__all__" {
                            self.use_exported(right);
                        }
                    }
                }
            }
            "named_expression" => {
                self.visit_field(node, "value");
                if let Some(name) = node.child_by_field_name("name") {
                    let name = self.text(name);
                    self.define_outside_comprehension(name);
                }
            }
            "for_statement" => {
                self.visit_field(node, "right");
                if let Some(left) = node.child_by_field_name("left") {
                    self.bind_target(left);
                }
                self.visit_field(node, "body");
                self.visit_field(node, "alternative");
            }
            "as_pattern" => {
                let alias = node.child_by_field_name("alias");
                for child in named_children(node) {
                    if Some(child) == alias {
                        self.bind_target(child);
                    } else {
                        self.visit(child);
                    }
                }
            }
            "except_clause" => self.visit_except(node),
            "global_statement" => {
                let top = self.top();
                for child in named_children(node) {
                    let name = self.text(child).to_string();
                    self.frames[top].globals.insert(name);
                }
            }
            "nonlocal_statement" => {}
            "type_alias_statement" => {
                self.visit_field(node, "right");
                if let Some(left) = node.child_by_field_name("left") {
                    self.bind_target(left);
                }
            }
            "case_pattern" => {
                for child in named_children(node) {
                    if child.kind() == "dotted_name" && named_children(child).len() == 1 {
                        // Bare name in a case pattern captures.
                        let name = self.text(child);
                        self.define(name, None);
                    } else {
                        self.visit(child);
                    }
                }
            }
            "keyword_pattern" => {
                for child in named_children(node).into_iter().skip(1) {
                    self.visit(child);
                }
            }
            "splat_pattern" => {
                for child in named_children(node) {
                    self.bind_target(child);
                }
            }
            _ => self.visit_children(node),
        }
    }

    fn visit_annotation(&mut self, node: Node<'_>) {
        for child in named_children(node) {
            match string_value(self.parsed, child) {
                Some(text) => {
                    for name in annotation_names(&text) {
                        self.use_name(&name);
                    }
                }
                None => self.visit(child),
            }
        }
    }

    fn import_binding_name(&self, node: Node<'_>) -> &'s str {
        match node.kind() {
            "aliased_import" => node
                .child_by_field_name("alias")
                .map(|alias| self.text(alias))
                .unwrap_or(""),
            _ => self.text(node),
        }
    }

    fn record_import(&mut self, bound: &str, reported: &str) {
        if bound.is_empty() {
            return;
        }
        let idx = self.imports.len();
        self.imports.push(ImportRecord {
            reported: reported.to_string(),
            used: false,
        });
        self.define(bound, Some(idx));
    }

    fn visit_import(&mut self, node: Node<'_>) {
        for name in field_children(node, "name") {
            match name.kind() {
                "aliased_import" => {
                    let alias = self.import_binding_name(name);
                    self.record_import(alias, alias);
                }
                _ => {
                    let full = self.text(name);
                    let root = full.split('.').next().unwrap_or("");
                    self.record_import(root, full);
                }
            }
        }
    }

    fn visit_import_from(&mut self, node: Node<'_>) {
        for name in field_children(node, "name") {
            let bound = self.import_binding_name(name);
            self.record_import(bound, bound);
        }
    }

    /// Visit defaults and annotations of a parameter list in the current
    /// frame.
    fn visit_parameter_expressions(&mut self, params: Node<'_>) {
        for param in named_children(params) {
            self.visit_field(param, "type");
            self.visit_field(param, "value");
        }
    }

    fn bind_parameters(&mut self, params: Node<'_>) {
        for param in named_children(params) {
            match param.kind() {
                "identifier" => {
                    let name = self.text(param);
                    self.define(name, None);
                }
                "default_parameter" | "typed_default_parameter" => {
                    if let Some(name) = param.child_by_field_name("name") {
                        self.bind_parameter_name(name);
                    }
                }
                "typed_parameter" | "list_splat_pattern" | "dictionary_splat_pattern" => {
                    let annotation = param.child_by_field_name("type");
                    for child in named_children(param) {
                        if Some(child) != annotation {
                            self.bind_parameter_name(child);
                        }
                    }
                }
                "tuple_pattern" => self.bind_parameter_name(param),
                _ => {}
            }
        }
    }

    fn bind_parameter_name(&mut self, node: Node<'_>) {
        match node.kind() {
            "identifier" => {
                let name = self.text(node);
                self.define(name, None);
            }
            _ => {
                for child in named_children(node) {
                    self.bind_parameter_name(child);
                }
            }
        }
    }

    fn visit_function(&mut self, node: Node<'_>) {
        let params = node.child_by_field_name("parameters");
        if let Some(params) = params {
            self.visit_parameter_expressions(params);
        }
        self.visit_field(node, "return_type");
        if let Some(name) = node.child_by_field_name("name") {
            let name = self.text(name);
            self.define(name, None);
        }

        self.push(FrameKind::Function);
        if let Some(params) = params {
            self.bind_parameters(params);
        }
        self.visit_field(node, "body");
        self.pop();
    }

    fn visit_lambda(&mut self, node: Node<'_>) {
        let params = node.child_by_field_name("parameters");
        if let Some(params) = params {
            self.visit_parameter_expressions(params);
        }
        self.push(FrameKind::Function);
        if let Some(params) = params {
            self.bind_parameters(params);
        }
        self.visit_field(node, "body");
        self.pop();
    }

    fn visit_class(&mut self, node: Node<'_>) {
        self.visit_field(node, "superclasses");
        self.push(FrameKind::Class);
        self.visit_field(node, "body");
        self.pop();
        if let Some(name) = node.child_by_field_name("name") {
            let name = self.text(name);
            self.define(name, None);
        }
    }

    fn visit_comprehension(&mut self, node: Node<'_>) {
        self.push(FrameKind::Comprehension);
        for clause in named_children(node) {
            match clause.kind() {
                "for_in_clause" => {
                    self.visit_field(clause, "right");
                    for left in field_children(clause, "left") {
                        self.bind_target(left);
                    }
                }
                "if_clause" => self.visit_children(clause),
                _ => {}
            }
        }
        self.visit_field(node, "body");
        self.pop();
    }

    fn visit_assignment(&mut self, node: Node<'_>) {
        self.visit_field(node, "right");
        self.visit_field(node, "type");
        let Some(left) = node.child_by_field_name("left") else {
            return;
        };
        self.bind_target(left);

        if self.frames.len() == 1 && self.text(left) == "__all__" {
            if let Some(right) = node.child_by_field_name("right") {
                self.use_exported(right);
            }
        }
    }

    /// Names listed in `__all__` count as used.
    fn use_exported(&mut self, list: Node<'_>) {
        for item in named_children(list) {
            if let Some(name) = string_value(self.parsed, item) {
                self.use_name(&name);
            }
        }
    }

    fn visit_except(&mut self, node: Node<'_>) {
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
        let mut bind_next = false;
        for child in children {
            if !child.is_named() {
                bind_next = matches!(child.kind(), "as" | ",");
                continue;
            }
            if bind_next && child.kind() != "block" {
                self.bind_target(child);
            } else {
                self.visit(child);
            }
            bind_next = false;
        }
    }

    fn define_outside_comprehension(&mut self, name: &str) {
        let top = self.top();
        let target = (0..=top)
            .rev()
            .find(|&i| self.frames[i].kind != FrameKind::Comprehension)
            .unwrap_or(0);
        let saved: Vec<Frame> = self.frames.drain(target + 1..).collect();
        self.define(name, None);
        self.frames.extend(saved);
    }

    /// Bind the names an assignment-like target introduces; attribute and
    /// subscript targets are uses of their base.
    fn bind_target(&mut self, node: Node<'_>) {
        match node.kind() {
            "identifier" => {
                let name = self.text(node);
                self.define(name, None);
            }
            "pattern_list" | "tuple_pattern" | "list_pattern" | "tuple" | "list"
            | "parenthesized_expression" | "list_splat_pattern" | "list_splat"
            | "as_pattern_target" => {
                for child in named_children(node) {
                    self.bind_target(child);
                }
            }
            _ => self.visit(node),
        }
    }
}

/// Free names referenced by a string annotation such as `"Optional[Foo]"`.
fn annotation_names(text: &str) -> Vec<String> {
    let Ok(parsed) = ParsedSource::parse(text) else {
        return Vec::new();
    };
    if parsed.first_error().is_some() {
        return Vec::new();
    }
    let mut names = Vec::new();
    collect_annotation_names(&parsed, parsed.root(), &mut names);
    names
}

fn collect_annotation_names(parsed: &ParsedSource, node: Node<'_>, out: &mut Vec<String>) {
    match node.kind() {
        "identifier" => out.push(parsed.text(node).to_string()),
        "attribute" => {
            if let Some(object) = node.child_by_field_name("object") {
                collect_annotation_names(parsed, object, out);
            }
        }
        _ => {
            for child in named_children(node) {
                collect_annotation_names(parsed, child, out);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
