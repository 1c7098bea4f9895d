//! Symbol extraction from one Python module.
//!
//! Collects what a module offers for import: classes (with their members),
//! functions, assigned names and imported names, plus the `__all__` export
//! list when the module declares one. Statements nested in `if`, `try`,
//! `with` and loop bodies count as module level.

use std::collections::BTreeSet;

use tree_sitter::Node;
use tugimport_core::types::SymbolKind;

use crate::syntax::{field_children, named_children, string_value, ParsedSource};

/// A name defined by a module, with members for classes.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedSymbol {
    pub name: String,
    pub kind: SymbolKind,
    pub children: Vec<ExtractedSymbol>,
}

impl ExtractedSymbol {
    fn leaf(name: impl Into<String>, kind: SymbolKind) -> Self {
        ExtractedSymbol {
            name: name.into(),
            kind,
            children: Vec::new(),
        }
    }
}

/// Everything indexed from one module.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleSymbols {
    pub symbols: Vec<ExtractedSymbol>,
    /// Names listed in `__all__`, if declared.
    pub exports: Option<BTreeSet<String>>,
}

/// Extract the indexable symbols of a parsed module.
pub fn extract_module(parsed: &ParsedSource) -> ModuleSymbols {
    let mut out = ModuleSymbols::default();
    let mut symbols = Vec::new();
    collect_block(parsed, parsed.root(), &mut symbols, Some(&mut out.exports));
    out.symbols = symbols;
    out
}

fn collect_block(
    parsed: &ParsedSource,
    block: Node<'_>,
    out: &mut Vec<ExtractedSymbol>,
    mut exports: Option<&mut Option<BTreeSet<String>>>,
) {
    for stmt in named_children(block) {
        match stmt.kind() {
            "expression_statement" => {
                for expr in named_children(stmt) {
                    collect_assignment(parsed, expr, out, exports.as_deref_mut());
                }
            }
            "function_definition" | "class_definition" => collect_definition(parsed, stmt, out),
            "decorated_definition" => {
                if let Some(def) = stmt.child_by_field_name("definition") {
                    collect_definition(parsed, def, out);
                }
            }
            "import_statement" => {
                for name in field_children(stmt, "name") {
                    push_public(out, bound_import_name(parsed, name), SymbolKind::Reference);
                }
            }
            "import_from_statement" => {
                for name in field_children(stmt, "name") {
                    push_public(out, bound_import_name(parsed, name), SymbolKind::Reference);
                }
            }
            "if_statement" | "try_statement" | "with_statement" | "for_statement"
            | "while_statement" => {
                for nested in nested_blocks(stmt) {
                    collect_block(parsed, nested, out, exports.as_deref_mut());
                }
            }
            _ => {}
        }
    }
}

fn collect_definition(parsed: &ParsedSource, def: Node<'_>, out: &mut Vec<ExtractedSymbol>) {
    let Some(name) = def.child_by_field_name("name").map(|n| parsed.text(n)) else {
        return;
    };
    if name.starts_with('_') {
        return;
    }
    match def.kind() {
        "function_definition" => out.push(ExtractedSymbol::leaf(name, SymbolKind::Function)),
        "class_definition" => {
            let mut members = Vec::new();
            if let Some(body) = def.child_by_field_name("body") {
                collect_block(parsed, body, &mut members, None);
            }
            out.push(ExtractedSymbol {
                name: name.to_string(),
                kind: SymbolKind::Class,
                children: members,
            });
        }
        _ => {}
    }
}

fn collect_assignment(
    parsed: &ParsedSource,
    expr: Node<'_>,
    out: &mut Vec<ExtractedSymbol>,
    exports: Option<&mut Option<BTreeSet<String>>>,
) {
    match expr.kind() {
        "assignment" => {
            let (Some(left), right) = (
                expr.child_by_field_name("left"),
                expr.child_by_field_name("right"),
            ) else {
                return;
            };
            if parsed.text(left) == "__all__" {
                if let (Some(exports), Some(right)) = (exports, right) {
                    *exports = Some(string_list(parsed, right));
                }
                return;
            }
            let mut names = Vec::new();
            target_names(parsed, left, &mut names);
            for name in names {
                push_public(out, name, SymbolKind::Variable);
            }
            // Chained assignment: `a = b = 1`.
            if let Some(right) = right.filter(|r| r.kind() == "assignment") {
                collect_assignment(parsed, right, out, None);
            }
        }
        "augmented_assignment" => {
            let left = expr.child_by_field_name("left");
            let right = expr.child_by_field_name("right");
            if let (Some(left), Some(right), Some(exports)) = (left, right, exports) {
                if parsed.text(left) == "__all__" {
                    exports
                        .get_or_insert_with(BTreeSet::new)
                        .extend(string_list(parsed, right));
                }
            }
        }
        _ => {}
    }
}

/// Plain names bound by an assignment target.
fn target_names<'s>(parsed: &'s ParsedSource, target: Node<'_>, out: &mut Vec<&'s str>) {
    match target.kind() {
        "identifier" => out.push(parsed.text(target)),
        "pattern_list" | "tuple_pattern" | "list_pattern" | "tuple" | "list"
        | "parenthesized_expression" | "list_splat_pattern" => {
            for child in named_children(target) {
                target_names(parsed, child, out);
            }
        }
        _ => {}
    }
}

/// Name an import binds: the alias when present, otherwise the full dotted
/// name.
fn bound_import_name<'s>(parsed: &'s ParsedSource, node: Node<'_>) -> &'s str {
    match node.kind() {
        "aliased_import" => node
            .child_by_field_name("alias")
            .map(|alias| parsed.text(alias))
            .unwrap_or(""),
        _ => parsed.text(node),
    }
}

fn push_public(out: &mut Vec<ExtractedSymbol>, name: &str, kind: SymbolKind) {
    if !name.is_empty() && !name.starts_with('_') {
        out.push(ExtractedSymbol::leaf(name, kind));
    }
}

/// String entries of a list or tuple literal.
fn string_list(parsed: &ParsedSource, node: Node<'_>) -> BTreeSet<String> {
    match node.kind() {
        "list" | "tuple" | "parenthesized_expression" => named_children(node)
            .into_iter()
            .filter_map(|item| string_value(parsed, item))
            .collect(),
        _ => BTreeSet::new(),
    }
}

/// Blocks of a compound statement, including its clauses.
pub(crate) fn nested_blocks(stmt: Node<'_>) -> Vec<Node<'_>> {
    let mut blocks = Vec::new();
    for child in named_children(stmt) {
        if child.kind() == "block" {
            blocks.push(child);
        } else if child.kind().ends_with("_clause") {
            blocks.extend(
                named_children(child)
                    .into_iter()
                    .filter(|n| n.kind() == "block"),
            );
        }
    }
    blocks
}
