//! Tree-sitter parsing for Python sources.
//!
//! [`ParsedSource`] owns the source text together with its syntax tree so
//! node text can be sliced without threading the source through every call.

use std::fmt;

use thiserror::Error;
use tree_sitter::{Node, Parser, Tree};

/// Errors produced while parsing Python source.
#[derive(Debug, Error)]
pub enum SyntaxError {
    /// The grammar could not be loaded into the parser.
    #[error("failed to initialize Python grammar: {0}")]
    LanguageInit(String),

    /// The parser gave up without producing a tree.
    #[error("parser produced no tree")]
    NoTree,

    /// The tree contains error or missing nodes.
    #[error("invalid syntax at {position}")]
    Invalid { position: Position },
}

/// Zero-based line and column of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.column + 1)
    }
}

/// Source text plus its tree-sitter tree.
pub struct ParsedSource {
    source: String,
    tree: Tree,
}

impl ParsedSource {
    /// Parse `source`. Syntax errors do not fail the parse; check
    /// [`ParsedSource::first_error`] or use [`ParsedSource::parse_strict`].
    pub fn parse(source: impl Into<String>) -> Result<Self, SyntaxError> {
        let source = source.into();
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| SyntaxError::LanguageInit(e.to_string()))?;
        let tree = parser.parse(&source, None).ok_or(SyntaxError::NoTree)?;
        Ok(ParsedSource { source, tree })
    }

    /// Parse `source`, rejecting trees that contain syntax errors.
    pub fn parse_strict(source: impl Into<String>) -> Result<Self, SyntaxError> {
        let parsed = Self::parse(source)?;
        match parsed.first_error() {
            Some(position) => Err(SyntaxError::Invalid { position }),
            None => Ok(parsed),
        }
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Source text covered by `node`.
    pub fn text(&self, node: Node<'_>) -> &str {
        self.source.get(node.byte_range()).unwrap_or("")
    }

    /// Position of the first error or missing node, if any.
    pub fn first_error(&self) -> Option<Position> {
        let root = self.root();
        if !root.has_error() {
            return None;
        }
        find_error(root).map(|node| {
            let point = node.start_position();
            Position {
                line: point.row,
                column: point.column,
            }
        })
    }
}

fn find_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|child| child.has_error())
        .find_map(find_error)
        .or(Some(node))
}

/// Named children of `node`, skipping comments.
pub fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .collect()
}

/// All children of `node` with the given field name.
pub fn field_children<'t>(node: Node<'t>, field: &str) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children_by_field_name(field, &mut cursor).collect()
}

/// Decoded value of a plain string literal, `None` for f-strings and
/// concatenations.
pub fn string_value(parsed: &ParsedSource, node: Node<'_>) -> Option<String> {
    if node.kind() != "string" {
        return None;
    }
    let mut value = String::new();
    for child in named_children(node) {
        match child.kind() {
            "string_start" | "string_end" => {}
            "string_content" => value.push_str(parsed.text(child)),
            _ => return None,
        }
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_source() {
        let parsed = ParsedSource::parse("import os\nx = 1\n").unwrap();
        assert_eq!(parsed.root().kind(), "module");
        assert_eq!(parsed.first_error(), None);
        let first = parsed.root().named_child(0).unwrap();
        assert_eq!(parsed.text(first), "import os");
    }

    #[test]
    fn strict_parse_reports_error_position() {
        let err = ParsedSource::parse_strict("x = 1\ndef (:\n").err().unwrap();
        match err {
            SyntaxError::Invalid { position } => assert_eq!(position.line, 1),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn tolerant_parse_keeps_tree() {
        let parsed = ParsedSource::parse("x = (\n").unwrap();
        assert!(parsed.first_error().is_some());
    }

    #[test]
    fn string_values() {
        let parsed = ParsedSource::parse("a = 'abc'\nb = f'{a}'\n").unwrap();
        let strings: Vec<Option<String>> = named_children(parsed.root())
            .into_iter()
            .map(|stmt| {
                let assign = stmt.named_child(0).unwrap();
                let right = assign.child_by_field_name("right").unwrap();
                string_value(&parsed, right)
            })
            .collect();
        assert_eq!(strings, vec![Some("abc".to_string()), None]);
    }
}
