//! Arena-backed hierarchical symbol tree.
//!
//! Nodes live in a flat `Vec` and refer to each other by [`NodeId`]. A
//! node's dotted path and depth are computed once when it is inserted.
//! Pruning detaches a node from its parent's child map; detached nodes stay
//! in the arena but are unreachable from the root and never flattened.

use std::collections::{BTreeMap, BTreeSet};

use tugimport_core::types::{IndexDocument, Location, ScoreWeights, SymbolKind};

/// Index of a node in the arena.
pub type NodeId = usize;

/// One entry in the symbol tree.
#[derive(Debug, Clone)]
pub struct SymbolNode {
    pub name: String,
    pub kind: SymbolKind,
    pub score: f64,
    pub location: Location,
    /// File that defined the node; empty for the root and builtin modules.
    pub filename: String,
    pub parent: Option<NodeId>,
    pub children: BTreeMap<String, NodeId>,
    path: String,
    depth: usize,
}

impl SymbolNode {
    /// Dot-joined names from the root to this node.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Number of ancestors.
    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// Hierarchical index of modules, packages and their symbols.
#[derive(Debug, Clone)]
pub struct SymbolTree {
    nodes: Vec<SymbolNode>,
}

/// Root node id.
pub const ROOT: NodeId = 0;

impl Default for SymbolTree {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTree {
    pub fn new() -> Self {
        SymbolTree {
            nodes: vec![SymbolNode {
                name: String::new(),
                kind: SymbolKind::Package,
                score: 1.0,
                location: Location::Local,
                filename: String::new(),
                parent: None,
                children: BTreeMap::new(),
                path: String::new(),
                depth: 0,
            }],
        }
    }

    pub fn node(&self, id: NodeId) -> &SymbolNode {
        &self.nodes[id]
    }

    /// Child of `parent` named `name`.
    pub fn child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.nodes[parent].children.get(name).copied()
    }

    /// Look up a node by dotted path from the root.
    pub fn find(&self, path: &str) -> Option<NodeId> {
        if path.is_empty() {
            return Some(ROOT);
        }
        path.split('.')
            .try_fold(ROOT, |id, segment| self.child(id, segment))
    }

    /// Add a child under `parent`.
    ///
    /// An existing child with the same name is kept when it is a container
    /// or scores at least as high; otherwise it is replaced by the new node.
    /// Returns the id of the child that ends up in the tree.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        name: &str,
        kind: SymbolKind,
        score: f64,
        location: Location,
        filename: &str,
    ) -> NodeId {
        if let Some(existing) = self.child(parent, name) {
            let node = &self.nodes[existing];
            if node.kind.is_container() || node.score >= score {
                return existing;
            }
        }

        let parent_node = &self.nodes[parent];
        let path = if parent_node.path.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", parent_node.path, name)
        };
        let depth = parent_node.depth + 1;

        let id = self.nodes.len();
        self.nodes.push(SymbolNode {
            name: name.to_string(),
            kind,
            score,
            location,
            filename: filename.to_string(),
            parent: Some(parent),
            children: BTreeMap::new(),
            path,
            depth,
        });
        self.nodes[parent].children.insert(name.to_string(), id);
        id
    }

    /// Detach `name` from `parent`. Returns whether a child was removed.
    pub fn prune(&mut self, parent: NodeId, name: &str) -> bool {
        self.nodes[parent].children.remove(name).is_some()
    }

    /// Keep only the children of `id` whose names are in `exports`.
    pub fn retain_exports(&mut self, id: NodeId, exports: &BTreeSet<String>) -> usize {
        let before = self.nodes[id].children.len();
        self.nodes[id]
            .children
            .retain(|name, _| exports.contains(name));
        before - self.nodes[id].children.len()
    }

    /// Number of reachable nodes below the root, at least 1.
    pub fn power(&self) -> usize {
        self.count_below(ROOT).max(1)
    }

    fn count_below(&self, id: NodeId) -> usize {
        self.nodes[id]
            .children
            .values()
            .map(|child| 1 + self.count_below(*child))
            .sum()
    }

    /// Flatten the tree into documents.
    ///
    /// Each container's children are scored with the container's scale,
    /// which starts at 1.0 below the root and becomes
    /// `child.score * scale - depth_decay` one level further down. Names
    /// containing a dot are kept in the tree but never emitted. With
    /// `only_files`, documents whose filename is not in the set are skipped.
    pub fn flatten(
        &self,
        weights: &ScoreWeights,
        only_files: Option<&BTreeSet<String>>,
    ) -> Vec<IndexDocument> {
        let mut out = Vec::new();
        self.flatten_into(ROOT, 1.0, weights.depth_decay, only_files, &mut out);
        out
    }

    fn flatten_into(
        &self,
        id: NodeId,
        scale: f64,
        decay: f64,
        only_files: Option<&BTreeSet<String>>,
        out: &mut Vec<IndexDocument>,
    ) {
        let container = &self.nodes[id];
        for (name, &child_id) in &container.children {
            let child = &self.nodes[child_id];
            if !child.children.is_empty() {
                self.flatten_into(child_id, child.score * scale - decay, decay, only_files, out);
            }
            if name.contains('.') {
                continue;
            }
            if let Some(files) = only_files {
                if !files.contains(&child.filename) {
                    continue;
                }
            }
            out.push(IndexDocument {
                filename: child.filename.clone(),
                symbol: name.clone(),
                module: container.path.clone(),
                location: child.location,
                kind: child.kind,
                sort_score: IndexDocument::sort_score_for(child.score, scale),
            });
        }
    }
}
