//! Cross-node dependency graph.
//!
//! Built incrementally while the tree compiles; lets handlers ask "what
//! else is implicated if this node changes" across multi-hop relationships
//! that a flat timestamp check cannot see. The full-tree walk plus cache
//! remains the actual rebuild strategy; this graph is a query facility.

use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Path, PathBuf};

/// Per-compile adjacency in both directions.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// node -> nodes it depends on ("up")
    up: FxHashMap<PathBuf, FxHashSet<PathBuf>>,
    /// node -> nodes depending on it ("down")
    down: FxHashMap<PathBuf, FxHashSet<PathBuf>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `child` depends on `parent`, in both directions.
    pub fn add_dependency(&mut self, child: &Path, parent: &Path) {
        self.up
            .entry(child.to_path_buf())
            .or_default()
            .insert(parent.to_path_buf());
        self.down
            .entry(parent.to_path_buf())
            .or_default()
            .insert(child.to_path_buf());
    }

    /// Nodes `node` depends on directly.
    pub fn parents_of(&self, node: &Path) -> Option<&FxHashSet<PathBuf>> {
        self.up.get(node)
    }

    /// Nodes directly depending on `node`.
    pub fn children_of(&self, node: &Path) -> Option<&FxHashSet<PathBuf>> {
        self.down.get(node)
    }

    /// Flat transitive closure in both directions, excluding `node` itself.
    ///
    /// Each reached node contributes its own adjacency, so multi-hop
    /// relationships (and cycles) are followed exactly once.
    pub fn find_dependencies(&self, node: &Path) -> FxHashSet<PathBuf> {
        let mut seen: FxHashSet<PathBuf> = FxHashSet::default();
        let mut stack = vec![node.to_path_buf()];
        while let Some(current) = stack.pop() {
            for adjacency in [&self.up, &self.down] {
                if let Some(neighbours) = adjacency.get(&current) {
                    for neighbour in neighbours {
                        if seen.insert(neighbour.clone()) {
                            stack.push(neighbour.clone());
                        }
                    }
                }
            }
        }
        seen.remove(node);
        seen
    }

    pub fn clear(&mut self) {
        self.up.clear();
        self.down.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.up.is_empty() && self.down.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
