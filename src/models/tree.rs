//! Hierarchy tree
//!
//! The tree is an arena of nodes keyed by [`NodeId`]. Parent/child edges are
//! stored as ids, so the structure serializes without cycles and a node can
//! be located by id in one lookup.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

use super::{Node, NodeId, NodeKind};

/// Structural violations of the tree invariants
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TreeError {
    #[error("Node {0} already exists")]
    DuplicateNode(NodeId),

    #[error("Parent node {0} does not exist")]
    MissingParent(NodeId),

    #[error("{parent} node cannot hold a {child} child ({id})")]
    InvalidChild {
        parent: NodeKind,
        child: NodeKind,
        id: NodeId,
    },

    #[error("Tree has no root node")]
    MissingRoot,

    #[error("Node {0} is not reachable from the root")]
    Unreachable(NodeId),

    #[error("Node {parent} lists child {child} which does not point back to it")]
    BrokenEdge { parent: NodeId, child: NodeId },
}

/// Rooted, ordered report tree
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HierarchyTree {
    nodes: BTreeMap<NodeId, Node>,
}

impl Default for HierarchyTree {
    fn default() -> Self {
        Self::new()
    }
}

impl HierarchyTree {
    /// Create a tree holding only the root
    pub fn new() -> Self {
        let root = Node::root();
        let mut nodes = BTreeMap::new();
        nodes.insert(root.id.clone(), root);
        Self { nodes }
    }

    pub fn root(&self) -> &Node {
        // The root is inserted on construction and checked by `validate`
        &self.nodes[&NodeId::root()]
    }

    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of nodes, root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Attach `node` as the last child of `parent`
    pub fn add_child(&mut self, parent: &NodeId, mut node: Node) -> Result<NodeId, TreeError> {
        if self.nodes.contains_key(&node.id) {
            return Err(TreeError::DuplicateNode(node.id));
        }

        let parent_node = self
            .nodes
            .get_mut(parent)
            .ok_or_else(|| TreeError::MissingParent(parent.clone()))?;

        if !parent_node.kind.accepts(node.kind) {
            return Err(TreeError::InvalidChild {
                parent: parent_node.kind,
                child: node.kind,
                id: node.id,
            });
        }

        let id = node.id.clone();
        parent_node.children.push(id.clone());
        node.parent = Some(parent.clone());
        self.nodes.insert(id.clone(), node);
        Ok(id)
    }

    /// Children of `id` in insertion order
    pub fn children<'a>(&'a self, id: &NodeId) -> impl Iterator<Item = &'a Node> + 'a {
        self.nodes
            .get(id)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|child| self.nodes.get(child))
    }

    /// Nodes with the given kind, in pre-order
    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<&Node> {
        self.pre_order()
            .into_iter()
            .filter(|node| node.kind == kind)
            .collect()
    }

    /// Depth-first, left-to-right pre-order traversal starting at the root
    pub fn pre_order(&self) -> Vec<&Node> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root()];

        while let Some(node) = stack.pop() {
            order.push(node);
            for child in node.children.iter().rev() {
                if let Some(child) = self.nodes.get(child) {
                    stack.push(child);
                }
            }
        }

        order
    }

    /// Depth-first post-order traversal, children before their parent
    pub fn post_order(&self) -> Vec<&Node> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(self.root(), false)];

        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                order.push(node);
                continue;
            }
            stack.push((node, true));
            for child in node.children.iter().rev() {
                if let Some(child) = self.nodes.get(child) {
                    stack.push((child, false));
                }
            }
        }

        order
    }

    /// Nearest ancestor of `id` satisfying `predicate`
    pub fn find_ancestor(&self, id: &NodeId, predicate: impl Fn(&Node) -> bool) -> Option<&Node> {
        let mut current = self.nodes.get(id)?.parent.as_ref();
        while let Some(parent_id) = current {
            let parent = self.nodes.get(parent_id)?;
            if predicate(parent) {
                return Some(parent);
            }
            current = parent.parent.as_ref();
        }
        None
    }

    /// Check the structural invariants of a tree loaded from disk
    pub fn validate(&self) -> Result<(), TreeError> {
        let root = self.nodes.get(&NodeId::root()).ok_or(TreeError::MissingRoot)?;
        if root.kind != NodeKind::Root {
            return Err(TreeError::MissingRoot);
        }

        let mut seen = HashSet::with_capacity(self.nodes.len());
        let mut stack = vec![root];

        while let Some(node) = stack.pop() {
            seen.insert(&node.id);
            for child_id in &node.children {
                let child = self
                    .nodes
                    .get(child_id)
                    .filter(|child| child.parent.as_ref() == Some(&node.id))
                    .ok_or_else(|| TreeError::BrokenEdge {
                        parent: node.id.clone(),
                        child: child_id.clone(),
                    })?;
                if !node.kind.accepts(child.kind) {
                    return Err(TreeError::InvalidChild {
                        parent: node.kind,
                        child: child.kind,
                        id: child.id.clone(),
                    });
                }
                if seen.contains(&child.id) {
                    return Err(TreeError::DuplicateNode(child.id.clone()));
                }
                stack.push(child);
            }
        }

        match self.nodes.keys().find(|id| !seen.contains(id)) {
            Some(id) => Err(TreeError::Unreachable(id.clone())),
            None => Ok(()),
        }
    }
}
