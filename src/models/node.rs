//! Report tree nodes
//!
//! A node is identified by a content-addressable [`NodeId`], so independent
//! worker processes that encounter the same feature, scenario or step agree
//! on its identity without communicating.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use super::{Outcome, Status};

/// Field separator fed to the hasher between identifying fields
const FIELD_SEPARATOR: u8 = 0x1f;

/// Content-addressable node identifier
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Id of the single root node
    pub const ROOT: &'static str = "root";

    pub fn root() -> Self {
        Self(Self::ROOT.to_string())
    }

    /// Derive an id from a domain tag and the node's identifying fields.
    ///
    /// The tag keeps ids of different node kinds apart even when their
    /// fields coincide (a feature and a step on the same line of the same
    /// file, for example).
    pub fn derive<I, S>(tag: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut hasher = Sha256::new();
        hasher.update(tag.as_bytes());
        for field in fields {
            hasher.update([FIELD_SEPARATOR]);
            hasher.update(field.as_ref().as_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == Self::ROOT
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Node kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Root,
    Folder,
    Feature,
    TestCase,
    TestCaseWithExamples,
    Example,
    TestStep,
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Root => "Root",
            NodeKind::Folder => "Folder",
            NodeKind::Feature => "Feature",
            NodeKind::TestCase => "TestCase",
            NodeKind::TestCaseWithExamples => "TestCaseWithExamples",
            NodeKind::Example => "Example",
            NodeKind::TestStep => "TestStep",
        }
    }

    /// Whether a node of this kind may hold a child of `child` kind
    pub fn accepts(&self, child: NodeKind) -> bool {
        use NodeKind::*;
        match self {
            // Root also takes orphaned scenarios whose feature is unknown
            Root | Folder => matches!(child, Folder | Feature | TestCase | TestCaseWithExamples),
            Feature => matches!(child, Folder | TestCase | TestCaseWithExamples),
            TestCaseWithExamples => child == Example,
            TestCase | Example => child == TestStep,
            TestStep => false,
        }
    }

    /// Whether this kind is a scenario (plain or outline)
    pub fn is_scenario(&self) -> bool {
        matches!(self, NodeKind::TestCase | NodeKind::TestCaseWithExamples)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single node of the report tree
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub label: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<NodeId>,

    #[serde(default)]
    pub children: Vec<NodeId>,

    #[serde(default)]
    pub status: Status,

    /// Raw framework outcome, kept when `status` was remapped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// Example row cells
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Entry id assigned by the remote reporting service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
}

impl Node {
    pub fn new(id: NodeId, kind: NodeKind, label: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            label: label.into(),
            parent: None,
            children: Vec::new(),
            status: Status::Unset,
            outcome: None,
            detail: None,
            values: Vec::new(),
            tags: Vec::new(),
            remote_id: None,
        }
    }

    pub fn root() -> Self {
        Self::new(NodeId::root(), NodeKind::Root, NodeId::ROOT)
    }

    pub fn with_values(mut self, values: Vec<String>) -> Self {
        self.values = values;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_remote_id(mut self, remote_id: Option<String>) -> Self {
        self.remote_id = remote_id;
        self
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} [{}]", self.status.symbol(), self.label, self.kind)?;
        if let Some(detail) = &self.detail {
            write!(f, " - {detail}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_is_deterministic() {
        let a = NodeId::derive("feature", ["features/login.feature", "1", "1"]);
        let b = NodeId::derive("feature", ["features/login.feature", "1", "1"]);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_derive_separates_fields() {
        // "1" + "23" and "12" + "3" must not collide
        let a = NodeId::derive("step", ["f.feature", "1", "23"]);
        let b = NodeId::derive("step", ["f.feature", "12", "3"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_derive_separates_tags() {
        let a = NodeId::derive("feature", ["f.feature", "3"]);
        let b = NodeId::derive("step", ["f.feature", "3"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_kind_constraints() {
        assert!(NodeKind::TestCaseWithExamples.accepts(NodeKind::Example));
        assert!(!NodeKind::TestCaseWithExamples.accepts(NodeKind::TestStep));
        assert!(NodeKind::Example.accepts(NodeKind::TestStep));
        assert!(!NodeKind::Example.accepts(NodeKind::Example));
        assert!(NodeKind::Feature.accepts(NodeKind::TestCase));
        assert!(!NodeKind::Feature.accepts(NodeKind::TestStep));
        assert!(NodeKind::Root.accepts(NodeKind::TestCase));
        assert!(!NodeKind::TestStep.accepts(NodeKind::TestStep));
    }

    #[test]
    fn test_root_node() {
        let root = Node::root();
        assert!(root.id.is_root());
        assert_eq!(root.kind, NodeKind::Root);
        assert!(!root.has_children());
    }
}
