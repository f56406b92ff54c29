//! On-disk form of the shared tree

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::MergeError;
use crate::models::HierarchyTree;

/// Everything the workers share about the run besides its id
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TreeDocument {
    pub version: u32,
    pub tree: HierarchyTree,
    /// Workers that have signalled suite completion
    #[serde(default)]
    pub finished_workers: BTreeSet<u32>,
}

impl Default for TreeDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeDocument {
    pub const VERSION: u32 = 1;

    pub fn new() -> Self {
        Self {
            version: Self::VERSION,
            tree: HierarchyTree::new(),
            finished_workers: BTreeSet::new(),
        }
    }

    /// Decode a stored document. Empty content is a fresh tree.
    pub fn decode(bytes: &[u8]) -> Result<Self, MergeError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::new());
        }

        let document: Self = serde_json::from_slice(bytes).map_err(MergeError::Corrupt)?;
        if document.version != Self::VERSION {
            return Err(MergeError::UnsupportedVersion(document.version));
        }
        document.tree.validate()?;
        Ok(document)
    }

    pub fn encode(&self) -> Result<Vec<u8>, MergeError> {
        serde_json::to_vec(self).map_err(MergeError::Serialize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Node, NodeId, NodeKind};

    #[test]
    fn test_empty_bytes_decode_to_fresh_tree() {
        let document = TreeDocument::decode(b"").unwrap();
        assert!(document.tree.is_empty());
        assert!(document.finished_workers.is_empty());
    }

    #[test]
    fn test_round_trip_preserves_graph() {
        let mut document = TreeDocument::new();
        document
            .tree
            .add_child(
                &NodeId::root(),
                Node::new("f".into(), NodeKind::Feature, "Feature: Login"),
            )
            .unwrap();
        document.finished_workers.insert(2);

        let decoded = TreeDocument::decode(&document.encode().unwrap()).unwrap();
        assert_eq!(decoded, document);
    }

    #[test]
    fn test_rejects_garbage_and_future_versions() {
        assert!(matches!(
            TreeDocument::decode(b"not json"),
            Err(MergeError::Corrupt(_))
        ));

        let mut document = TreeDocument::new();
        document.version = 99;
        let bytes = serde_json::to_vec(&document).unwrap();
        assert!(matches!(
            TreeDocument::decode(&bytes),
            Err(MergeError::UnsupportedVersion(99))
        ));
    }
}
