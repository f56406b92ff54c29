//! Tree merge engine
//!
//! Every lifecycle event becomes one read-modify-write cycle over the shared
//! tree document: lock, load, locate-or-create, mutate, persist, release.

mod document;
mod merge;

pub use document::TreeDocument;
pub use merge::{MergeOutcome, TreeMergeEngine};

use thiserror::Error;

use crate::models::{NodeId, TreeError};
use crate::shared::DocumentError;

/// Errors raised by a merge cycle
#[derive(Error, Debug)]
pub enum MergeError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("Tree document is corrupt: {0}")]
    Corrupt(#[source] serde_json::Error),

    #[error("Failed to serialize tree document: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Unsupported tree document version {0}")]
    UnsupportedVersion(u32),

    #[error("No node {id} in the tree for {event}")]
    NodeNotFound { id: NodeId, event: &'static str },
}
