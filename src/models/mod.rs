//! Data models for the shared report tree
//!
//! This module contains the node, tree, status and lifecycle event types
//! used throughout the application.

pub mod event;
mod node;
mod status;
mod tree;

pub use event::{
    ExampleRow, FeatureRef, LifecycleEvent, ScenarioRef, StepArgument, StepLocation, StepRef,
};
pub use node::{Node, NodeId, NodeKind};
pub use status::{Outcome, Status};
pub use tree::{HierarchyTree, TreeError};
