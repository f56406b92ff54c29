//! parallel-report
//!
//! Merges the results of test workers running in separate processes into one
//! shared report tree. Each worker applies its lifecycle events to a tree
//! document guarded by an OS file lock; the last worker to finish aggregates
//! the tree, closes the remote run and removes the shared documents.

pub mod cli;
pub mod config;
pub mod engine;
pub mod http;
pub mod models;
pub mod output;
pub mod portal;
pub mod results;
pub mod session;
pub mod shared;
pub mod utils;
