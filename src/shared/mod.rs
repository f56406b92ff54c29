//! Cross-process shared state
//!
//! Worker processes coordinate only through lock-guarded documents in a
//! shared directory: one holding the run id, one holding the report tree.

mod election;
mod layout;
mod lock;

pub use election::{current_run_id, elect_or_join, Election, ElectionError, RunId};
pub use layout::RunDocuments;
pub use lock::{DocumentError, LockedDocument, OpenMode, SharedDocument};
