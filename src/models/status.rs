//! Status models for report tree nodes
//!
//! Defines the raw outcomes reported by the test framework and the
//! statuses stored on (and derived for) tree nodes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a step or scenario as reported by the test framework
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Passed,
    Failed,
    Skipped,
    Pending,
    Undefined,
    Error,
}

impl Outcome {
    /// Parse from the framework's outcome name
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "passed" => Some(Outcome::Passed),
            "failed" => Some(Outcome::Failed),
            "skipped" => Some(Outcome::Skipped),
            "pending" => Some(Outcome::Pending),
            "undefined" => Some(Outcome::Undefined),
            "error" => Some(Outcome::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Passed => "passed",
            Outcome::Failed => "failed",
            Outcome::Skipped => "skipped",
            Outcome::Pending => "pending",
            Outcome::Undefined => "undefined",
            Outcome::Error => "error",
        }
    }

    /// Status recorded on a step node. Steps keep pending as-is so the
    /// example fold can tell pending apart from failed.
    pub fn step_status(&self) -> Status {
        match self {
            Outcome::Passed => Status::Passed,
            Outcome::Failed => Status::Failed,
            Outcome::Skipped => Status::Skipped,
            Outcome::Pending => Status::Pending,
            Outcome::Undefined | Outcome::Error => Status::Other,
        }
    }

    /// Status recorded on a scenario node. Undefined and pending scenarios
    /// count as failed.
    pub fn scenario_status(&self) -> Status {
        match self {
            Outcome::Passed => Status::Passed,
            Outcome::Failed | Outcome::Pending | Outcome::Undefined => Status::Failed,
            Outcome::Skipped => Status::Skipped,
            Outcome::Error => Status::Other,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a tree node
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Unset,
    Passed,
    Failed,
    Skipped,
    Pending,
    Other,
}

impl Status {
    /// Statuses that appear in execution summaries, in display order
    pub const COUNTED: [Status; 5] = [
        Status::Passed,
        Status::Failed,
        Status::Skipped,
        Status::Pending,
        Status::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Unset => "unset",
            Status::Passed => "passed",
            Status::Failed => "failed",
            Status::Skipped => "skipped",
            Status::Pending => "pending",
            Status::Other => "other",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Status::Unset => " ",
            Status::Passed => "✓",
            Status::Failed => "✗",
            Status::Skipped => "○",
            Status::Pending => "…",
            Status::Other => "!",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Status::Passed)
    }

    pub fn is_set(&self) -> bool {
        !matches!(self, Status::Unset)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_str() {
        assert_eq!(Outcome::from_str("PASSED"), Some(Outcome::Passed));
        assert_eq!(Outcome::from_str("undefined"), Some(Outcome::Undefined));
        assert_eq!(Outcome::from_str("flaky"), None);
    }

    #[test]
    fn test_scenario_status_remaps_pending_and_undefined() {
        assert_eq!(Outcome::Pending.scenario_status(), Status::Failed);
        assert_eq!(Outcome::Undefined.scenario_status(), Status::Failed);
        assert_eq!(Outcome::Skipped.scenario_status(), Status::Skipped);
    }

    #[test]
    fn test_step_status_keeps_pending() {
        assert_eq!(Outcome::Pending.step_status(), Status::Pending);
        assert_eq!(Outcome::Undefined.step_status(), Status::Other);
        assert_eq!(Outcome::Error.step_status(), Status::Other);
    }

    #[test]
    fn test_status_serde_names() {
        let json = serde_json::to_string(&Status::Pending).unwrap();
        assert_eq!(json, "\"pending\"");
        let status: Status = serde_json::from_str("\"other\"").unwrap();
        assert_eq!(status, Status::Other);
        assert_eq!(Status::default(), Status::Unset);
    }
}
