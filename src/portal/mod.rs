//! Remote reporting service
//!
//! The core only talks to the remote service through [`ReportingService`].
//! Every call degrades to an absent value on failure so a flaky service
//! never stops a test run.

mod client;
#[cfg(test)]
pub mod recording;

pub use client::PortalClient;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::models::{Outcome, Status};

/// Kind of an entry in the remote hierarchy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryKind {
    Suite,
    Test,
    Step,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Suite => "SUITE",
            EntryKind::Test => "TEST",
            EntryKind::Step => "STEP",
        }
    }
}

/// Log record severity
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    #[serde(alias = "trace")]
    Trace,
    #[serde(alias = "debug")]
    Debug,
    #[serde(alias = "info")]
    Info,
    #[serde(alias = "warn")]
    Warn,
    #[serde(alias = "error")]
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }
}

impl From<Outcome> for Severity {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Passed => Severity::Info,
            Outcome::Failed | Outcome::Undefined | Outcome::Pending | Outcome::Error => {
                Severity::Error
            }
            Outcome::Skipped => Severity::Warn,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Launch mode requested from the service
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LaunchMode {
    #[default]
    Default,
    Debug,
}

/// Key/value attribute attached to a run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub value: String,
}

/// Metadata for starting a run
#[derive(Clone, Debug, PartialEq)]
pub struct RunRequest {
    pub name: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub tags: Vec<String>,
    pub attributes: Vec<Attribute>,
    pub mode: LaunchMode,
}

/// A new entry in the remote hierarchy
#[derive(Clone, Debug, PartialEq)]
pub struct EntryRequest {
    pub name: String,
    pub kind: EntryKind,
    /// Remote id of the parent entry; `None` for top-level entries
    pub parent: Option<String>,
    pub tags: Vec<String>,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
}

fn default_attachment_severity() -> Severity {
    Severity::Info
}

fn default_mime_type() -> String {
    "image/png".to_string()
}

/// A file attached to a log record, such as a screenshot
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub path: PathBuf,
    /// Defaults to the file name
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default = "default_attachment_severity")]
    pub level: Severity,
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
}

impl Attachment {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            label: None,
            level: default_attachment_severity(),
            mime_type: default_mime_type(),
        }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    pub fn label(&self) -> String {
        self.label.clone().unwrap_or_else(|| self.file_name())
    }
}

/// Operations the core needs from the remote reporting service
pub trait ReportingService {
    /// Start a run, returning its id
    fn start_run(&self, request: &RunRequest) -> Option<String>;

    fn finish_run(&self, run_id: &str, end_time: DateTime<Utc>) -> bool;

    /// Create an entry under `entry.parent`, returning the entry id
    fn create_hierarchy_entry(&self, run_id: &str, entry: &EntryRequest) -> Option<String>;

    fn finish_entry(&self, entry_id: &str, status: Status, end_time: DateTime<Utc>) -> bool;

    fn post_log(&self, entry_id: &str, message: &str, severity: Severity, time: DateTime<Utc>)
        -> bool;

    /// Upload `attachment` as a log record of `entry_id`
    fn attach_file(&self, entry_id: &str, attachment: &Attachment, time: DateTime<Utc>) -> bool;

    /// Run metadata; implementations add a browsable `uri` when they can
    fn fetch_run_info(&self, run_id: &str) -> Option<serde_json::Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_from_outcome() {
        assert_eq!(Severity::from(Outcome::Passed), Severity::Info);
        assert_eq!(Severity::from(Outcome::Pending), Severity::Error);
        assert_eq!(Severity::from(Outcome::Undefined), Severity::Error);
        assert_eq!(Severity::from(Outcome::Skipped), Severity::Warn);
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(serde_json::to_string(&EntryKind::Suite).unwrap(), "\"SUITE\"");
        assert_eq!(serde_json::to_string(&LaunchMode::Debug).unwrap(), "\"DEBUG\"");
        assert_eq!(Severity::Trace.to_string(), "TRACE");
        assert_eq!(serde_json::from_str::<Severity>("\"warn\"").unwrap(), Severity::Warn);
    }

    #[test]
    fn test_attachment_defaults() {
        let attachment: Attachment =
            serde_json::from_str(r#"{"path": "/tmp/shots/failure.png"}"#).unwrap();
        assert_eq!(attachment, Attachment::new("/tmp/shots/failure.png"));
        assert_eq!(attachment.label(), "failure.png");
        assert_eq!(attachment.mime_type, "image/png");

        let labelled = Attachment {
            label: Some("Checkout page".to_string()),
            ..attachment
        };
        assert_eq!(labelled.label(), "Checkout page");
        assert_eq!(labelled.file_name(), "failure.png");
    }
}
