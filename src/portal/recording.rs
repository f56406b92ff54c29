//! In-memory [`ReportingService`] that records every call

use chrono::{DateTime, Utc};
use std::sync::Mutex;

use super::{Attachment, EntryKind, EntryRequest, ReportingService, RunRequest, Severity};
use crate::models::Status;

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    StartRun(String),
    FinishRun(String),
    CreateEntry {
        id: String,
        name: String,
        kind: EntryKind,
        parent: Option<String>,
    },
    FinishEntry(String, Status),
    Log(String, String, Severity),
    Attach {
        entry: String,
        label: String,
        level: Severity,
        mime_type: String,
    },
    FetchRunInfo(String),
}

/// Test double; `fail` makes every call behave like an unreachable service
#[derive(Debug, Default)]
pub struct RecordingService {
    pub fail: bool,
    calls: Mutex<Vec<Call>>,
}

impl RecordingService {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) -> usize {
        let mut calls = self.calls.lock().unwrap();
        calls.push(call);
        calls.len()
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| predicate(c)).count()
    }
}

impl ReportingService for RecordingService {
    fn start_run(&self, request: &RunRequest) -> Option<String> {
        self.record(Call::StartRun(request.name.clone()));
        (!self.fail).then(|| "launch-1".to_string())
    }

    fn finish_run(&self, run_id: &str, _end_time: DateTime<Utc>) -> bool {
        self.record(Call::FinishRun(run_id.to_string()));
        !self.fail
    }

    fn create_hierarchy_entry(&self, _run_id: &str, entry: &EntryRequest) -> Option<String> {
        let seq = self.calls.lock().unwrap().len() + 1;
        let id = format!("entry-{seq}");
        self.record(Call::CreateEntry {
            id: id.clone(),
            name: entry.name.clone(),
            kind: entry.kind,
            parent: entry.parent.clone(),
        });
        (!self.fail).then_some(id)
    }

    fn finish_entry(&self, entry_id: &str, status: Status, _end_time: DateTime<Utc>) -> bool {
        self.record(Call::FinishEntry(entry_id.to_string(), status));
        !self.fail
    }

    fn post_log(
        &self,
        entry_id: &str,
        message: &str,
        severity: Severity,
        _time: DateTime<Utc>,
    ) -> bool {
        self.record(Call::Log(entry_id.to_string(), message.to_string(), severity));
        !self.fail
    }

    fn attach_file(&self, entry_id: &str, attachment: &Attachment, _time: DateTime<Utc>) -> bool {
        self.record(Call::Attach {
            entry: entry_id.to_string(),
            label: attachment.label(),
            level: attachment.level,
            mime_type: attachment.mime_type.clone(),
        });
        !self.fail
    }

    fn fetch_run_info(&self, run_id: &str) -> Option<serde_json::Value> {
        self.record(Call::FetchRunInfo(run_id.to_string()));
        (!self.fail).then(|| serde_json::json!({"id": 7, "uuid": run_id, "uri": "http://rp/ui/#demo/launches/all/7/"}))
    }
}
