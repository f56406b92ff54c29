//! ReportPortal-style HTTP implementation of [`ReportingService`]

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use reqwest::multipart::{Form, Part};
use std::future::Future;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use super::{Attachment, Attribute, EntryKind, EntryRequest, LaunchMode, ReportingService, RunRequest, Severity};
use crate::http::{HttpClient, HttpResponse};
use crate::models::Status;

#[derive(Serialize)]
struct LaunchStart<'a> {
    name: &'a str,
    start_time: i64,
    tags: &'a [String],
    description: Option<&'a str>,
    mode: LaunchMode,
    attributes: &'a [Attribute],
}

#[derive(Serialize)]
struct ItemStart<'a> {
    start_time: i64,
    name: &'a str,
    #[serde(rename = "type")]
    kind: EntryKind,
    launch_id: &'a str,
    tags: &'a [String],
    description: Option<&'a str>,
    attributes: &'a [String],
}

#[derive(Serialize)]
struct Finish {
    end_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<&'static str>,
}

#[derive(Serialize)]
struct LogRecord<'a> {
    item_id: &'a str,
    message: &'a str,
    level: Severity,
    time: i64,
}

#[derive(Serialize)]
struct AttachedFile {
    name: String,
}

#[derive(Serialize)]
struct AttachmentRecord<'a> {
    item_id: &'a str,
    message: String,
    level: Severity,
    time: i64,
    file: AttachedFile,
}

/// Multipart body of an attachment upload: a one-element JSON array
/// describing the log record, then the file itself under the same name.
fn attachment_form(entry_id: &str, attachment: &Attachment, time: DateTime<Utc>) -> Result<Form> {
    let content = std::fs::read(&attachment.path)
        .with_context(|| format!("Failed to read {}", attachment.path.display()))?;

    let record = AttachmentRecord {
        item_id: entry_id,
        message: attachment.label(),
        level: attachment.level,
        time: time.timestamp_millis(),
        file: AttachedFile {
            name: attachment.file_name(),
        },
    };
    let json = serde_json::to_string(&[record]).context("Failed to serialize log record")?;

    let json_part = Part::text(json).mime_str("application/json")?;
    let file_part = Part::bytes(content)
        .file_name(attachment.file_name())
        .mime_str(&attachment.mime_type)
        .with_context(|| format!("Invalid mime type: {}", attachment.mime_type))?;

    Ok(Form::new()
        .part("json_request_part", json_part)
        .part("file", file_part))
}

#[derive(Deserialize)]
struct Created {
    id: String,
}

/// Remote status for a finished entry
fn wire_status(status: Status) -> Option<&'static str> {
    match status {
        Status::Unset => None,
        Status::Passed => Some("passed"),
        Status::Failed => Some("failed"),
        Status::Skipped | Status::Pending => Some("skipped"),
        Status::Other => Some("interrupted"),
    }
}

/// Browsable link to a run in the service's web UI
pub fn run_link(endpoint: &str, project: &str, run_id: &str) -> String {
    format!(
        "{}/#{}/launches/all/{}/",
        endpoint.replace("api/v1", "ui").trim_end_matches('/'),
        project,
        run_id
    )
}

/// Blocking client for the remote reporting service.
///
/// The rest of the crate is synchronous, so the client owns a
/// single-threaded runtime and drives each request to completion.
pub struct PortalClient {
    http: HttpClient,
    runtime: Runtime,
    endpoint: String,
    project: String,
}

impl PortalClient {
    pub fn new(endpoint: &str, project: &str, token: &str, timeout_secs: u64) -> Result<Self> {
        let http = HttpClient::with_timeout(timeout_secs)?
            .base_url(format!("{}/{}", endpoint.trim_end_matches('/'), project))
            .bearer_auth(token)?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to create runtime for the reporting client")?;

        Ok(Self {
            http,
            runtime,
            endpoint: endpoint.to_string(),
            project: project.to_string(),
        })
    }

    /// Drive one request; non-success responses and transport errors are
    /// logged and yield `None`.
    fn execute<F>(&self, action: &str, request: F) -> Option<HttpResponse>
    where
        F: Future<Output = Result<HttpResponse>>,
    {
        match self.runtime.block_on(request) {
            Ok(response) => match response.error_for_status() {
                Ok(response) => {
                    debug!("HTTP {} | {}", response.status_code, action);
                    Some(response)
                }
                Err(e) => {
                    warn!("{} failed: {}", action, e);
                    None
                }
            },
            Err(e) => {
                warn!("{} failed: {:#}", action, e);
                None
            }
        }
    }

    fn created_id(&self, action: &str, response: HttpResponse) -> Option<String> {
        match response.json::<Created>() {
            Ok(created) => Some(created.id),
            Err(e) => {
                warn!("{} returned no id: {:#}", action, e);
                None
            }
        }
    }
}

impl ReportingService for PortalClient {
    fn start_run(&self, request: &RunRequest) -> Option<String> {
        let body = LaunchStart {
            name: &request.name,
            start_time: request.start_time.timestamp_millis(),
            tags: &request.tags,
            description: request.description.as_deref(),
            mode: request.mode,
            attributes: &request.attributes,
        };
        let response = self.execute("Start launch", self.http.post_json("launch", &body))?;
        let id = self.created_id("Start launch", response)?;
        info!("Launch started: {}", id);
        Some(id)
    }

    fn finish_run(&self, run_id: &str, end_time: DateTime<Utc>) -> bool {
        let body = Finish {
            end_time: end_time.timestamp_millis(),
            status: None,
        };
        let path = format!("launch/{run_id}/finish");
        let finished = self
            .execute("Finish launch", self.http.put_json(&path, &body))
            .is_some();
        if finished {
            info!("Launch finished: {}", run_id);
        }
        finished
    }

    fn create_hierarchy_entry(&self, run_id: &str, entry: &EntryRequest) -> Option<String> {
        let body = ItemStart {
            start_time: entry.start_time.timestamp_millis(),
            name: &entry.name,
            kind: entry.kind,
            launch_id: run_id,
            tags: &entry.tags,
            description: entry.description.as_deref(),
            attributes: &entry.tags,
        };
        let path = match &entry.parent {
            Some(parent) => format!("item/{parent}"),
            None => "item".to_string(),
        };
        let action = format!("Start {} item '{}'", entry.kind.as_str(), entry.name);
        let response = self.execute(&action, self.http.post_json(&path, &body))?;
        self.created_id(&action, response)
    }

    fn finish_entry(&self, entry_id: &str, status: Status, end_time: DateTime<Utc>) -> bool {
        let body = Finish {
            end_time: end_time.timestamp_millis(),
            status: wire_status(status),
        };
        let path = format!("item/{entry_id}");
        self.execute("Finish item", self.http.put_json(&path, &body))
            .is_some()
    }

    fn post_log(
        &self,
        entry_id: &str,
        message: &str,
        severity: Severity,
        time: DateTime<Utc>,
    ) -> bool {
        let body = LogRecord {
            item_id: entry_id,
            message,
            level: severity,
            time: time.timestamp_millis(),
        };
        self.execute("Post log", self.http.post_json("log", &body))
            .is_some()
    }

    fn attach_file(&self, entry_id: &str, attachment: &Attachment, time: DateTime<Utc>) -> bool {
        let form = match attachment_form(entry_id, attachment, time) {
            Ok(form) => form,
            Err(e) => {
                warn!("Attach file failed: {:#}", e);
                return false;
            }
        };

        let attached = self
            .execute("Attach file", self.http.post_multipart("log", form))
            .is_some();
        if attached {
            info!("File {} attached to {}", attachment.file_name(), entry_id);
        }
        attached
    }

    fn fetch_run_info(&self, run_id: &str) -> Option<serde_json::Value> {
        let path = format!("launch/uuid/{run_id}");
        let response = self.execute("Fetch launch info", self.http.get(&path))?;
        let mut info: serde_json::Value = match response.json() {
            Ok(info) => info,
            Err(e) => {
                warn!("Fetch launch info: {:#}", e);
                return None;
            }
        };

        let numeric_id = match info.get("id") {
            Some(serde_json::Value::String(id)) => Some(id.clone()),
            Some(serde_json::Value::Number(id)) => Some(id.to_string()),
            _ => None,
        };
        if let (Some(id), Some(object)) = (numeric_id, info.as_object_mut()) {
            object.insert(
                "uri".to_string(),
                serde_json::Value::String(run_link(&self.endpoint, &self.project, &id)),
            );
        }
        Some(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_run_link() {
        assert_eq!(
            run_link("https://rp.example.com/api/v1", "demo", "42"),
            "https://rp.example.com/ui/#demo/launches/all/42/"
        );
    }

    #[test]
    fn test_wire_status() {
        assert_eq!(wire_status(Status::Unset), None);
        assert_eq!(wire_status(Status::Failed), Some("failed"));
        assert_eq!(wire_status(Status::Pending), Some("skipped"));
    }

    #[test]
    fn test_item_body_shape() {
        let tags = vec!["@smoke".to_string()];
        let body = ItemStart {
            start_time: Utc.timestamp_millis_opt(1_700_000_000_000).unwrap().timestamp_millis(),
            name: "Folder: features",
            kind: EntryKind::Suite,
            launch_id: "launch-1",
            tags: &tags,
            description: None,
            attributes: &tags,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "start_time": 1_700_000_000_000i64,
                "name": "Folder: features",
                "type": "SUITE",
                "launch_id": "launch-1",
                "tags": ["@smoke"],
                "description": null,
                "attributes": ["@smoke"]
            })
        );
    }

    #[test]
    fn test_finish_body_omits_unset_status() {
        let body = Finish {
            end_time: 5,
            status: wire_status(Status::Unset),
        };
        assert_eq!(serde_json::to_value(&body).unwrap(), json!({"end_time": 5}));
    }

    #[test]
    fn test_attachment_record_shape() {
        let attachment = Attachment::new("/tmp/shots/failure.png");
        let record = AttachmentRecord {
            item_id: "entry-3",
            message: attachment.label(),
            level: Severity::Error,
            time: 5,
            file: AttachedFile {
                name: attachment.file_name(),
            },
        };
        assert_eq!(
            serde_json::to_value([record]).unwrap(),
            json!([{
                "item_id": "entry-3",
                "message": "failure.png",
                "level": "ERROR",
                "time": 5,
                "file": {"name": "failure.png"}
            }])
        );
    }

    #[test]
    fn test_attachment_form_requires_readable_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = Attachment::new(dir.path().join("missing.png"));
        assert!(attachment_form("entry-1", &missing, Utc::now()).is_err());

        let path = dir.path().join("page.html");
        std::fs::write(&path, "<html></html>").unwrap();
        let html = Attachment {
            mime_type: "text/html".to_string(),
            ..Attachment::new(&path)
        };
        assert!(attachment_form("entry-1", &html, Utc::now()).is_ok());
    }

    #[test]
    fn test_unreachable_service_degrades() {
        let client = PortalClient::new("http://127.0.0.1:9/api/v1", "demo", "token", 1).unwrap();
        assert!(client.fetch_run_info("missing").is_none());
        assert!(!client.finish_run("missing", Utc::now()));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("failure.png");
        std::fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();
        assert!(!client.attach_file("entry-1", &Attachment::new(&path), Utc::now()));
        assert!(!client.attach_file("entry-1", &Attachment::new(dir.path().join("gone.png")), Utc::now()));
    }
}
