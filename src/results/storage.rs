//! Run records and their export
//!
//! A run record is the aggregated view of a finished (or in-progress) run
//! that gets printed, exported or handed to the CI job.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;
use tracing::info;

use super::aggregate::{aggregate, Aggregation};
use crate::models::HierarchyTree;

/// Aggregated results of one run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,

    /// Link to the run in the remote service, when reporting remotely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,

    pub generated_at: DateTime<Utc>,

    /// Workers that had finished when the record was taken
    #[serde(default)]
    pub finished_workers: usize,

    #[serde(flatten)]
    pub aggregation: Aggregation,
}

impl RunRecord {
    pub fn new(run_id: impl Into<String>, tree: &HierarchyTree) -> Self {
        Self {
            run_id: run_id.into(),
            link: None,
            generated_at: Utc::now(),
            finished_workers: 0,
            aggregation: aggregate(tree),
        }
    }

    pub fn with_link(mut self, link: Option<String>) -> Self {
        self.link = link;
        self
    }

    pub fn with_finished_workers(mut self, finished: usize) -> Self {
        self.finished_workers = finished;
        self
    }

    /// Load a record previously exported as JSON
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).context("Failed to parse run record")
    }

    /// Export the record to a file
    pub fn export(&self, path: &Path, format: ExportFormat) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        match format {
            ExportFormat::Json => {
                let file = File::create(path).context("Failed to create export file")?;
                let writer = BufWriter::new(file);
                serde_json::to_writer_pretty(writer, self).context("Failed to write run record")?;
            }
            ExportFormat::Csv => {
                let mut writer = csv::Writer::from_path(path)?;

                writer.write_record(["status", "kind", "scenario", "name", "values", "steps", "detail"])?;

                for (status, entries) in self.aggregation.by_status() {
                    for entry in entries {
                        writer.write_record([
                            status.as_str().to_string(),
                            entry.kind.name().to_string(),
                            entry.scenario.clone().unwrap_or_default(),
                            entry.label.clone(),
                            entry.values.join(" | "),
                            entry.steps.len().to_string(),
                            entry.failure_detail().unwrap_or_default().to_string(),
                        ])?;
                    }
                }
                writer.flush()?;
            }
        }

        info!("Exported results to {}", path.display());
        Ok(())
    }
}

/// Write the remote run metadata where the CI job expects it
pub fn write_launch_info(path: &Path, info: &serde_json::Value) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string(info).context("Failed to serialize launch info")?;
    fs::write(path, content)
        .with_context(|| format!("Failed to write launch info to {}", path.display()))?;
    info!("Wrote launch info to {}", path.display());
    Ok(())
}

/// Export format
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(ExportFormat::Json),
            "csv" => Some(ExportFormat::Csv),
            _ => None,
        }
    }

    pub fn from_extension(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Node, NodeId, NodeKind, Status};
    use tempfile::tempdir;

    fn tree() -> HierarchyTree {
        let mut tree = HierarchyTree::new();
        let mut case = Node::new("case".into(), NodeKind::TestCase, "Scenario: Pay");
        case.status = Status::Failed;
        tree.add_child(&NodeId::root(), case).unwrap();
        let mut step = Node::new("step".into(), NodeKind::TestStep, "Given a card");
        step.status = Status::Failed;
        step.detail = Some("card declined, retry".to_string());
        tree.add_child(&"case".into(), step).unwrap();
        tree
    }

    #[test]
    fn test_export_format() {
        assert_eq!(ExportFormat::from_str("JSON"), Some(ExportFormat::Json));
        assert_eq!(
            ExportFormat::from_extension(Path::new("out/report.csv")),
            Some(ExportFormat::Csv)
        );
        assert!(ExportFormat::from_str("xml").is_none());
    }

    #[test]
    fn test_json_export_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("record.json");
        let record = RunRecord::new("9999", &tree()).with_finished_workers(2);

        record.export(&path, ExportFormat::Json).unwrap();
        let loaded = RunRecord::load(&path).unwrap();
        assert_eq!(loaded.run_id, "9999");
        assert_eq!(loaded.finished_workers, 2);
        assert_eq!(loaded.aggregation, record.aggregation);
    }

    #[test]
    fn test_csv_export_quotes_details() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("record.csv");

        RunRecord::new("9999", &tree())
            .export(&path, ExportFormat::Csv)
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines[0], "status,kind,scenario,name,values,steps,detail");
        assert_eq!(
            lines[1],
            "failed,TestCase,,Scenario: Pay,,1,\"card declined, retry\""
        );
    }

    #[test]
    fn test_write_launch_info() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("launch.json");
        let info = serde_json::json!({"id": 7, "uri": "http://rp/ui/#demo/launches/all/7/"});

        write_launch_info(&path, &info).unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, info);
    }
}
