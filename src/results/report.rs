//! Report generation for run records
//!
//! Generate formatted reports in various output formats.

use anyhow::{Context, Result};
use std::fmt::Write;
use std::path::Path;

use chrono::{DateTime, Utc};

use super::storage::{ExportFormat, RunRecord};
use crate::models::Status;

/// Report generator
pub struct ReportGenerator<'a> {
    record: &'a RunRecord,
}

impl<'a> ReportGenerator<'a> {
    pub fn new(record: &'a RunRecord) -> Self {
        Self { record }
    }

    /// Render the report as a string
    pub fn render(&self, format: ReportFormat) -> Result<String> {
        match format {
            ReportFormat::Text => Ok(self.format_text_report()),
            ReportFormat::Markdown => Ok(self.format_markdown_report()),
            ReportFormat::Json => {
                serde_json::to_string_pretty(self.record).context("Failed to serialize report")
            }
            ReportFormat::Csv => anyhow::bail!("CSV reports can only be written to a file"),
        }
    }

    /// Write the report to `path`
    pub fn write(&self, path: &Path, format: ReportFormat) -> Result<()> {
        match format {
            ReportFormat::Csv => self.record.export(path, ExportFormat::Csv),
            ReportFormat::Json => self.record.export(path, ExportFormat::Json),
            ReportFormat::Text | ReportFormat::Markdown => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, self.render(format)?)
                    .with_context(|| format!("Failed to write report to {}", path.display()))
            }
        }
    }

    fn format_text_report(&self) -> String {
        let record = self.record;
        let counts = &record.aggregation.counts;
        let mut output = String::new();

        writeln!(output, "\n{:=^70}", " Test Run Report ").unwrap();
        writeln!(output).unwrap();
        writeln!(output, "Run ID: {}", record.run_id).unwrap();
        if let Some(link) = &record.link {
            writeln!(output, "Link: {link}").unwrap();
        }
        writeln!(output, "Generated: {}", format_datetime(&record.generated_at)).unwrap();
        writeln!(output, "Workers finished: {}", record.finished_workers).unwrap();
        writeln!(output).unwrap();

        writeln!(output, "{:-^70}", " Summary ").unwrap();
        for status in Status::COUNTED {
            writeln!(output, "{:<10} {:>6}", status.as_str(), counts.get(status)).unwrap();
        }
        writeln!(output, "{:<10} {:>6}", "total", counts.total()).unwrap();
        writeln!(output, "Pass Rate: {:.1}%", counts.pass_rate()).unwrap();

        for (status, entries) in record.aggregation.by_status() {
            writeln!(
                output,
                "\n{:-^70}",
                format!(" {} ({}) ", status.as_str().to_uppercase(), entries.len())
            )
            .unwrap();
            for entry in entries {
                writeln!(
                    output,
                    "{} {}",
                    status.symbol(),
                    truncate(&entry.display_label(), 66)
                )
                .unwrap();
                if !status.is_success() {
                    if let Some(detail) = entry.failure_detail() {
                        for line in detail.lines().take(5) {
                            writeln!(output, "    {line}").unwrap();
                        }
                    }
                }
            }
        }

        writeln!(output, "\n{:=^70}", "").unwrap();
        output
    }

    fn format_markdown_report(&self) -> String {
        let record = self.record;
        let counts = &record.aggregation.counts;
        let mut output = String::new();

        writeln!(output, "# Test Run Report\n").unwrap();
        writeln!(output, "## Summary\n").unwrap();
        writeln!(output, "| Property | Value |").unwrap();
        writeln!(output, "|----------|-------|").unwrap();
        writeln!(output, "| Run ID | `{}` |", record.run_id).unwrap();
        if let Some(link) = &record.link {
            writeln!(output, "| Link | <{link}> |").unwrap();
        }
        writeln!(
            output,
            "| Generated | {} |",
            format_datetime(&record.generated_at)
        )
        .unwrap();
        writeln!(output, "| Workers finished | {} |", record.finished_workers).unwrap();
        writeln!(output, "| Pass Rate | {:.1}% |", counts.pass_rate()).unwrap();

        writeln!(output, "\n## Statistics\n").unwrap();
        writeln!(output, "| Status | Count |").unwrap();
        writeln!(output, "|--------|-------|").unwrap();
        for status in Status::COUNTED {
            writeln!(output, "| {} | {} |", status.as_str(), counts.get(status)).unwrap();
        }
        writeln!(output, "| **total** | **{}** |", counts.total()).unwrap();

        for (status, entries) in record.aggregation.by_status() {
            writeln!(output, "\n## {} ({})\n", capitalize(status.as_str()), entries.len()).unwrap();
            for entry in entries {
                writeln!(output, "- {}", escape_markdown(&entry.display_label())).unwrap();
                if !status.is_success() {
                    if let Some(detail) = entry.failure_detail() {
                        writeln!(output, "\n  ```\n  {}\n  ```", detail.replace('\n', "\n  "))
                            .unwrap();
                    }
                }
            }
        }

        output
    }
}

/// Report output format
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportFormat {
    Text,
    Markdown,
    Csv,
    Json,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "markdown" | "md" => Some(ReportFormat::Markdown),
            "csv" => Some(ReportFormat::Csv),
            "json" => Some(ReportFormat::Json),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Text => "txt",
            ReportFormat::Markdown => "md",
            ReportFormat::Csv => "csv",
            ReportFormat::Json => "json",
        }
    }
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn escape_markdown(s: &str) -> String {
    s.replace('|', "\\|")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HierarchyTree, Node, NodeId, NodeKind};
    use tempfile::tempdir;

    fn record() -> RunRecord {
        let mut tree = HierarchyTree::new();
        let mut ok = Node::new("ok".into(), NodeKind::TestCase, "Scenario: Login");
        ok.status = Status::Passed;
        tree.add_child(&NodeId::root(), ok).unwrap();
        let mut bad = Node::new("bad".into(), NodeKind::TestCase, "Scenario: Logout");
        bad.status = Status::Failed;
        bad.detail = Some("session still active".to_string());
        tree.add_child(&NodeId::root(), bad).unwrap();

        RunRecord::new("9999", &tree).with_link(Some("http://rp/ui/#demo/launches/all/7/".into()))
    }

    #[test]
    fn test_report_format() {
        assert_eq!(ReportFormat::from_str("text"), Some(ReportFormat::Text));
        assert_eq!(ReportFormat::from_str("md"), Some(ReportFormat::Markdown));
        assert_eq!(ReportFormat::from_str("CSV"), Some(ReportFormat::Csv));
        assert!(ReportFormat::from_str("html").is_none());
        assert_eq!(ReportFormat::Markdown.extension(), "md");
    }

    #[test]
    fn test_text_report() {
        let record = record();
        let text = ReportGenerator::new(&record).render(ReportFormat::Text).unwrap();
        assert!(text.contains("Run ID: 9999"));
        assert!(text.contains("Pass Rate: 50.0%"));
        assert!(text.contains("FAILED (1)"));
        assert!(text.contains("    session still active"));
    }

    #[test]
    fn test_markdown_report() {
        let record = record();
        let markdown = ReportGenerator::new(&record)
            .render(ReportFormat::Markdown)
            .unwrap();
        assert!(markdown.starts_with("# Test Run Report"));
        assert!(markdown.contains("| failed | 1 |"));
        assert!(markdown.contains("## Passed (1)"));
        assert!(markdown.contains("| Link | <http://rp/ui/#demo/launches/all/7/> |"));
    }

    #[test]
    fn test_write_csv_report() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.csv");
        ReportGenerator::new(&record())
            .write(&path, ReportFormat::Csv)
            .unwrap();
        assert!(std::fs::read_to_string(path).unwrap().starts_with("status,"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
    }
}
