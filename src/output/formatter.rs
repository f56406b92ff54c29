//! Output formatters for run summaries
//!
//! Provides table, JSON, CSV and one-line summary output.

use serde::Serialize;

use crate::models::Status;
use crate::results::{RunRecord, StatusCounts};

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    JsonPretty,
    Csv,
    Summary,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "csv" => Some(OutputFormat::Csv),
            "summary" => Some(OutputFormat::Summary),
            _ => None,
        }
    }
}

/// Run record formatter
pub struct ResultFormatter {
    format: OutputFormat,
    colorize: bool,
    detailed: bool,
}

impl ResultFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
            detailed: false,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    /// Include the per-status listing of scenarios
    pub fn detailed(mut self, detailed: bool) -> Self {
        self.detailed = detailed;
        self
    }

    pub fn format_record(&self, record: &RunRecord) -> String {
        match self.format {
            OutputFormat::Table => self.format_table(record),
            OutputFormat::Json => self.to_json(record, false),
            OutputFormat::JsonPretty => self.to_json(record, true),
            OutputFormat::Csv => self.format_csv(record),
            OutputFormat::Summary => format_brief(&record.aggregation.counts),
        }
    }

    fn to_json(&self, record: &RunRecord, pretty: bool) -> String {
        #[derive(Serialize)]
        struct CountsJson<'a> {
            run_id: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            link: Option<&'a str>,
            total: usize,
            #[serde(flatten)]
            counts: &'a StatusCounts,
        }

        let result = if self.detailed {
            if pretty {
                serde_json::to_string_pretty(record)
            } else {
                serde_json::to_string(record)
            }
        } else {
            let json = CountsJson {
                run_id: &record.run_id,
                link: record.link.as_deref(),
                total: record.aggregation.counts.total(),
                counts: &record.aggregation.counts,
            };
            if pretty {
                serde_json::to_string_pretty(&json)
            } else {
                serde_json::to_string(&json)
            }
        };
        result.unwrap_or_default()
    }

    fn paint(&self, status: Status, text: &str) -> String {
        if !self.colorize {
            return text.to_string();
        }
        let code = match status {
            Status::Passed => "32",
            Status::Failed | Status::Other => "31",
            Status::Skipped | Status::Pending => "33",
            Status::Unset => return text.to_string(),
        };
        format!("\x1b[{code}m{text}\x1b[0m")
    }

    fn format_table(&self, record: &RunRecord) -> String {
        let counts = &record.aggregation.counts;
        let mut output = String::new();

        if let Some(link) = &record.link {
            output.push_str("\n----------------------------------------\n");
            output.push_str("Execution completed, find the report at: \n");
            output.push_str(&format!("\n{link}\n"));
            output.push_str("\n----------------------------------------\n");
        }

        output.push_str("\n╔══════════════════════════════════════════════════════════════╗\n");
        output.push_str(&format!("║  Run {:<56} ║\n", truncate(&record.run_id, 56)));
        output.push_str("╠══════════════════════════════════════════════════════════════╣\n");

        for status in Status::COUNTED {
            let label = format!("{} {:<8}", status.symbol(), status.as_str());
            output.push_str(&format!(
                "║  {} {:>6}{:45}║\n",
                self.paint(status, &label),
                counts.get(status),
                ""
            ));
        }

        output.push_str("╠══════════════════════════════════════════════════════════════╣\n");
        output.push_str(&format!(
            "║  Total: {:5} | Pass Rate: {:5.1}%{:27}║\n",
            counts.total(),
            counts.pass_rate(),
            ""
        ));
        output.push_str("╚══════════════════════════════════════════════════════════════╝\n");

        if self.detailed {
            for (status, entries) in record.aggregation.by_status() {
                output.push_str(&format!(
                    "\n {} ({}):\n",
                    self.paint(status, &status.as_str().to_uppercase()),
                    entries.len()
                ));
                for entry in entries {
                    output.push_str(&format!("   {} {}\n", status.symbol(), entry.display_label()));
                    if !status.is_success() {
                        if let Some(detail) = entry.failure_detail() {
                            if let Some(first) = detail.lines().next() {
                                output.push_str(&format!("       {first}\n"));
                            }
                        }
                    }
                }
            }
        }

        output
    }

    fn format_csv(&self, record: &RunRecord) -> String {
        let mut output = String::new();
        if self.detailed {
            output.push_str("status,name\n");
            for (status, entries) in record.aggregation.by_status() {
                for entry in entries {
                    output.push_str(&format!(
                        "{},\"{}\"\n",
                        status,
                        entry.display_label().replace('"', "\"\"")
                    ));
                }
            }
        } else {
            output.push_str("status,count\n");
            for status in Status::COUNTED {
                output.push_str(&format!(
                    "{},{}\n",
                    status,
                    record.aggregation.counts.get(status)
                ));
            }
        }
        output
    }
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Table)
    }
}

/// One-line summary, e.g. `4 scenarios (2 passed, 1 failed, 1 pending)`
fn format_brief(counts: &StatusCounts) -> String {
    let total = counts.total();
    let noun = if total == 1 { "scenario" } else { "scenarios" };
    let parts: Vec<String> = Status::COUNTED
        .iter()
        .filter(|status| counts.get(**status) > 0)
        .map(|status| format!("{} {}", counts.get(*status), status))
        .collect();

    if parts.is_empty() {
        format!("{total} {noun}")
    } else {
        format!("{total} {noun} ({})", parts.join(", "))
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HierarchyTree, Node, NodeId, NodeKind};

    fn record() -> RunRecord {
        let mut tree = HierarchyTree::new();
        for (id, status) in [("a", Status::Passed), ("b", Status::Passed), ("c", Status::Failed)] {
            let mut node = Node::new(id.into(), NodeKind::TestCase, format!("Scenario: {id}"));
            node.status = status;
            tree.add_child(&NodeId::root(), node).unwrap();
        }
        RunRecord::new("9999", &tree)
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!(OutputFormat::from_str("json"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::from_str("TABLE"), Some(OutputFormat::Table));
        assert_eq!(OutputFormat::from_str("unknown"), None);
    }

    #[test]
    fn test_formatter_creation() {
        let formatter = ResultFormatter::new(OutputFormat::Json).no_color();
        assert_eq!(formatter.format, OutputFormat::Json);
        assert!(!formatter.colorize);
        assert!(!formatter.detailed);
    }

    #[test]
    fn test_brief_summary() {
        let output = ResultFormatter::new(OutputFormat::Summary).format_record(&record());
        assert_eq!(output, "3 scenarios (2 passed, 1 failed)");
        assert_eq!(format_brief(&StatusCounts::default()), "0 scenarios");
    }

    #[test]
    fn test_json_counts() {
        let output = ResultFormatter::new(OutputFormat::Json).format_record(&record());
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["run_id"], "9999");
        assert_eq!(value["total"], 3);
        assert_eq!(value["failed"], 1);
        assert!(value.get("entries").is_none());
    }

    #[test]
    fn test_detailed_table_lists_failures() {
        let output = ResultFormatter::new(OutputFormat::Table)
            .no_color()
            .detailed(true)
            .format_record(&record());
        assert!(output.contains("FAILED (1):"));
        assert!(output.contains("✗ Scenario: c"));
        assert!(!output.contains("\x1b["));
    }

    #[test]
    fn test_csv_counts() {
        let output = ResultFormatter::new(OutputFormat::Csv).format_record(&record());
        assert!(output.starts_with("status,count\npassed,2\nfailed,1\n"));
    }
}
