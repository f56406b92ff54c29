//! Lifecycle events emitted by the test-framework adapter
//!
//! Events arrive as newline-delimited JSON, tagged by `event`.

use serde::{Deserialize, Serialize};

use super::{NodeId, Outcome};
use crate::portal::Attachment;

/// A feature file as seen by the adapter
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureRef {
    /// Source path of the feature file, relative to the project
    pub path: String,
    pub name: String,
    #[serde(default = "default_feature_keyword")]
    pub keyword: String,
    #[serde(default = "default_line")]
    pub line: u32,
    #[serde(default = "default_line")]
    pub column: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_feature_keyword() -> String {
    "Feature".to_string()
}

fn default_scenario_keyword() -> String {
    "Scenario".to_string()
}

fn default_line() -> u32 {
    1
}

impl FeatureRef {
    pub fn node_id(&self) -> NodeId {
        NodeId::derive(
            "feature",
            [self.path.clone(), self.line.to_string(), self.column.to_string()],
        )
    }

    pub fn label(&self) -> String {
        format!("{}: {}", self.keyword, self.name)
    }

    /// Directory components leading to the feature file
    pub fn folders(&self) -> Vec<&str> {
        let mut components: Vec<&str> = self
            .path
            .split(['/', '\\'])
            .filter(|c| !c.is_empty() && *c != ".")
            .collect();
        components.pop();
        components
    }
}

/// A step template within a scenario
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepRef {
    pub keyword: String,
    pub text: String,
    pub line: u32,
}

impl StepRef {
    pub fn label(&self) -> String {
        format!("{} {}", self.keyword.trim(), self.text)
    }
}

/// One row of an outline's examples table
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExampleRow {
    pub line: u32,
    #[serde(default)]
    pub cells: Vec<String>,
}

/// A scenario or scenario outline
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRef {
    /// Source path of the feature file holding the scenario
    pub path: String,
    pub name: String,
    #[serde(default = "default_scenario_keyword")]
    pub keyword: String,
    pub line: u32,
    #[serde(default = "default_line")]
    pub column: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub steps: Vec<StepRef>,
    /// Example rows, for outlines
    #[serde(default)]
    pub examples: Vec<ExampleRow>,
}

impl ScenarioRef {
    pub fn node_id(&self) -> NodeId {
        let steps = self
            .steps
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(". ");
        NodeId::derive(
            "scenario",
            [
                self.path.clone(),
                self.name.clone(),
                self.line.to_string(),
                self.column.to_string(),
                steps,
            ],
        )
    }

    pub fn is_outline(&self) -> bool {
        self.keyword.to_uppercase().contains("OUTLINE")
    }

    pub fn label(&self) -> String {
        format!("{}: {}", self.keyword, self.name)
    }
}

/// Source location of an executed step.
///
/// Steps instantiated from an outline carry the line of the example row as
/// well as the line of the step template.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepLocation {
    pub path: String,
    pub line: u32,
    #[serde(default)]
    pub example_line: Option<u32>,
}

impl StepLocation {
    pub fn plain(path: impl Into<String>, line: u32) -> Self {
        Self {
            path: path.into(),
            line,
            example_line: None,
        }
    }

    pub fn in_example(path: impl Into<String>, example_line: u32, line: u32) -> Self {
        Self {
            path: path.into(),
            line,
            example_line: Some(example_line),
        }
    }

    pub fn node_id(&self) -> NodeId {
        match self.example_line {
            Some(row) => example_step_id(&self.path, row, self.line),
            None => plain_step_id(&self.path, self.line),
        }
    }
}

pub fn example_id(path: &str, row_line: u32) -> NodeId {
    NodeId::derive("example", [path.to_string(), row_line.to_string()])
}

pub fn plain_step_id(path: &str, step_line: u32) -> NodeId {
    NodeId::derive("step", [path.to_string(), step_line.to_string()])
}

pub fn example_step_id(path: &str, row_line: u32, step_line: u32) -> NodeId {
    NodeId::derive(
        "step",
        [path.to_string(), row_line.to_string(), step_line.to_string()],
    )
}

pub fn folder_id(components: &[&str]) -> NodeId {
    NodeId::derive("folder", components)
}

/// Multiline argument attached to a step
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepArgument {
    DocString(String),
    DataTable(Vec<Vec<String>>),
}

impl StepArgument {
    /// Render the argument the way it appears in the feature file
    pub fn render(&self) -> String {
        match self {
            StepArgument::DocString(content) => format!("\n\"\"\"\n{content}\n\"\"\""),
            StepArgument::DataTable(rows) => rows.iter().fold(String::from("\n"), |mut acc, row| {
                acc.push_str(&format!("| {} |\n", row.join(" | ")));
                acc
            }),
        }
    }
}

/// Lifecycle event from the test framework
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    FeatureDiscovered {
        feature: FeatureRef,
    },
    ScenarioStarted {
        feature: FeatureRef,
        scenario: ScenarioRef,
        /// Example row being run, for outlines
        #[serde(default)]
        example_line: Option<u32>,
    },
    StepStarted {
        location: StepLocation,
        keyword: String,
        text: String,
        #[serde(default)]
        argument: Option<StepArgument>,
    },
    StepFinished {
        location: StepLocation,
        keyword: String,
        text: String,
        outcome: Outcome,
        #[serde(default)]
        message: Option<String>,
    },
    ScenarioFinished {
        scenario: ScenarioRef,
        #[serde(default)]
        example_line: Option<u32>,
        outcome: Outcome,
        #[serde(default)]
        message: Option<String>,
    },
    /// A file to attach to the running scenario's log
    Attachment {
        attachment: Attachment,
        /// Step the file belongs to; locates the scenario when this process
        /// has none open
        #[serde(default)]
        location: Option<StepLocation>,
    },
    SuiteFinished {
        worker: u32,
    },
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::FeatureDiscovered { .. } => "feature_discovered",
            LifecycleEvent::ScenarioStarted { .. } => "scenario_started",
            LifecycleEvent::StepStarted { .. } => "step_started",
            LifecycleEvent::StepFinished { .. } => "step_finished",
            LifecycleEvent::ScenarioFinished { .. } => "scenario_finished",
            LifecycleEvent::Attachment { .. } => "attachment",
            LifecycleEvent::SuiteFinished { .. } => "suite_finished",
        }
    }

    /// Text logged for a step event
    pub fn step_detail(&self) -> Option<String> {
        match self {
            LifecycleEvent::StepStarted {
                keyword,
                text,
                argument,
                ..
            } => {
                let mut detail = format!("{} {}", keyword.trim(), text);
                if let Some(argument) = argument {
                    detail.push_str(&argument.render());
                }
                Some(detail)
            }
            LifecycleEvent::StepFinished {
                keyword,
                text,
                outcome,
                message,
                ..
            } => Some(match outcome {
                Outcome::Failed | Outcome::Pending | Outcome::Error => message
                    .clone()
                    .unwrap_or_else(|| format!("{} {}: {}", keyword.trim(), text, outcome)),
                Outcome::Undefined => match message {
                    Some(message) => format!("Undefined step: {text}:\n{message}"),
                    None => format!("Undefined step: {text}"),
                },
                Outcome::Passed | Outcome::Skipped => format!("{} {}", keyword.trim(), text),
            }),
            _ => None,
        }
    }
}
