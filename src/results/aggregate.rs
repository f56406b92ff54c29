//! Execution statistics for a finished tree
//!
//! Aggregation is a pure, lock-free pass over a tree snapshot. Plain test
//! cases count with their own status; an outline counts once per example,
//! with the example status folded from its steps.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{HierarchyTree, Node, NodeKind, Outcome, Status};

/// Number of counted scenarios per status
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub pending: usize,
    pub other: usize,
}

impl StatusCounts {
    pub fn add(&mut self, status: Status) {
        match status {
            Status::Passed => self.passed += 1,
            Status::Failed => self.failed += 1,
            Status::Skipped => self.skipped += 1,
            Status::Pending => self.pending += 1,
            Status::Other | Status::Unset => self.other += 1,
        }
    }

    pub fn get(&self, status: Status) -> usize {
        match status {
            Status::Passed => self.passed,
            Status::Failed => self.failed,
            Status::Skipped => self.skipped,
            Status::Pending => self.pending,
            Status::Other => self.other,
            Status::Unset => 0,
        }
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped + self.pending + self.other
    }

    /// Percentage of passed scenarios
    pub fn pass_rate(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            (self.passed as f64 / self.total() as f64) * 100.0
        }
    }

    pub fn all_passed(&self) -> bool {
        self.passed == self.total()
    }
}

/// A step as listed under a counted entry
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepSummary {
    pub label: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// One counted test case or example
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregateEntry {
    pub id: String,
    pub kind: NodeKind,
    pub label: String,
    /// Outline label, for examples
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
    pub steps: Vec<StepSummary>,
}

impl AggregateEntry {
    fn from_node(tree: &HierarchyTree, node: &Node, status: Status) -> Self {
        Self {
            id: node.id.to_string(),
            kind: node.kind,
            label: node.label.clone(),
            scenario: None,
            status,
            outcome: node.outcome,
            detail: node.detail.clone(),
            values: node.values.clone(),
            steps: tree
                .children(&node.id)
                .map(|step| StepSummary {
                    label: step.label.clone(),
                    status: step.status,
                    detail: step.detail.clone(),
                })
                .collect(),
        }
    }

    /// Label including the outline name for examples
    pub fn display_label(&self) -> String {
        match &self.scenario {
            Some(scenario) => format!("{} {}", scenario, self.label),
            None => self.label.clone(),
        }
    }

    /// First failure detail among the entry and its steps
    pub fn failure_detail(&self) -> Option<&str> {
        self.steps
            .iter()
            .find(|step| matches!(step.status, Status::Failed | Status::Other))
            .and_then(|step| step.detail.as_deref())
            .or(self.detail.as_deref())
    }
}

/// Result of aggregating a tree
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    pub counts: StatusCounts,
    /// Counted entries in tree order
    pub entries: Vec<AggregateEntry>,
}

impl Aggregation {
    /// Entries grouped by their status, in display order
    pub fn by_status(&self) -> BTreeMap<Status, Vec<&AggregateEntry>> {
        let mut grouped: BTreeMap<Status, Vec<&AggregateEntry>> = BTreeMap::new();
        for entry in &self.entries {
            grouped.entry(entry.status).or_default().push(entry);
        }
        grouped
    }
}

/// Fold step statuses into the status of an example
pub fn fold_example<I>(steps: I) -> Status
where
    I: IntoIterator<Item = Status>,
{
    let steps: Vec<Status> = steps.into_iter().collect();
    let all_in = |allowed: &[Status]| steps.iter().all(|s| allowed.contains(s));

    if all_in(&[Status::Passed]) {
        Status::Passed
    } else if steps.contains(&Status::Failed) {
        Status::Failed
    } else if all_in(&[Status::Passed, Status::Skipped]) {
        Status::Skipped
    } else if all_in(&[Status::Passed, Status::Pending, Status::Skipped]) {
        Status::Pending
    } else {
        Status::Other
    }
}

/// Count every test case and example in the tree
pub fn aggregate(tree: &HierarchyTree) -> Aggregation {
    let mut aggregation = Aggregation::default();

    for node in tree.pre_order() {
        match node.kind {
            NodeKind::TestCase => {
                let status = if node.status.is_set() {
                    node.status
                } else {
                    Status::Other
                };
                aggregation.counts.add(status);
                aggregation
                    .entries
                    .push(AggregateEntry::from_node(tree, node, status));
            }
            NodeKind::TestCaseWithExamples => {
                for example in tree.children(&node.id) {
                    let status = fold_example(tree.children(&example.id).map(|s| s.status));
                    aggregation.counts.add(status);

                    let mut entry = AggregateEntry::from_node(tree, example, status);
                    entry.scenario = Some(node.label.clone());
                    aggregation.entries.push(entry);
                }
            }
            NodeKind::Root
            | NodeKind::Folder
            | NodeKind::Feature
            | NodeKind::Example
            | NodeKind::TestStep => {}
        }
    }

    aggregation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeId;

    #[test]
    fn test_fold_example_law() {
        use Status::*;
        assert_eq!(fold_example([Passed, Passed]), Passed);
        assert_eq!(fold_example([Passed, Failed]), Failed);
        assert_eq!(fold_example([Passed, Skipped]), Skipped);
        assert_eq!(fold_example([Passed, Pending]), Pending);
        assert_eq!(fold_example([Skipped, Other]), Other);
        assert_eq!(fold_example([Pending, Failed, Other]), Failed);
        assert_eq!(fold_example([Passed, Unset]), Other);
        assert_eq!(fold_example([]), Passed);
    }

    fn add(tree: &mut HierarchyTree, parent: &str, id: &str, kind: NodeKind, status: Status) {
        let mut node = Node::new(id.into(), kind, id);
        node.status = status;
        tree.add_child(&NodeId::from(parent), node).unwrap();
    }

    fn sample_tree() -> HierarchyTree {
        let mut tree = HierarchyTree::new();
        add(&mut tree, "root", "feature", NodeKind::Feature, Status::Unset);
        add(&mut tree, "feature", "login", NodeKind::TestCase, Status::Passed);
        add(&mut tree, "login", "login-1", NodeKind::TestStep, Status::Passed);
        add(&mut tree, "feature", "logout", NodeKind::TestCase, Status::Failed);
        add(&mut tree, "logout", "logout-1", NodeKind::TestStep, Status::Failed);
        add(&mut tree, "feature", "sums", NodeKind::TestCaseWithExamples, Status::Unset);
        add(&mut tree, "sums", "row-1", NodeKind::Example, Status::Unset);
        add(&mut tree, "row-1", "row-1-a", NodeKind::TestStep, Status::Passed);
        add(&mut tree, "row-1", "row-1-b", NodeKind::TestStep, Status::Passed);
        add(&mut tree, "sums", "row-2", NodeKind::Example, Status::Unset);
        add(&mut tree, "row-2", "row-2-a", NodeKind::TestStep, Status::Passed);
        add(&mut tree, "row-2", "row-2-b", NodeKind::TestStep, Status::Pending);
        tree
    }

    #[test]
    fn test_aggregate_counts() {
        let aggregation = aggregate(&sample_tree());
        assert_eq!(
            aggregation.counts,
            StatusCounts {
                passed: 2,
                failed: 1,
                pending: 1,
                ..StatusCounts::default()
            }
        );
        assert_eq!(aggregation.counts.total(), 4);
        assert_eq!(aggregation.counts.pass_rate(), 50.0);
    }

    #[test]
    fn test_aggregate_entries_in_tree_order() {
        let aggregation = aggregate(&sample_tree());
        let labels: Vec<_> = aggregation.entries.iter().map(|e| e.display_label()).collect();
        assert_eq!(labels, ["login", "logout", "sums row-1", "sums row-2"]);

        let grouped = aggregation.by_status();
        assert_eq!(grouped[&Status::Passed].len(), 2);
        assert_eq!(grouped[&Status::Pending][0].steps.len(), 2);
    }

    #[test]
    fn test_unfinished_test_case_counts_as_other() {
        let mut tree = HierarchyTree::new();
        add(&mut tree, "root", "stuck", NodeKind::TestCase, Status::Unset);

        let aggregation = aggregate(&tree);
        assert_eq!(aggregation.counts.other, 1);
        assert_eq!(aggregation.entries[0].status, Status::Other);
    }

    #[test]
    fn test_aggregate_does_not_mutate() {
        let tree = sample_tree();
        let before = tree.clone();
        let first = aggregate(&tree);
        let second = aggregate(&tree);
        assert_eq!(tree, before);
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_tree() {
        let aggregation = aggregate(&HierarchyTree::new());
        assert_eq!(aggregation.counts.total(), 0);
        assert!(aggregation.counts.all_passed());
        assert!(aggregation.entries.is_empty());
    }
}
