//! Per-event merge cycles

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use tracing::{debug, warn};

use super::{MergeError, TreeDocument};
use crate::models::event::{example_id, example_step_id, folder_id, plain_step_id};
use crate::models::{
    FeatureRef, HierarchyTree, LifecycleEvent, Node, NodeId, NodeKind, Outcome, ScenarioRef,
    StepLocation,
};
use crate::portal::{EntryKind, EntryRequest, ReportingService, Severity};
use crate::shared::{OpenMode, RunId, SharedDocument};

/// What a merge cycle changed
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MergeOutcome {
    /// Nodes created, parents before children
    pub created: Vec<NodeId>,
    /// Node whose status was merged
    pub updated: Option<NodeId>,
    /// Outline start skipped because it was already expanded
    pub retry: bool,
    /// Scenario attached under the root because its feature was unknown
    pub orphan: bool,
    /// Number of finished workers after a suite completion
    pub finished_workers: Option<usize>,
}

#[derive(Clone, Copy)]
struct Remote<'a> {
    service: &'a dyn ReportingService,
    run_id: &'a RunId,
}

impl Remote<'_> {
    fn create(&self, entry: EntryRequest) -> Option<String> {
        self.service
            .create_hierarchy_entry(self.run_id.as_str(), &entry)
    }
}

/// Applies lifecycle events to the shared tree document
pub struct TreeMergeEngine<'a> {
    document: &'a SharedDocument,
    remote: Option<Remote<'a>>,
    /// Remote entry of the scenario this process is running
    current_entry: Option<String>,
}

impl<'a> TreeMergeEngine<'a> {
    pub fn new(
        document: &'a SharedDocument,
        service: Option<&'a dyn ReportingService>,
        run_id: &'a RunId,
    ) -> Self {
        Self {
            document,
            remote: service.map(|service| Remote { service, run_id }),
            current_entry: None,
        }
    }

    /// Resume with the entry a previous engine in this process left open
    pub fn with_current_entry(mut self, entry: Option<String>) -> Self {
        self.current_entry = entry;
        self
    }

    pub fn current_entry(&self) -> Option<&str> {
        self.current_entry.as_deref()
    }

    /// One locked read-modify-write cycle over the tree document
    pub fn update<T, F>(&self, f: F) -> Result<T, MergeError>
    where
        F: FnOnce(&mut TreeDocument) -> Result<T, MergeError>,
    {
        self.document
            .with_exclusive_lock(OpenMode::ReadWrite, |locked| {
                let mut document = TreeDocument::decode(&locked.read()?)?;
                let value = f(&mut document)?;
                locked.write(&document.encode()?)?;
                Ok(value)
            })
    }

    /// Locked read of the current tree document. A missing document reads
    /// as a fresh tree.
    pub fn snapshot(&self) -> Result<TreeDocument, MergeError> {
        let result = self
            .document
            .with_exclusive_lock(OpenMode::ReadOnly, |locked| {
                TreeDocument::decode(&locked.read()?)
            });

        match result {
            Err(MergeError::Document(e)) if e.is_not_found() => Ok(TreeDocument::new()),
            other => other,
        }
    }

    /// Apply one lifecycle event
    pub fn apply(
        &mut self,
        event: &LifecycleEvent,
        now: DateTime<Utc>,
    ) -> Result<MergeOutcome, MergeError> {
        let remote = self.remote;
        let mut outcome = MergeOutcome::default();

        match event {
            LifecycleEvent::FeatureDiscovered { feature } => {
                outcome.created =
                    self.update(|doc| discover_feature(&mut doc.tree, feature, remote, now))?;
            }

            LifecycleEvent::ScenarioStarted {
                feature,
                scenario,
                example_line,
            } => {
                let (started, entry) = self.update(|doc| {
                    start_scenario(&mut doc.tree, feature, scenario, *example_line, remote, now)
                })?;
                outcome = started;
                self.current_entry = entry;
            }

            LifecycleEvent::StepStarted { location, .. } => {
                // Step starts only produce a remote log record
                if let (Some(remote), Some(detail)) = (remote, event.step_detail()) {
                    if let Some(entry) = self.entry_for(Some(location))? {
                        remote
                            .service
                            .post_log(&entry, &detail, Severity::Trace, now);
                    }
                }
            }

            LifecycleEvent::StepFinished {
                location, outcome: result, ..
            } => {
                let detail = event.step_detail();
                let hint = self.current_entry.clone();
                let (id, entry) = self.update(|doc| {
                    let id = finish_step(&mut doc.tree, location, *result, detail.clone())?;
                    let entry = hint.or_else(|| scenario_entry(&doc.tree, &id));
                    Ok((id, entry))
                })?;
                outcome.updated = Some(id);

                if let (Some(remote), Some(entry), Some(detail)) = (remote, entry, detail) {
                    remote
                        .service
                        .post_log(&entry, &detail, Severity::from(*result), now);
                }
            }

            LifecycleEvent::ScenarioFinished {
                scenario,
                example_line,
                outcome: result,
                message,
            } => {
                let hint = self.current_entry.take();
                let (id, entry) = self.update(|doc| {
                    finish_scenario(&mut doc.tree, scenario, *example_line, *result, message)
                        .map(|(id, stored)| (id, hint.or(stored)))
                })?;
                outcome.updated = Some(id);

                if let (Some(remote), Some(entry)) = (remote, entry) {
                    remote
                        .service
                        .finish_entry(&entry, result.scenario_status(), now);
                }
            }

            LifecycleEvent::Attachment {
                attachment,
                location,
            } => match remote {
                Some(remote) => match self.entry_for(location.as_ref())? {
                    Some(entry) => {
                        remote.service.attach_file(&entry, attachment, now);
                    }
                    None => warn!(
                        "No open scenario for attachment {}",
                        attachment.path.display()
                    ),
                },
                None => debug!("Attachment {} not uploaded in local mode", attachment.label()),
            },

            LifecycleEvent::SuiteFinished { worker } => {
                let finished = self.record_finished(*worker)?;
                outcome.finished_workers = Some(finished.len());
            }
        }

        debug!(
            "Applied {}: {} created, updated {:?}",
            event.name(),
            outcome.created.len(),
            outcome.updated.as_ref().map(NodeId::as_str)
        );
        Ok(outcome)
    }

    /// Record suite completion for `worker`, returning every finished worker
    pub fn record_finished(&self, worker: u32) -> Result<BTreeSet<u32>, MergeError> {
        self.update(|doc| {
            if !doc.finished_workers.insert(worker) {
                debug!("Worker {} already recorded as finished", worker);
            }
            Ok(doc.finished_workers.clone())
        })
    }

    /// Remote entry of the running scenario, falling back to the one
    /// enclosing `location` in the shared tree
    fn entry_for(&self, location: Option<&StepLocation>) -> Result<Option<String>, MergeError> {
        if let Some(entry) = &self.current_entry {
            return Ok(Some(entry.clone()));
        }
        let Some(location) = location else {
            return Ok(None);
        };
        let snapshot = self.snapshot()?;
        Ok(scenario_entry(&snapshot.tree, &location.node_id()))
    }
}

/// Remote entry of the scenario or example enclosing a step
fn scenario_entry(tree: &HierarchyTree, step: &NodeId) -> Option<String> {
    tree.find_ancestor(step, |node| {
        (node.kind.is_scenario() || node.kind == NodeKind::Example) && node.remote_id.is_some()
    })
    .and_then(|node| node.remote_id.clone())
}

fn remote_parent(tree: &HierarchyTree, parent: &NodeId) -> Option<String> {
    tree.get(parent).and_then(|node| node.remote_id.clone())
}

fn feature_description(feature: &FeatureRef) -> String {
    match &feature.description {
        Some(description) => description
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
        None => feature.path.clone(),
    }
}

/// Folder chain from the root down to the feature, then the feature itself
fn discover_feature(
    tree: &mut HierarchyTree,
    feature: &FeatureRef,
    remote: Option<Remote<'_>>,
    now: DateTime<Utc>,
) -> Result<Vec<NodeId>, MergeError> {
    let mut created = Vec::new();
    let mut parent = NodeId::root();
    let mut trail = Vec::new();

    for component in feature.folders() {
        trail.push(component);
        let id = folder_id(&trail);

        if !tree.contains(&id) {
            let remote_id = remote.and_then(|remote| {
                remote.create(EntryRequest {
                    name: format!("Folder: {component}"),
                    kind: EntryKind::Suite,
                    parent: remote_parent(tree, &parent),
                    tags: Vec::new(),
                    description: None,
                    start_time: now,
                })
            });
            tree.add_child(
                &parent,
                Node::new(id.clone(), NodeKind::Folder, component).with_remote_id(remote_id),
            )?;
            created.push(id.clone());
        }
        parent = id;
    }

    let id = feature.node_id();
    if !tree.contains(&id) {
        let remote_id = remote.and_then(|remote| {
            remote.create(EntryRequest {
                name: feature.label(),
                kind: EntryKind::Test,
                parent: remote_parent(tree, &parent),
                tags: feature.tags.clone(),
                description: Some(feature_description(feature)),
                start_time: now,
            })
        });
        tree.add_child(
            &parent,
            Node::new(id.clone(), NodeKind::Feature, feature.label())
                .with_tags(feature.tags.clone())
                .with_remote_id(remote_id),
        )?;
        created.push(id);
    }

    Ok(created)
}

fn ensure_step(
    tree: &mut HierarchyTree,
    parent: &NodeId,
    id: NodeId,
    label: String,
    created: &mut Vec<NodeId>,
) -> Result<(), MergeError> {
    if tree.contains(&id) {
        // Shared background steps resolve to the node created first
        debug!("Step {} already present", id);
        return Ok(());
    }
    tree.add_child(parent, Node::new(id.clone(), NodeKind::TestStep, label))?;
    created.push(id);
    Ok(())
}

fn expand_outline(
    tree: &mut HierarchyTree,
    outline: &NodeId,
    scenario: &ScenarioRef,
    created: &mut Vec<NodeId>,
) -> Result<(), MergeError> {
    for row in &scenario.examples {
        let id = example_id(&scenario.path, row.line);
        if !tree.contains(&id) {
            let label = format!("| {} |", row.cells.join(" | "));
            tree.add_child(
                outline,
                Node::new(id.clone(), NodeKind::Example, label).with_values(row.cells.clone()),
            )?;
            created.push(id.clone());
        }

        for step in &scenario.steps {
            let step_id = example_step_id(&scenario.path, row.line, step.line);
            ensure_step(tree, &id, step_id, step.label(), created)?;
        }
    }
    Ok(())
}

/// Create the scenario node (and its examples or steps) if absent. Returns
/// the remote entry opened for this run of the scenario.
fn start_scenario(
    tree: &mut HierarchyTree,
    feature: &FeatureRef,
    scenario: &ScenarioRef,
    example_line: Option<u32>,
    remote: Option<Remote<'_>>,
    now: DateTime<Utc>,
) -> Result<(MergeOutcome, Option<String>), MergeError> {
    let mut outcome = MergeOutcome::default();
    let outline = scenario.is_outline();
    let kind = if outline {
        NodeKind::TestCaseWithExamples
    } else {
        NodeKind::TestCase
    };

    let feature_id = feature.node_id();
    let parent = if tree.contains(&feature_id) {
        feature_id
    } else {
        warn!(
            "Feature {} unknown, attaching '{}' under the root",
            feature.path, scenario.name
        );
        outcome.orphan = true;
        NodeId::root()
    };

    let id = scenario.node_id();
    let existing = tree.get(&id).map(Node::has_children);
    match existing {
        Some(true) if outline => {
            debug!("Outline '{}' already expanded", scenario.name);
            outcome.retry = true;
        }
        Some(_) => {}
        None => {
            tree.add_child(
                &parent,
                Node::new(id.clone(), kind, scenario.label()).with_tags(scenario.tags.clone()),
            )?;
            outcome.created.push(id.clone());
        }
    }

    if !outcome.retry {
        if outline {
            expand_outline(tree, &id, scenario, &mut outcome.created)?;
        } else {
            for step in &scenario.steps {
                let step_id = plain_step_id(&scenario.path, step.line);
                ensure_step(tree, &id, step_id, step.label(), &mut outcome.created)?;
            }
        }
    }

    let entry = match remote {
        Some(remote) => {
            let entry = remote.create(EntryRequest {
                name: scenario.label(),
                kind: EntryKind::Step,
                parent: remote_parent(tree, &parent),
                tags: scenario.tags.clone(),
                description: scenario.description.clone(),
                start_time: now,
            });

            let holder = example_line
                .map(|line| example_id(&scenario.path, line))
                .filter(|example| outline && tree.contains(example))
                .unwrap_or_else(|| id.clone());
            if let Some(node) = tree.get_mut(&holder) {
                node.remote_id = entry.clone();
                node.outcome = None;
            }
            entry
        }
        None => None,
    };

    Ok((outcome, entry))
}

fn finish_step(
    tree: &mut HierarchyTree,
    location: &StepLocation,
    result: Outcome,
    detail: Option<String>,
) -> Result<NodeId, MergeError> {
    let id = location.node_id();
    let node = tree
        .get_mut(&id)
        .filter(|node| node.kind == NodeKind::TestStep)
        .ok_or_else(|| MergeError::NodeNotFound {
            id: id.clone(),
            event: "step_finished",
        })?;

    node.status = result.step_status();
    node.outcome = Some(result);
    node.detail = detail;
    Ok(id)
}

/// Merge the scenario result. Returns the scenario id and the remote entry
/// stored for this run, if any.
fn finish_scenario(
    tree: &mut HierarchyTree,
    scenario: &ScenarioRef,
    example_line: Option<u32>,
    result: Outcome,
    message: &Option<String>,
) -> Result<(NodeId, Option<String>), MergeError> {
    let id = scenario.node_id();
    let node = tree
        .get_mut(&id)
        .filter(|node| node.kind.is_scenario())
        .ok_or_else(|| MergeError::NodeNotFound {
            id: id.clone(),
            event: "scenario_finished",
        })?;

    // Outlines derive their status per example
    if node.kind == NodeKind::TestCase {
        node.status = result.scenario_status();
    }
    node.outcome = Some(result);
    node.detail = message.clone();
    let mut entry = node.remote_id.clone();

    if let Some(example) = example_line.and_then(|line| tree.get_mut(&example_id(&scenario.path, line))) {
        example.outcome = Some(result);
        if example.remote_id.is_some() {
            entry = example.remote_id.clone();
        }
    }

    Ok((id, entry))
}
