//! End-of-run work done by the last finishing worker

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::models::{HierarchyTree, NodeKind, Status};
use crate::portal::ReportingService;
use crate::results::RunRecord;

/// What the last worker produced when closing the run
#[derive(Clone, Debug)]
pub struct Teardown {
    pub record: RunRecord,
    /// Run metadata fetched from the remote service
    pub launch_info: Option<serde_json::Value>,
    /// Shared documents deleted
    pub removed: usize,
}

impl Teardown {
    pub fn link(&self) -> Option<&str> {
        self.record.link.as_deref()
    }
}

/// Remote entries still open at the end of the run, children first.
///
/// Folders and features are never finished by an event. Scenario and example
/// entries are open when no finish was merged for them.
pub(crate) fn open_entries(tree: &HierarchyTree) -> Vec<&str> {
    tree.post_order()
        .into_iter()
        .filter(|node| match node.kind {
            NodeKind::Folder | NodeKind::Feature => true,
            NodeKind::TestCase | NodeKind::TestCaseWithExamples | NodeKind::Example => {
                node.outcome.is_none()
            }
            NodeKind::Root | NodeKind::TestStep => false,
        })
        .filter_map(|node| node.remote_id.as_deref())
        .collect()
}

/// Close every open entry, then the run itself
pub(crate) fn finish_remote(
    service: &dyn ReportingService,
    run_id: &str,
    tree: &HierarchyTree,
    now: DateTime<Utc>,
) -> Option<serde_json::Value> {
    let entries = open_entries(tree);
    debug!("Finishing {} open remote entries", entries.len());
    for entry in entries {
        service.finish_entry(entry, Status::Unset, now);
    }

    if service.finish_run(run_id, now) {
        info!("Finished remote run {}", run_id);
    }
    service.fetch_run_info(run_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Node, NodeId, Outcome};
    use crate::portal::recording::{Call, RecordingService};

    fn node(id: &str, kind: NodeKind, remote: Option<&str>) -> Node {
        Node::new(id.into(), kind, id).with_remote_id(remote.map(String::from))
    }

    fn tree() -> HierarchyTree {
        let mut tree = HierarchyTree::new();
        let root = NodeId::root();
        tree.add_child(&root, node("folder", NodeKind::Folder, Some("e-folder")))
            .unwrap();
        tree.add_child(&"folder".into(), node("feature", NodeKind::Feature, Some("e-feature")))
            .unwrap();

        let mut done = node("done", NodeKind::TestCase, Some("e-done"));
        done.outcome = Some(Outcome::Passed);
        tree.add_child(&"feature".into(), done).unwrap();
        tree.add_child(&"feature".into(), node("open", NodeKind::TestCase, Some("e-open")))
            .unwrap();
        tree.add_child(&"feature".into(), node("local", NodeKind::TestCase, None))
            .unwrap();
        tree
    }

    #[test]
    fn test_open_entries_children_first() {
        assert_eq!(open_entries(&tree()), ["e-open", "e-feature", "e-folder"]);
    }

    #[test]
    fn test_finish_remote_closes_run_last() {
        let service = RecordingService::default();
        let info = finish_remote(&service, "launch-1", &tree(), Utc::now()).unwrap();

        let calls = service.calls();
        assert_eq!(
            calls,
            vec![
                Call::FinishEntry("e-open".into(), Status::Unset),
                Call::FinishEntry("e-feature".into(), Status::Unset),
                Call::FinishEntry("e-folder".into(), Status::Unset),
                Call::FinishRun("launch-1".into()),
                Call::FetchRunInfo("launch-1".into()),
            ]
        );
        assert_eq!(info["id"], 7);
    }

    #[test]
    fn test_finish_remote_without_service_info() {
        let service = RecordingService::failing();
        assert!(finish_remote(&service, "launch-1", &HierarchyTree::new(), Utc::now()).is_none());
    }
}
