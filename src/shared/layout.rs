//! Locations of the documents shared by the workers of one run

use std::path::{Path, PathBuf};
use tracing::warn;

use super::SharedDocument;

const DOCUMENT_PREFIX: &str = "parallel-report";

/// The pair of shared documents belonging to a run
#[derive(Clone, Debug)]
pub struct RunDocuments {
    dir: PathBuf,
    run_key: String,
}

impl RunDocuments {
    pub fn new(dir: impl Into<PathBuf>, run_key: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            run_key: sanitize_key(&run_key.into()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn run_key(&self) -> &str {
        &self.run_key
    }

    /// Raw-text document holding the run id
    pub fn run_id(&self) -> SharedDocument {
        SharedDocument::new(
            self.dir
                .join(format!("{DOCUMENT_PREFIX}-{}-run.lck", self.run_key)),
        )
    }

    /// Serialized report tree
    pub fn tree(&self) -> SharedDocument {
        SharedDocument::new(
            self.dir
                .join(format!("{DOCUMENT_PREFIX}-{}-tree.json", self.run_key)),
        )
    }

    /// Delete both documents. Missing documents and removal failures are
    /// logged, never returned: teardown must not fail on a lost race.
    pub fn remove_all(&self) -> usize {
        [self.run_id(), self.tree()]
            .iter()
            .filter(|doc| match doc.remove() {
                Ok(removed) => removed,
                Err(e) => {
                    warn!("{}", e);
                    false
                }
            })
            .count()
    }
}

/// Keep run keys usable as a file name component
fn sanitize_key(key: &str) -> String {
    let cleaned: String = key
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        "default".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_document_names() {
        let docs = RunDocuments::new("/tmp/shared", "nightly");
        assert_eq!(
            docs.run_id().path(),
            Path::new("/tmp/shared/parallel-report-nightly-run.lck")
        );
        assert_eq!(
            docs.tree().path(),
            Path::new("/tmp/shared/parallel-report-nightly-tree.json")
        );
    }

    #[test]
    fn test_sanitize_key() {
        assert_eq!(RunDocuments::new("/tmp", "a/b c").run_key(), "a_b_c");
        assert_eq!(RunDocuments::new("/tmp", "  ").run_key(), "default");
    }

    #[test]
    fn test_remove_all_tolerates_missing() {
        let dir = tempdir().unwrap();
        let docs = RunDocuments::new(dir.path(), "run");
        std::fs::write(docs.tree().path(), b"{}").unwrap();

        assert_eq!(docs.remove_all(), 1);
        assert_eq!(docs.remove_all(), 0);
    }
}
