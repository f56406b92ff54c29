//! Run identity election
//!
//! The first worker to lock an empty run-id document mints the run id and
//! writes it; every later worker reads the same id back.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{DocumentError, OpenMode, SharedDocument};
use crate::portal::{ReportingService, RunRequest};

/// Election errors
#[derive(Error, Debug)]
pub enum ElectionError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("Run id document {0} does not hold valid UTF-8")]
    InvalidRunId(String),
}

/// Identity shared by every worker of one run
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Run id used when no remote service is involved
    pub const LOCAL: &'static str = "9999";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn local() -> Self {
        Self::new(Self::LOCAL)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_local(&self) -> bool {
        self.0 == Self::LOCAL
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of [`elect_or_join`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Election {
    pub run_id: RunId,
    /// Whether this process minted the id
    pub elected: bool,
}

/// Elect this process as the run-id minter, or join the run another process
/// already started.
///
/// With a remote `service` the elected process asks it for a fresh id. If the
/// service is unreachable the local id is used so the run can continue.
pub fn elect_or_join(
    document: &SharedDocument,
    service: Option<&dyn ReportingService>,
    request: &RunRequest,
) -> Result<Election, ElectionError> {
    document.with_exclusive_lock(OpenMode::ReadWrite, |locked| {
        let bytes = locked.read()?;
        let content = String::from_utf8(bytes)
            .map_err(|_| ElectionError::InvalidRunId(locked.path().display().to_string()))?;

        if let Some(existing) = content.lines().next().map(str::trim).filter(|l| !l.is_empty()) {
            debug!("Joining run {}", existing);
            return Ok(Election {
                run_id: RunId::new(existing),
                elected: false,
            });
        }

        let run_id = match service {
            Some(service) => match service.start_run(request) {
                Some(id) => RunId::new(id),
                None => {
                    warn!(
                        "Could not start a remote run, continuing with run id {}",
                        RunId::LOCAL
                    );
                    RunId::local()
                }
            },
            None => RunId::local(),
        };

        locked.write(run_id.as_str().as_bytes())?;
        info!("Elected to start run {}", run_id);
        Ok(Election {
            run_id,
            elected: true,
        })
    })
}

/// Read the run id without electing; `None` when no run has started
pub fn current_run_id(document: &SharedDocument) -> Result<Option<RunId>, ElectionError> {
    let result = document.with_exclusive_lock(OpenMode::ReadOnly, |locked| {
        let bytes = locked.read()?;
        let content = String::from_utf8(bytes)
            .map_err(|_| ElectionError::InvalidRunId(locked.path().display().to_string()))?;
        Ok(content
            .lines()
            .next()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(RunId::new))
    });

    match result {
        Err(ElectionError::Document(e)) if e.is_not_found() => Ok(None),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::recording::{Call, RecordingService};
    use crate::portal::LaunchMode;
    use chrono::Utc;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use tempfile::tempdir;

    fn request() -> RunRequest {
        RunRequest {
            name: "nightly".to_string(),
            description: None,
            start_time: Utc::now(),
            tags: vec![],
            attributes: vec![],
            mode: LaunchMode::Default,
        }
    }

    #[test]
    fn test_first_caller_is_elected_locally() {
        let dir = tempdir().unwrap();
        let doc = SharedDocument::new(dir.path().join("run.lck"));

        let first = elect_or_join(&doc, None, &request()).unwrap();
        assert!(first.elected);
        assert!(first.run_id.is_local());

        let second = elect_or_join(&doc, None, &request()).unwrap();
        assert!(!second.elected);
        assert_eq!(second.run_id, first.run_id);
    }

    #[test]
    fn test_remote_id_requested_once() {
        let dir = tempdir().unwrap();
        let doc = SharedDocument::new(dir.path().join("run.lck"));
        let service = RecordingService::default();

        for _ in 0..3 {
            let election = elect_or_join(&doc, Some(&service), &request()).unwrap();
            assert_eq!(election.run_id.as_str(), "launch-1");
        }
        assert_eq!(service.calls(), vec![Call::StartRun("nightly".to_string())]);
        assert_eq!(std::fs::read_to_string(doc.path()).unwrap(), "launch-1");
    }

    #[test]
    fn test_remote_failure_falls_back_to_local_id() {
        let dir = tempdir().unwrap();
        let doc = SharedDocument::new(dir.path().join("run.lck"));
        let service = RecordingService::failing();

        let election = elect_or_join(&doc, Some(&service), &request()).unwrap();
        assert!(election.elected);
        assert!(election.run_id.is_local());
    }

    #[test]
    fn test_whitespace_document_counts_as_empty() {
        let dir = tempdir().unwrap();
        let doc = SharedDocument::new(dir.path().join("run.lck"));
        std::fs::write(doc.path(), "  \n").unwrap();

        assert!(elect_or_join(&doc, None, &request()).unwrap().elected);
    }

    #[test]
    fn test_current_run_id() {
        let dir = tempdir().unwrap();
        let doc = SharedDocument::new(dir.path().join("run.lck"));
        assert_eq!(current_run_id(&doc).unwrap(), None);

        elect_or_join(&doc, None, &request()).unwrap();
        assert_eq!(current_run_id(&doc).unwrap(), Some(RunId::local()));
    }

    #[test]
    fn test_exactly_one_process_elected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.lck");
        let workers = 8;
        let barrier = Arc::new(Barrier::new(workers));

        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let doc = SharedDocument::new(path.clone());
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    elect_or_join(&doc, None, &request()).unwrap()
                })
            })
            .collect();

        let elections: Vec<Election> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(elections.iter().filter(|e| e.elected).count(), 1);
        assert!(elections.iter().all(|e| e.run_id.is_local()));
    }
}
