//! Per-process reporting session
//!
//! A session is the explicit context a worker carries between lifecycle
//! events: its configuration, the shared document layout, its identity in the
//! parallel run and, in remote mode, the reporting service. The tree itself
//! always lives in the shared document.

mod teardown;

pub use teardown::Teardown;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{ReportConfig, WorkerInfo};
use crate::engine::{MergeOutcome, TreeDocument, TreeMergeEngine};
use crate::models::LifecycleEvent;
use crate::portal::{PortalClient, ReportingService};
use crate::results::{write_launch_info, RunRecord};
use crate::shared::{current_run_id, elect_or_join, Election, RunDocuments, RunId};
use crate::utils::Timer;

/// Result of applying one event through the session
#[derive(Debug)]
pub enum Progress {
    /// The event was merged into the tree
    Merged(MergeOutcome),
    /// Suite completion recorded; other workers are still running
    Waiting { finished: usize, expected: u32 },
    /// This worker finished last and closed the run
    TornDown(Box<Teardown>),
}

/// Explicit context of one worker process
pub struct ReportSession {
    config: ReportConfig,
    documents: RunDocuments,
    worker: WorkerInfo,
    service: Option<Arc<dyn ReportingService>>,
    run_id: Option<RunId>,
    /// Remote entry of the scenario this process is running
    current_entry: Option<String>,
}

impl ReportSession {
    /// Build a session from validated configuration. Remote mode connects a
    /// [`PortalClient`].
    pub fn from_config(config: ReportConfig, worker: WorkerInfo) -> Result<Self> {
        config.validate()?;

        let service: Option<Arc<dyn ReportingService>> = if config.is_remote() {
            let client = PortalClient::new(
                config.endpoint.as_deref().unwrap_or_default(),
                config.project.as_deref().unwrap_or_default(),
                config.token.as_deref().unwrap_or_default(),
                config.timeout_secs,
            )
            .context("Failed to create reporting client")?;
            Some(Arc::new(client))
        } else {
            None
        };

        Ok(Self::with_service(config, worker, service))
    }

    pub fn with_service(
        config: ReportConfig,
        worker: WorkerInfo,
        service: Option<Arc<dyn ReportingService>>,
    ) -> Self {
        let documents = RunDocuments::new(config.shared_dir(), config.run_key.clone());
        debug!(
            "Worker {} using shared documents in {}",
            worker.number,
            documents.dir().display()
        );

        Self {
            config,
            documents,
            worker,
            service,
            run_id: None,
            current_entry: None,
        }
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    pub fn documents(&self) -> &RunDocuments {
        &self.documents
    }

    pub fn worker(&self) -> WorkerInfo {
        self.worker
    }

    /// Number of workers whose completion closes the run
    pub fn expected_workers(&self) -> u32 {
        self.config.expected_workers(&self.worker)
    }

    /// Elect this process to start the run, or join the running one
    pub fn launch_started(&mut self, start_time: DateTime<Utc>) -> Result<Election> {
        let request = self.config.run_request(start_time);
        let election = elect_or_join(
            &self.documents.run_id(),
            self.service.as_deref(),
            &request,
        )
        .context("Failed to determine the run id")?;

        self.run_id = Some(election.run_id.clone());
        Ok(election)
    }

    /// Run id of this session, electing lazily when no launch was signalled
    pub fn run_id(&mut self) -> Result<RunId> {
        if let Some(run_id) = &self.run_id {
            return Ok(run_id.clone());
        }
        Ok(self.launch_started(Utc::now())?.run_id)
    }

    /// Apply one lifecycle event
    pub fn apply(&mut self, event: &LifecycleEvent) -> Result<Progress> {
        if let LifecycleEvent::SuiteFinished { worker } = event {
            return match self.suite_finished(*worker)? {
                Some(teardown) => Ok(Progress::TornDown(Box::new(teardown))),
                None => Ok(Progress::Waiting {
                    finished: self.finished_workers()?,
                    expected: self.expected_workers(),
                }),
            };
        }

        let run_id = self.run_id()?;
        let tree = self.documents.tree();
        let mut engine = TreeMergeEngine::new(&tree, self.service.as_deref(), &run_id)
            .with_current_entry(self.current_entry.take());

        let result = engine.apply(event, Utc::now());
        self.current_entry = engine.current_entry().map(String::from);

        let outcome = result.with_context(|| format!("Failed to apply {}", event.name()))?;
        Ok(Progress::Merged(outcome))
    }

    /// Record that `worker` finished its suite. The worker whose completion
    /// brings the finished set to the expected count tears the run down.
    pub fn suite_finished(&mut self, worker: u32) -> Result<Option<Teardown>> {
        let expected = self.expected_workers() as usize;
        let run_id = self.run_id()?;
        let tree = self.documents.tree();
        let engine = TreeMergeEngine::new(&tree, self.service.as_deref(), &run_id);

        let (finished, last) = engine
            .update(|doc| {
                let before = doc.finished_workers.len();
                let inserted = doc.finished_workers.insert(worker);
                let after = doc.finished_workers.len();
                Ok((after, inserted && before < expected && after >= expected))
            })
            .context("Failed to record suite completion")?;

        if !last {
            info!(
                "Worker {} finished ({}/{}), waiting for the others",
                worker, finished, expected
            );
            return Ok(None);
        }

        info!("Worker {} finished last, closing run {}", worker, run_id);
        self.teardown(&run_id, finished).map(Some)
    }

    fn teardown(&mut self, run_id: &RunId, finished: usize) -> Result<Teardown> {
        let timer = Timer::start("teardown");
        let document = self.snapshot()?;

        let launch_info = match &self.service {
            Some(service) if !run_id.is_local() => {
                teardown::finish_remote(&**service, run_id.as_str(), &document.tree, Utc::now())
            }
            _ => None,
        };

        let link = launch_info
            .as_ref()
            .and_then(|info| info.get("uri"))
            .and_then(|uri| uri.as_str())
            .map(String::from);

        if let (Some(path), Some(info)) = (&self.config.launch_info_file, &launch_info) {
            if let Err(e) = write_launch_info(path, info) {
                warn!("{:#}", e);
            }
        }

        let record = RunRecord::new(run_id.as_str(), &document.tree)
            .with_link(link)
            .with_finished_workers(finished);

        let removed = self.documents.remove_all();
        self.run_id = None;
        self.current_entry = None;
        timer.stop();

        Ok(Teardown {
            record,
            launch_info,
            removed,
        })
    }

    /// Locked snapshot of the shared tree document
    pub fn snapshot(&self) -> Result<TreeDocument> {
        let tree = self.documents.tree();
        let run_id = self.run_id.clone().unwrap_or_else(RunId::local);
        TreeMergeEngine::new(&tree, None, &run_id)
            .snapshot()
            .context("Failed to read the shared tree")
    }

    fn finished_workers(&self) -> Result<usize> {
        Ok(self.snapshot()?.finished_workers.len())
    }

    /// Aggregate the current tree without closing the run
    pub fn summary(&self) -> Result<RunRecord> {
        let run_id = match &self.run_id {
            Some(run_id) => Some(run_id.clone()),
            None => current_run_id(&self.documents.run_id())
                .context("Failed to read the run id")?,
        };
        let document = self.snapshot()?;

        Ok(RunRecord::new(
            run_id.as_ref().map(RunId::as_str).unwrap_or(RunId::LOCAL),
            &document.tree,
        )
        .with_finished_workers(document.finished_workers.len()))
    }
}
