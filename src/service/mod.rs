//! Calling layer: routes operator requests to the live run of a scan id,
//! keeps finished runs around for inspection and persists their records.

pub mod registry;
pub mod store;

use std::future::Future;
use std::sync::Arc;
use chrono::Utc;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use crate::agent::{ContinueRequest, DecisionProvider, OrchestratorAgent};
use crate::bridge::ToolBridge;
use crate::config::EngineSettings;
use crate::errors::PilotError;
use crate::models::{LogEntry, RunConfig, Vulnerability};
use crate::pool::AgentPool;

pub use registry::{RunHandle, RunRegistry, RunSnapshot};
pub use store::{JsonDirStore, RunRecord, ScanStore};

/// External collaborators a run is built with.
#[derive(Clone)]
pub struct Collaborators {
    pub provider: Arc<dyn DecisionProvider>,
    pub bridge: Arc<dyn ToolBridge>,
}

/// How `send_command` dealt with an operator message.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandReply {
    /// Queued into the live run; the count is the number of agents that
    /// accepted it (always 1 for a single agent).
    Queued(usize),
    /// The run had ended; answered by a one-shot consultation.
    Answered(String),
}

/// A run the service has launched, live or finished.
struct KnownRun {
    handle: RunHandle,
    collaborators: Collaborators,
}

pub struct ScanService {
    registry: Arc<RunRegistry>,
    known: DashMap<String, KnownRun>,
    tasks: DashMap<String, JoinHandle<RunRecord>>,
    store: Option<Arc<dyn ScanStore>>,
    settings: EngineSettings,
}

impl ScanService {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            registry: Arc::new(RunRegistry::new()),
            known: DashMap::new(),
            tasks: DashMap::new(),
            store: None,
            settings,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ScanStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn registry(&self) -> &RunRegistry {
        &self.registry
    }

    /// Build a single agent (`parallelAgents == 1`) or a pool, register it
    /// under `scan_id` and start it in the background.
    pub fn launch(
        &self,
        scan_id: &str,
        config: RunConfig,
        collaborators: Collaborators,
    ) -> Result<RunHandle, PilotError> {
        if self.registry.contains(scan_id) {
            return Err(PilotError::AlreadyRunning(scan_id.to_string()));
        }
        let handle = if config.is_pool() {
            RunHandle::Pool(Arc::new(AgentPool::new(
                scan_id,
                config,
                collaborators.provider.clone(),
                collaborators.bridge.clone(),
                self.settings.clone(),
            )?))
        } else {
            RunHandle::Agent(Arc::new(
                OrchestratorAgent::builder(scan_id, config, collaborators.provider.clone(), collaborators.bridge.clone())
                    .settings(self.settings.clone())
                    .build()?,
            ))
        };
        let generation = self.registry.register(scan_id, handle.clone())?;
        self.known.insert(scan_id.to_string(), KnownRun { handle: handle.clone(), collaborators });

        info!(scan_id, target = %handle.target(), pool = handle.is_pool(), "Launching scan");
        let run = handle.clone();
        let future = async move {
            match &run {
                RunHandle::Agent(agent) => agent.start().await.map(|_| ()),
                RunHandle::Pool(pool) => pool.start().await.map(|_| ()),
            }
        };
        self.spawn(scan_id, handle.clone(), generation, future);
        Ok(handle)
    }

    /// Run a continuation over a finished single-agent scan.
    pub fn continue_scan(&self, scan_id: &str, mut request: ContinueRequest) -> Result<RunHandle, PilotError> {
        let handle = self.known_handle(scan_id)?;
        let agent = match &handle {
            RunHandle::Agent(agent) => agent.clone(),
            RunHandle::Pool(_) => {
                return Err(PilotError::Precondition(format!(
                    "scan {} ran as an agent pool; only single-agent scans can be continued",
                    scan_id
                )))
            }
        };
        if request.existing_findings.is_empty() {
            request.existing_findings = agent.findings();
        }
        if request.existing_endpoints.is_empty() {
            request.existing_endpoints = agent.endpoints();
        }
        let iterations = request.iterations;
        // Installed before the run becomes visible, so a stop issued right
        // after this returns reaches the continuation's own control.
        let prepared = agent.prepare_continuation(request)?;
        let generation = match self.registry.register(scan_id, handle.clone()) {
            Ok(generation) => generation,
            Err(e) => {
                agent.abandon_continuation(prepared);
                return Err(e);
            }
        };

        info!(scan_id, iterations, generation, "Continuing scan");
        let future = async move { agent.run_prepared(prepared).await.map(|_| ()) };
        self.spawn(scan_id, handle.clone(), generation, future);
        Ok(handle)
    }

    fn spawn<F>(&self, scan_id: &str, handle: RunHandle, generation: u64, run: F)
    where
        F: Future<Output = Result<(), PilotError>> + Send + 'static,
    {
        let registry = self.registry.clone();
        let store = self.store.clone();
        let id = scan_id.to_string();
        let task = tokio::spawn(async move {
            let result = run.await;
            let snapshot = handle.state();
            let (error, error_type) = match result {
                Ok(()) => (snapshot.last_error().map(str::to_string), None),
                Err(e) => {
                    warn!(scan_id = %id, error = %e, "Scan failed");
                    (Some(e.to_string()), Some(e.classify().error_type.to_string()))
                }
            };
            registry.unregister_if(&id, generation);

            let record = RunRecord {
                scan_id: id.clone(),
                target: handle.target().to_string(),
                status: snapshot.phase(),
                error,
                error_type,
                iterations: iterations_of(&snapshot),
                findings: handle.findings(),
                endpoints: handle.endpoints(),
                logs: handle.log_entries(0),
                finished_at: Utc::now(),
            };
            if let Some(store) = store {
                if let Err(e) = store.save(&record).await {
                    warn!(scan_id = %id, error = %e, "Failed to persist run record");
                }
            }
            info!(scan_id = %id, status = %record.status, findings = record.findings.len(), "Scan finished");
            record
        });
        self.tasks.insert(scan_id.to_string(), task);
    }

    /// Wait for the background task of the most recent launch or
    /// continuation of `scan_id`.
    pub async fn wait(&self, scan_id: &str) -> Result<RunRecord, PilotError> {
        let (_, task) = self
            .tasks
            .remove(scan_id)
            .ok_or_else(|| PilotError::NotFound(format!("no pending run for scan {}", scan_id)))?;
        task.await
            .map_err(|e| PilotError::Internal(format!("scan task for {} aborted: {}", scan_id, e)))
    }

    fn live(&self, scan_id: &str) -> Option<RunHandle> {
        self.registry.lookup(scan_id)
    }

    fn known_handle(&self, scan_id: &str) -> Result<RunHandle, PilotError> {
        self.known
            .get(scan_id)
            .map(|run| run.handle.clone())
            .ok_or_else(|| PilotError::NotFound(format!("scan {}", scan_id)))
    }

    fn handle(&self, scan_id: &str) -> Result<RunHandle, PilotError> {
        match self.live(scan_id) {
            Some(handle) => Ok(handle),
            None => self.known_handle(scan_id),
        }
    }

    /// Pausing a finished run is a precondition error.
    pub fn pause(&self, scan_id: &str) -> Result<bool, PilotError> {
        let handle = self.handle(scan_id)?;
        let phase = handle.phase();
        if phase.is_terminal() {
            return Err(PilotError::Precondition(format!("scan {} is {}; nothing to pause", scan_id, phase)));
        }
        Ok(handle.pause())
    }

    pub fn resume(&self, scan_id: &str) -> Result<bool, PilotError> {
        Ok(self.handle(scan_id)?.resume())
    }

    /// Stop the run and wait until it has exited. Stopping a finished run
    /// is a no-op that returns its final state.
    pub async fn stop(&self, scan_id: &str) -> Result<RunSnapshot, PilotError> {
        let (handle, generation) = match self.registry.lookup_registered(scan_id) {
            Some((handle, generation)) => (handle, Some(generation)),
            None => (self.known_handle(scan_id)?, None),
        };
        let snapshot = handle.stop().await;
        if let Some(generation) = generation {
            self.registry.unregister_if(scan_id, generation);
        }
        Ok(snapshot)
    }

    pub fn state(&self, scan_id: &str) -> Result<RunSnapshot, PilotError> {
        Ok(self.handle(scan_id)?.state())
    }

    pub fn logs(&self, scan_id: &str, since: u64) -> Result<Vec<String>, PilotError> {
        Ok(self.handle(scan_id)?.get_logs(since))
    }

    pub fn log_entries(&self, scan_id: &str, since: u64) -> Result<Vec<LogEntry>, PilotError> {
        Ok(self.handle(scan_id)?.log_entries(since))
    }

    pub fn findings(&self, scan_id: &str) -> Result<Vec<Vulnerability>, PilotError> {
        Ok(self.handle(scan_id)?.findings())
    }

    /// Queue `text` into the live run, or answer it directly from the
    /// accumulated findings once the run has ended.
    pub async fn send_command(&self, scan_id: &str, text: &str) -> Result<CommandReply, PilotError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(PilotError::Precondition("empty command".into()));
        }
        if let Some(handle) = self.live(scan_id) {
            match handle.handle_user_command(text) {
                Ok(accepted) => return Ok(CommandReply::Queued(accepted)),
                Err(PilotError::NotRunning(_)) => {}
                Err(e) => return Err(e),
            }
        }

        let (handle, provider) = {
            let run = self
                .known
                .get(scan_id)
                .ok_or_else(|| PilotError::NotFound(format!("scan {}", scan_id)))?;
            (run.handle.clone(), run.collaborators.provider.clone())
        };
        let prompt = consultation_prompt(handle.target(), &handle.findings(), text);
        let answer = provider.consult(&prompt).await?;
        Ok(CommandReply::Answered(answer))
    }

    /// Scan ids with a live run.
    pub fn live_scans(&self) -> Vec<String> {
        self.registry.ids()
    }
}

fn iterations_of(snapshot: &RunSnapshot) -> u32 {
    match snapshot {
        RunSnapshot::Agent(s) => s.iteration_count,
        RunSnapshot::Pool(s) => s.stats.iterations,
    }
}

/// Prompt for answering a question about a finished scan.
pub fn consultation_prompt(target: &str, findings: &[Vulnerability], question: &str) -> String {
    let mut prompt = format!("Target: {}\n\n", target);
    if findings.is_empty() {
        prompt.push_str("The scan recorded no findings.\n");
    } else {
        prompt.push_str(&format!("Findings ({}):\n", findings.len()));
        for finding in findings {
            prompt.push_str(&format!("- {}", finding.headline()));
            if !finding.description.is_empty() {
                prompt.push_str(&format!(": {}", finding.description));
            }
            prompt.push('\n');
        }
    }
    prompt.push_str(&format!("\nOperator question: {}\n", question));
    prompt
}
