//! Several role-specialized agents presented as one logical run.

pub mod partition;
pub mod worker;

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{error, info, warn};
use crate::agent::{DecisionProvider, OrchestratorAgent, Phase};
use crate::bridge::ToolBridge;
use crate::config::EngineSettings;
use crate::engine::{FindingLedger, LogStream, RateLimiter};
use crate::errors::PilotError;
use crate::models::{LogEntry, LogKind, RunConfig, Vulnerability};

pub use partition::RoleCounts;
pub use worker::{PoolWorker, WorkerRole, WorkerStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerSnapshot {
    pub id: String,
    pub role: WorkerRole,
    pub status: WorkerStatus,
    pub phase: Phase,
    pub iteration_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    pub findings_count: usize,
    pub requests_issued: u64,
    pub iterations: u32,
    pub workers_running: usize,
    pub workers_completed: usize,
    pub workers_failed: usize,
    pub workers_stopped: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSnapshot {
    pub is_running: bool,
    pub is_paused: bool,
    pub phase: Phase,
    pub logs_count: u64,
    pub worker_count: usize,
    pub workers: Vec<WorkerSnapshot>,
    pub stats: PoolStats,
    pub last_error: Option<String>,
}

/// Returned by `AgentPool::start` when at least one worker did not fail.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolOutcome {
    pub phase: Phase,
    pub stats: PoolStats,
}

struct PoolState {
    phase: Phase,
    started: bool,
    is_running: bool,
    last_error: Option<String>,
}

pub struct AgentPool {
    scan_id: String,
    config: RunConfig,
    bridge: Arc<dyn ToolBridge>,
    workers: Vec<PoolWorker>,
    stream: Arc<LogStream>,
    ledger: Arc<FindingLedger>,
    limiter: Arc<RateLimiter>,
    state: RwLock<PoolState>,
    done: watch::Sender<bool>,
}

impl AgentPool {
    /// Partition `config.parallel_agents` across roles and build one agent
    /// per worker. All workers share the rate limiter, log stream and
    /// finding ledger.
    pub fn new(
        scan_id: impl Into<String>,
        config: RunConfig,
        provider: Arc<dyn DecisionProvider>,
        bridge: Arc<dyn ToolBridge>,
        settings: EngineSettings,
    ) -> Result<Self, PilotError> {
        let scan_id = scan_id.into();
        let config = config.validate()?;
        let limiter = Arc::new(RateLimiter::new(config.rate_limit)?);
        let stream = Arc::new(LogStream::new());
        let ledger = Arc::new(FindingLedger::new());
        let counts = RoleCounts::for_parallelism(config.parallel_agents);

        let mut workers = Vec::with_capacity(counts.total() as usize);
        for role in WorkerRole::ALL {
            for n in 1..=counts.get(role) {
                let id = format!("{}-{}", role, n);
                let agent = OrchestratorAgent::builder(scan_id.clone(), config.clone(), provider.clone(), bridge.clone())
                    .settings(settings.clone())
                    .rate_limiter(limiter.clone())
                    .log_stream(stream.clone(), Some(id.clone()))
                    .ledger(ledger.clone())
                    .role(role.agent_role())
                    .build()?;
                workers.push(PoolWorker { id, role, agent: Arc::new(agent) });
            }
        }
        info!(scan_id = %scan_id, workers = workers.len(), ?counts, "Agent pool created");

        let (done, _) = watch::channel(false);
        Ok(Self {
            scan_id,
            config,
            bridge,
            workers,
            stream,
            ledger,
            limiter,
            state: RwLock::new(PoolState {
                phase: Phase::Queued,
                started: false,
                is_running: false,
                last_error: None,
            }),
            done,
        })
    }

    pub fn scan_id(&self) -> &str {
        &self.scan_id
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn workers(&self) -> &[PoolWorker] {
        &self.workers
    }

    fn read_state(&self) -> RwLockReadGuard<'_, PoolState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, PoolState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Run every worker concurrently until all are terminal. Fails only
    /// when every worker failed.
    pub async fn start(&self) -> Result<PoolOutcome, PilotError> {
        {
            let mut state = self.write_state();
            if state.started {
                return Err(PilotError::AlreadyRunning(self.scan_id.clone()));
            }
            state.started = true;
            if state.phase == Phase::Stopped {
                drop(state);
                self.done.send_replace(true);
                return Ok(self.outcome());
            }
            state.is_running = true;
            state.phase = Phase::Testing;
        }
        let result = self.run_workers().await;
        self.done.send_replace(true);
        result
    }

    async fn run_workers(&self) -> Result<PoolOutcome, PilotError> {
        if !self.bridge.is_available().await {
            let err = PilotError::ToolBridgeUnavailable(format!("tool bridge unreachable for {}", self.config.target));
            self.stream.append(LogKind::Error, "Tool bridge is not reachable; cannot start the pool", None);
            let mut state = self.write_state();
            state.phase = Phase::Failed;
            state.is_running = false;
            state.last_error = Some(err.to_string());
            return Err(err);
        }

        let roster = WorkerRole::ALL
            .iter()
            .map(|role| format!("{}x{}", self.workers.iter().filter(|w| w.role == *role).count(), role))
            .collect::<Vec<_>>()
            .join(", ");
        self.stream.append(LogKind::Info, format!(
            "Pool starting {} workers against {} ({})", self.workers.len(), self.config.target, roster
        ), None);

        let handles: Vec<_> = self
            .workers
            .iter()
            .map(|worker| {
                let agent = worker.agent.clone();
                tokio::spawn(async move { agent.start().await })
            })
            .collect();
        let results = join_all(handles).await;

        let mut last_error = None;
        let mut failed = 0;
        for (worker, result) in self.workers.iter().zip(results) {
            match result {
                Ok(Ok(outcome)) => {
                    info!(scan_id = %self.scan_id, worker = %worker.id, phase = %outcome.phase, "Worker finished");
                }
                Ok(Err(e)) => {
                    failed += 1;
                    warn!(scan_id = %self.scan_id, worker = %worker.id, error = %e, "Worker failed");
                    last_error = Some(format!("{}: {}", worker.id, e));
                }
                Err(join_err) => {
                    failed += 1;
                    error!(scan_id = %self.scan_id, worker = %worker.id, error = %join_err, "Worker task panicked");
                    worker.agent.stop();
                    last_error = Some(format!("{}: task aborted: {}", worker.id, join_err));
                }
            }
        }

        let all_failed = failed == self.workers.len();
        let stopped = self.workers.iter().any(|w| w.status() == WorkerStatus::Stopped);
        {
            let mut state = self.write_state();
            state.is_running = false;
            state.last_error = last_error;
            state.phase = if all_failed {
                Phase::Failed
            } else if stopped {
                Phase::Stopped
            } else {
                Phase::Completed
            };
        }

        let outcome = self.outcome();
        let stats = &outcome.stats;
        self.stream.append(
            if all_failed { LogKind::Error } else { LogKind::Info },
            format!(
                "Pool {}: {} completed, {} failed, {} stopped, {} findings",
                outcome.phase, stats.workers_completed, stats.workers_failed, stats.workers_stopped, stats.findings_count
            ),
            None,
        );
        if all_failed {
            return Err(PilotError::AllWorkersFailed(self.workers.len()));
        }
        Ok(outcome)
    }

    fn outcome(&self) -> PoolOutcome {
        let snapshot = self.state();
        PoolOutcome { phase: snapshot.phase, stats: snapshot.stats }
    }

    /// Cascade a pause request. False when nothing was left to pause.
    pub fn pause(&self) -> bool {
        if self.read_state().phase.is_terminal() {
            return false;
        }
        self.workers.iter().fold(false, |any, w| w.agent.pause() || any)
    }

    pub fn resume(&self) -> bool {
        self.workers.iter().fold(false, |any, w| w.agent.resume() || any)
    }

    /// True once every non-terminal worker has suspended.
    pub fn is_paused(&self) -> bool {
        let mut live = self.workers.iter().map(|w| w.status()).filter(|s| !s.is_terminal()).peekable();
        live.peek().is_some() && live.all(|s| s == WorkerStatus::Paused)
    }

    /// Stop every worker and wait until all of them are terminal.
    pub async fn stop(&self) -> PoolSnapshot {
        for worker in &self.workers {
            worker.agent.stop();
        }
        let started = {
            let mut state = self.write_state();
            if !state.started && !state.phase.is_terminal() {
                state.phase = Phase::Stopped;
            }
            state.started
        };
        if started {
            let mut done = self.done.subscribe();
            let _ = done.wait_for(|finished| *finished).await;
        }
        self.state()
    }

    /// Broadcast an operator instruction to every live worker. Returns the
    /// number of workers that accepted it.
    pub fn handle_user_command(&self, text: &str) -> Result<usize, PilotError> {
        let mut accepted = 0;
        let mut last_err = None;
        for worker in &self.workers {
            match worker.agent.handle_user_command(text) {
                Ok(()) => accepted += 1,
                Err(e) => last_err = Some(e),
            }
        }
        match (accepted, last_err) {
            (0, Some(e)) => Err(e),
            (0, None) => Err(PilotError::NotRunning(self.scan_id.clone())),
            (n, _) => Ok(n),
        }
    }

    pub fn state(&self) -> PoolSnapshot {
        let workers: Vec<WorkerSnapshot> = self
            .workers
            .iter()
            .map(|w| {
                let snapshot = w.agent.state();
                WorkerSnapshot {
                    id: w.id.clone(),
                    role: w.role,
                    status: w.status(),
                    phase: snapshot.phase,
                    iteration_count: snapshot.iteration_count,
                }
            })
            .collect();

        let count = |status: WorkerStatus| workers.iter().filter(|w| w.status == status).count();
        let stats = PoolStats {
            findings_count: self.ledger.len(),
            requests_issued: self.limiter.requests_issued(),
            iterations: workers.iter().map(|w| w.iteration_count).sum(),
            workers_running: count(WorkerStatus::Running) + count(WorkerStatus::Paused),
            workers_completed: count(WorkerStatus::Completed),
            workers_failed: count(WorkerStatus::Failed),
            workers_stopped: count(WorkerStatus::Stopped),
        };

        let state = self.read_state();
        PoolSnapshot {
            is_running: state.is_running,
            is_paused: state.is_running && self.is_paused(),
            phase: state.phase,
            logs_count: self.stream.len(),
            worker_count: workers.len(),
            workers,
            stats,
            last_error: state.last_error.clone(),
        }
    }

    pub fn get_logs(&self, since: u64) -> Vec<String> {
        self.stream.lines_since(since)
    }

    pub fn log_entries(&self, since: u64) -> Vec<LogEntry> {
        self.stream.since(since)
    }

    pub fn findings(&self) -> Vec<Vulnerability> {
        self.ledger.snapshot()
    }

    pub fn endpoints(&self) -> Vec<String> {
        let mut all: Vec<String> = Vec::new();
        for worker in &self.workers {
            for endpoint in worker.agent.endpoints() {
                if !all.contains(&endpoint) {
                    all.push(endpoint);
                }
            }
        }
        all
    }
}
