use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;
use crate::agent::{AgentSnapshot, OrchestratorAgent, Phase};
use crate::errors::PilotError;
use crate::models::{LogEntry, Vulnerability};
use crate::pool::{AgentPool, PoolSnapshot};

/// Either kind of run behind one scan id.
#[derive(Clone)]
pub enum RunHandle {
    Agent(Arc<OrchestratorAgent>),
    Pool(Arc<AgentPool>),
}

/// State snapshot of whichever run kind is behind a handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunSnapshot {
    Pool(PoolSnapshot),
    Agent(AgentSnapshot),
}

impl RunSnapshot {
    pub fn phase(&self) -> Phase {
        match self {
            RunSnapshot::Agent(s) => s.phase,
            RunSnapshot::Pool(s) => s.phase,
        }
    }

    pub fn is_running(&self) -> bool {
        match self {
            RunSnapshot::Agent(s) => s.is_running,
            RunSnapshot::Pool(s) => s.is_running,
        }
    }

    pub fn is_paused(&self) -> bool {
        match self {
            RunSnapshot::Agent(s) => s.is_paused,
            RunSnapshot::Pool(s) => s.is_paused,
        }
    }

    pub fn logs_count(&self) -> u64 {
        match self {
            RunSnapshot::Agent(s) => s.logs_count,
            RunSnapshot::Pool(s) => s.logs_count,
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        match self {
            RunSnapshot::Agent(s) => s.last_error.as_deref(),
            RunSnapshot::Pool(s) => s.last_error.as_deref(),
        }
    }

    /// Label for display: the phase, or "paused" while suspended.
    pub fn status_label(&self) -> String {
        if self.is_paused() {
            "paused".to_string()
        } else {
            self.phase().to_string()
        }
    }
}

impl RunHandle {
    pub fn is_pool(&self) -> bool {
        matches!(self, RunHandle::Pool(_))
    }

    pub fn scan_id(&self) -> &str {
        match self {
            RunHandle::Agent(a) => a.scan_id(),
            RunHandle::Pool(p) => p.scan_id(),
        }
    }

    pub fn target(&self) -> &str {
        match self {
            RunHandle::Agent(a) => &a.config().target,
            RunHandle::Pool(p) => &p.config().target,
        }
    }

    pub fn phase(&self) -> Phase {
        self.state().phase()
    }

    pub fn pause(&self) -> bool {
        match self {
            RunHandle::Agent(a) => a.pause(),
            RunHandle::Pool(p) => p.pause(),
        }
    }

    pub fn resume(&self) -> bool {
        match self {
            RunHandle::Agent(a) => a.resume(),
            RunHandle::Pool(p) => p.resume(),
        }
    }

    /// Stop the run and wait until its loop (or every worker loop) exited.
    pub async fn stop(&self) -> RunSnapshot {
        match self {
            RunHandle::Agent(a) => {
                a.stop();
                a.wait_idle().await;
                RunSnapshot::Agent(a.state())
            }
            RunHandle::Pool(p) => RunSnapshot::Pool(p.stop().await),
        }
    }

    pub fn state(&self) -> RunSnapshot {
        match self {
            RunHandle::Agent(a) => RunSnapshot::Agent(a.state()),
            RunHandle::Pool(p) => RunSnapshot::Pool(p.state()),
        }
    }

    pub fn get_logs(&self, since: u64) -> Vec<String> {
        match self {
            RunHandle::Agent(a) => a.get_logs(since),
            RunHandle::Pool(p) => p.get_logs(since),
        }
    }

    pub fn log_entries(&self, since: u64) -> Vec<LogEntry> {
        match self {
            RunHandle::Agent(a) => a.log_entries(since),
            RunHandle::Pool(p) => p.log_entries(since),
        }
    }

    pub fn findings(&self) -> Vec<Vulnerability> {
        match self {
            RunHandle::Agent(a) => a.findings(),
            RunHandle::Pool(p) => p.findings(),
        }
    }

    pub fn endpoints(&self) -> Vec<String> {
        match self {
            RunHandle::Agent(a) => a.endpoints(),
            RunHandle::Pool(p) => p.endpoints(),
        }
    }

    /// Queue an instruction. Returns how many agents accepted it.
    pub fn handle_user_command(&self, text: &str) -> Result<usize, PilotError> {
        match self {
            RunHandle::Agent(a) => a.handle_user_command(text).map(|()| 1),
            RunHandle::Pool(p) => p.handle_user_command(text),
        }
    }
}

struct Registration {
    handle: RunHandle,
    generation: u64,
}

/// Process-wide map of live runs. At most one run per scan id.
///
/// Every registration gets a fresh generation number; an initial run and
/// its continuation share one agent but never one generation.
#[derive(Default)]
pub struct RunRegistry {
    runs: DashMap<String, Registration>,
    next_generation: AtomicU64,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the generation of the new registration.
    pub fn register(&self, scan_id: &str, handle: RunHandle) -> Result<u64, PilotError> {
        match self.runs.entry(scan_id.to_string()) {
            Entry::Occupied(_) => Err(PilotError::AlreadyRunning(scan_id.to_string())),
            Entry::Vacant(slot) => {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
                slot.insert(Registration { handle, generation });
                debug!(scan_id, generation, "Run registered");
                Ok(generation)
            }
        }
    }

    pub fn unregister(&self, scan_id: &str) -> Option<RunHandle> {
        self.runs.remove(scan_id).map(|(_, registration)| registration.handle)
    }

    /// Remove the entry only if it is still the registration `generation`.
    pub fn unregister_if(&self, scan_id: &str, generation: u64) -> bool {
        self.runs
            .remove_if(scan_id, |_, current| current.generation == generation)
            .is_some()
    }

    pub fn lookup(&self, scan_id: &str) -> Option<RunHandle> {
        self.runs.get(scan_id).map(|entry| entry.handle.clone())
    }

    /// Handle and generation of the live run.
    pub fn lookup_registered(&self, scan_id: &str) -> Option<(RunHandle, u64)> {
        self.runs
            .get(scan_id)
            .map(|entry| (entry.handle.clone(), entry.generation))
    }

    pub fn contains(&self, scan_id: &str) -> bool {
        self.runs.contains_key(scan_id)
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.runs.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}
