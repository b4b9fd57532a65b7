use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use super::phase::Phase;

/// Mutable run state, owned by one agent.
#[derive(Debug, Clone)]
pub struct RunState {
    pub phase: Phase,
    pub is_running: bool,
    pub started: bool,
    pub iteration_count: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub completion: Option<CompletionReason>,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Queued,
            is_running: false,
            started: false,
            iteration_count: 0,
            started_at: None,
            finished_at: None,
            last_error: None,
            completion: None,
        }
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a run left its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompletionReason {
    /// The decision provider signalled completion.
    Provider,
    /// `maxIterations` was reached.
    IterationCap,
    Stopped,
}

/// Returned by `start()` / `continue_scan()` when the run did not fail.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub phase: Phase,
    pub reason: CompletionReason,
    pub iterations: u32,
    pub findings: usize,
}

/// Point-in-time view of one agent for observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSnapshot {
    pub phase: Phase,
    pub is_running: bool,
    pub is_paused: bool,
    pub logs_count: u64,
    pub iteration_count: u32,
    pub findings_count: usize,
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion: Option<CompletionReason>,
}
