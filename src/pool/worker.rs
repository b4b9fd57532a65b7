use std::sync::Arc;
use serde::{Deserialize, Serialize};
use crate::agent::tools::{
    ACTIVE_SCAN, CRAWL_TARGET, FINGERPRINT, HTTP_HISTORY, IDOR_COMPARE, RUN_FFUF, RUN_NUCLEI, SEND_HTTP_REQUEST,
};
use crate::agent::{AgentRole, OrchestratorAgent, Phase};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerRole {
    Crawler,
    Scanner,
    Fuzzer,
    Analyzer,
}

impl WorkerRole {
    pub const ALL: [WorkerRole; 4] = [Self::Crawler, Self::Scanner, Self::Fuzzer, Self::Analyzer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Crawler => "crawler",
            Self::Scanner => "scanner",
            Self::Fuzzer => "fuzzer",
            Self::Analyzer => "analyzer",
        }
    }

    /// Percentage of the requested parallelism given to this role.
    pub fn share_percent(&self) -> u32 {
        match self {
            Self::Crawler => 20,
            Self::Scanner => 40,
            Self::Fuzzer => 25,
            Self::Analyzer => 15,
        }
    }

    fn focus(&self) -> &'static str {
        match self {
            Self::Crawler => "Your role is CRAWLER: map the application. Enumerate pages, forms, API routes \
and parameters; leave exploitation to the other workers.",
            Self::Scanner => "Your role is SCANNER: probe discovered endpoints for injection, XSS, SSRF and \
misconfiguration with targeted requests and automated scans.",
            Self::Fuzzer => "Your role is FUZZER: mutate parameters, headers and paths to find hidden \
content and input-handling bugs.",
            Self::Analyzer => "Your role is ANALYZER: review proxy history for access-control, session and \
business-logic flaws, and confirm suspicious behaviour.",
        }
    }

    fn tools(&self) -> Vec<&'static str> {
        match self {
            Self::Crawler => vec![HTTP_HISTORY, FINGERPRINT, CRAWL_TARGET, RUN_FFUF],
            Self::Scanner => vec![HTTP_HISTORY, SEND_HTTP_REQUEST, ACTIVE_SCAN, RUN_NUCLEI],
            Self::Fuzzer => vec![HTTP_HISTORY, SEND_HTTP_REQUEST, RUN_FFUF],
            Self::Analyzer => vec![HTTP_HISTORY, SEND_HTTP_REQUEST, IDOR_COMPARE],
        }
    }

    pub fn agent_role(&self) -> AgentRole {
        AgentRole {
            name: self.as_str().to_string(),
            focus: self.focus().to_string(),
            tools: self.tools(),
        }
    }
}

impl std::fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of one worker as the pool reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Idle,
    Running,
    Paused,
    Completed,
    Failed,
    Stopped,
}

impl WorkerStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }
}

/// One role-specialized agent owned by a pool.
pub struct PoolWorker {
    pub id: String,
    pub role: WorkerRole,
    pub agent: Arc<OrchestratorAgent>,
}

impl PoolWorker {
    pub fn status(&self) -> WorkerStatus {
        let snapshot = self.agent.state();
        match snapshot.phase {
            Phase::Completed => WorkerStatus::Completed,
            Phase::Failed => WorkerStatus::Failed,
            Phase::Stopped => WorkerStatus::Stopped,
            Phase::Queued => WorkerStatus::Idle,
            _ if snapshot.is_paused => WorkerStatus::Paused,
            _ => WorkerStatus::Running,
        }
    }
}
