use serde::Serialize;
use crate::models::RunConfig;
use super::phase::Phase;

/// One tool the decision provider may select. `phase` is the phase a call
/// to this tool implies.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub phase: Phase,
}

pub const HTTP_HISTORY: &str = "http_history";
pub const FINGERPRINT: &str = "fingerprint";
pub const CRAWL_TARGET: &str = "crawl_target";
pub const SEND_HTTP_REQUEST: &str = "send_http_request";
pub const ACTIVE_SCAN: &str = "active_scan";
pub const RUN_NUCLEI: &str = "run_nuclei";
pub const RUN_FFUF: &str = "run_ffuf";
pub const IDOR_COMPARE: &str = "idor_compare";

static CORE_TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: HTTP_HISTORY,
        description: "Read captured proxy history for the target (args: filter, limit)",
        phase: Phase::Recon,
    },
    ToolSpec {
        name: FINGERPRINT,
        description: "Identify server, framework and technology stack (args: url)",
        phase: Phase::Recon,
    },
    ToolSpec {
        name: CRAWL_TARGET,
        description: "Spider the application from a start URL (args: url, depth)",
        phase: Phase::Crawling,
    },
    ToolSpec {
        name: SEND_HTTP_REQUEST,
        description: "Send one crafted HTTP request (args: method, url, headers, body)",
        phase: Phase::Testing,
    },
    ToolSpec {
        name: ACTIVE_SCAN,
        description: "Run the proxy's active scanner against a URL (args: url)",
        phase: Phase::Auditing,
    },
];

static NUCLEI: ToolSpec = ToolSpec {
    name: RUN_NUCLEI,
    description: "Run nuclei templates against the target (args: url, tags)",
    phase: Phase::Auditing,
};

static FFUF: ToolSpec = ToolSpec {
    name: RUN_FFUF,
    description: "Fuzz paths or parameters with ffuf (args: url, wordlist)",
    phase: Phase::Crawling,
};

static IDOR: ToolSpec = ToolSpec {
    name: IDOR_COMPARE,
    description: "Replay a request as each configured user and diff the responses (args: method, url, body)",
    phase: Phase::Attacking,
};

/// Tools enabled for one run.
#[derive(Debug, Clone)]
pub struct ToolCatalog {
    tools: Vec<ToolSpec>,
}

impl ToolCatalog {
    pub fn for_config(config: &RunConfig) -> Self {
        let mut tools = CORE_TOOLS.to_vec();
        if config.use_nuclei {
            tools.push(NUCLEI);
        }
        if config.use_ffuf {
            tools.push(FFUF);
        }
        if !config.idor_users.is_empty() {
            tools.push(IDOR);
        }
        Self { tools }
    }

    /// Keep only the named tools. Names not enabled for the run are ignored.
    pub fn restrict(mut self, names: &[&str]) -> Self {
        self.tools.retain(|t| names.contains(&t.name));
        self
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn phase_for(&self, name: &str) -> Option<Phase> {
        self.get(name).map(|t| t.phase)
    }

    pub fn specs(&self) -> &[ToolSpec] {
        &self.tools
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.name).collect()
    }
}
