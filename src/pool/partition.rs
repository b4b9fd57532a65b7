use serde::Serialize;
use super::worker::WorkerRole;

/// Worker count per role for a requested parallelism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoleCounts {
    pub crawler: u32,
    pub scanner: u32,
    pub fuzzer: u32,
    pub analyzer: u32,
}

impl RoleCounts {
    /// `max(1, floor(P * pct))` per role. The total may differ from `P`.
    pub fn for_parallelism(parallelism: u32) -> Self {
        let share = |role: WorkerRole| (parallelism.saturating_mul(role.share_percent()) / 100).max(1);
        Self {
            crawler: share(WorkerRole::Crawler),
            scanner: share(WorkerRole::Scanner),
            fuzzer: share(WorkerRole::Fuzzer),
            analyzer: share(WorkerRole::Analyzer),
        }
    }

    pub fn get(&self, role: WorkerRole) -> u32 {
        match role {
            WorkerRole::Crawler => self.crawler,
            WorkerRole::Scanner => self.scanner,
            WorkerRole::Fuzzer => self.fuzzer,
            WorkerRole::Analyzer => self.analyzer,
        }
    }

    pub fn total(&self) -> u32 {
        self.crawler + self.scanner + self.fuzzer + self.analyzer
    }
}
