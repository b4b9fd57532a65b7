use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Queued,
    Initializing,
    Planning,
    Recon,
    Crawling,
    Testing,
    Auditing,
    Attacking,
    Reporting,
    Completed,
    Failed,
    Stopped,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Initializing => "initializing",
            Self::Planning => "planning",
            Self::Recon => "recon",
            Self::Crawling => "crawling",
            Self::Testing => "testing",
            Self::Auditing => "auditing",
            Self::Attacking => "attacking",
            Self::Reporting => "reporting",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    /// Phases a continuation may start from.
    pub fn is_continuable(&self) -> bool {
        matches!(self, Self::Completed | Self::Stopped)
    }

    /// Position in the forward order. Sibling phases (recon/crawling,
    /// testing/auditing) share a stage.
    fn stage(&self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Initializing => 1,
            Self::Planning => 2,
            Self::Recon | Self::Crawling => 3,
            Self::Testing | Self::Auditing => 4,
            Self::Attacking => 5,
            Self::Reporting => 6,
            Self::Completed | Self::Failed | Self::Stopped => 7,
        }
    }

    /// Whether the loop may move from `self` to `next` on its own. Terminal
    /// phases are reachable from any live phase; otherwise the state machine
    /// only moves forward. The continuation re-entry into `testing` does not
    /// go through here.
    pub fn can_advance_to(&self, next: Phase) -> bool {
        if self.is_terminal() || *self == next {
            return false;
        }
        next.is_terminal() || next.stage() >= self.stage()
    }

    pub fn display_name(&self) -> &'static str {
        PHASES
            .iter()
            .find(|p| p.name == *self)
            .map(|p| p.display_name)
            .unwrap_or("Unknown")
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct PhaseDefinition {
    pub name: Phase,
    pub display_name: &'static str,
    pub description: &'static str,
}

pub static PHASES: &[PhaseDefinition] = &[
    PhaseDefinition {
        name: Phase::Queued,
        display_name: "Queued",
        description: "Run created, waiting for start",
    },
    PhaseDefinition {
        name: Phase::Initializing,
        display_name: "Initializing",
        description: "Checking the tool bridge and preparing the conversation",
    },
    PhaseDefinition {
        name: Phase::Planning,
        display_name: "Planning",
        description: "Decision provider drafts the test plan",
    },
    PhaseDefinition {
        name: Phase::Recon,
        display_name: "Reconnaissance",
        description: "Proxy history review and surface discovery",
    },
    PhaseDefinition {
        name: Phase::Crawling,
        display_name: "Crawling",
        description: "Spidering the application to map endpoints",
    },
    PhaseDefinition {
        name: Phase::Testing,
        display_name: "Testing",
        description: "Targeted requests against discovered endpoints",
    },
    PhaseDefinition {
        name: Phase::Auditing,
        display_name: "Auditing",
        description: "Automated scanners over the mapped surface",
    },
    PhaseDefinition {
        name: Phase::Attacking,
        display_name: "Attacking",
        description: "Exploitation attempts and cross-account checks",
    },
    PhaseDefinition {
        name: Phase::Reporting,
        display_name: "Reporting",
        description: "Summarizing findings",
    },
    PhaseDefinition {
        name: Phase::Completed,
        display_name: "Completed",
        description: "Run finished",
    },
    PhaseDefinition {
        name: Phase::Failed,
        display_name: "Failed",
        description: "Run aborted by a fatal error",
    },
    PhaseDefinition {
        name: Phase::Stopped,
        display_name: "Stopped",
        description: "Run cancelled by the operator",
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions_allowed() {
        assert!(Phase::Queued.can_advance_to(Phase::Initializing));
        assert!(Phase::Planning.can_advance_to(Phase::Recon));
        assert!(Phase::Recon.can_advance_to(Phase::Crawling));
        assert!(Phase::Crawling.can_advance_to(Phase::Recon));
        assert!(Phase::Testing.can_advance_to(Phase::Attacking));
        assert!(Phase::Initializing.can_advance_to(Phase::Failed));
    }

    #[test]
    fn test_backward_transitions_rejected() {
        assert!(!Phase::Attacking.can_advance_to(Phase::Recon));
        assert!(!Phase::Testing.can_advance_to(Phase::Planning));
        assert!(!Phase::Completed.can_advance_to(Phase::Testing));
        assert!(!Phase::Stopped.can_advance_to(Phase::Stopped));
    }

    #[test]
    fn test_terminal_and_continuable() {
        assert!(Phase::Failed.is_terminal());
        assert!(!Phase::Failed.is_continuable());
        assert!(Phase::Stopped.is_continuable());
        assert!(!Phase::Reporting.is_terminal());
    }

    #[test]
    fn test_every_phase_has_a_definition() {
        for phase in [
            Phase::Queued, Phase::Initializing, Phase::Planning, Phase::Recon,
            Phase::Crawling, Phase::Testing, Phase::Auditing, Phase::Attacking,
            Phase::Reporting, Phase::Completed, Phase::Failed, Phase::Stopped,
        ] {
            assert_ne!(phase.display_name(), "Unknown", "{} has no definition", phase);
        }
    }
}
