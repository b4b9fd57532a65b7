use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Info,
    Phase,
    Finding,
    Tool,
    Error,
    Human,
    Agent,
    System,
}

impl LogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Phase => "phase",
            Self::Finding => "finding",
            Self::Tool => "tool",
            Self::Error => "error",
            Self::Human => "human",
            Self::Agent => "agent",
            Self::System => "system",
        }
    }

    /// Bracketed tag used in rendered log lines, e.g. `[ERROR]`.
    pub fn tag(&self) -> String {
        format!("[{}]", self.as_str().to_uppercase())
    }
}

impl std::fmt::Display for LogKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a log stream. `index` is assigned by the stream at append
/// time and is dense and zero-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub index: u64,
    pub timestamp: DateTime<Utc>,
    pub kind: LogKind,
    pub message: String,
    /// Worker id when the entry was produced inside an agent pool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl LogEntry {
    pub fn render(&self) -> String {
        match &self.source {
            Some(source) => format!(
                "{} {} [{}] {}",
                self.timestamp.format("%H:%M:%S"),
                self.kind.tag(),
                source,
                self.message
            ),
            None => format!("{} {} {}", self.timestamp.format("%H:%M:%S"), self.kind.tag(), self.message),
        }
    }
}
