use std::path::{Path, PathBuf};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use crate::agent::Phase;
use crate::errors::PilotError;
use crate::models::{LogEntry, Vulnerability};

/// What is persisted once a run leaves its loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub scan_id: String,
    pub target: String,
    pub status: Phase,
    #[serde(default)]
    pub error: Option<String>,
    /// Classification of `error` when the run failed, e.g. `AuthenticationError`.
    #[serde(default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub iterations: u32,
    #[serde(default)]
    pub findings: Vec<Vulnerability>,
    #[serde(default)]
    pub endpoints: Vec<String>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    pub finished_at: DateTime<Utc>,
}

/// Persistence collaborator for finished runs.
#[async_trait]
pub trait ScanStore: Send + Sync {
    async fn save(&self, record: &RunRecord) -> Result<(), PilotError>;

    async fn load(&self, scan_id: &str) -> Result<Option<RunRecord>, PilotError>;
}

/// Summary written to `status.json`.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusFile {
    scan_id: String,
    target: String,
    status: Phase,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_type: Option<String>,
    iterations: u32,
    findings_count: usize,
    #[serde(default)]
    endpoints: Vec<String>,
    finished_at: DateTime<Utc>,
}

/// Writes each run under `<root>/<scan_id>/` as `status.json`,
/// `findings.json` and `logs.jsonl`.
pub struct JsonDirStore {
    root: PathBuf,
}

impl JsonDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn scan_dir(&self, scan_id: &str) -> Result<PathBuf, PilotError> {
        if scan_id.is_empty() || scan_id.contains(['/', '\\']) || scan_id.starts_with('.') {
            return Err(PilotError::Precondition(format!("invalid scan id for storage: {:?}", scan_id)));
        }
        Ok(self.root.join(scan_id))
    }
}

/// Write via a sibling temp file and rename, so readers never see a
/// partially written file.
pub async fn atomic_write(path: &Path, content: &str) -> Result<(), PilotError> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl ScanStore for JsonDirStore {
    async fn save(&self, record: &RunRecord) -> Result<(), PilotError> {
        let dir = self.scan_dir(&record.scan_id)?;
        tokio::fs::create_dir_all(&dir).await?;

        let status = StatusFile {
            scan_id: record.scan_id.clone(),
            target: record.target.clone(),
            status: record.status,
            error: record.error.clone(),
            error_type: record.error_type.clone(),
            iterations: record.iterations,
            findings_count: record.findings.len(),
            endpoints: record.endpoints.clone(),
            finished_at: record.finished_at,
        };
        atomic_write(&dir.join("status.json"), &serde_json::to_string_pretty(&status)?).await?;
        atomic_write(&dir.join("findings.json"), &serde_json::to_string_pretty(&record.findings)?).await?;

        let mut lines = String::new();
        for entry in &record.logs {
            lines.push_str(&serde_json::to_string(entry)?);
            lines.push('\n');
        }
        atomic_write(&dir.join("logs.jsonl"), &lines).await?;

        debug!(scan_id = %record.scan_id, dir = %dir.display(), logs = record.logs.len(), "Run record saved");
        Ok(())
    }

    async fn load(&self, scan_id: &str) -> Result<Option<RunRecord>, PilotError> {
        let dir = self.scan_dir(scan_id)?;
        let status_path = dir.join("status.json");
        if !tokio::fs::try_exists(&status_path).await? {
            return Ok(None);
        }
        let status: StatusFile = serde_json::from_str(&tokio::fs::read_to_string(&status_path).await?)?;

        let findings_path = dir.join("findings.json");
        let findings = if tokio::fs::try_exists(&findings_path).await? {
            serde_json::from_str(&tokio::fs::read_to_string(&findings_path).await?)?
        } else {
            Vec::new()
        };

        let logs_path = dir.join("logs.jsonl");
        let mut logs = Vec::new();
        if tokio::fs::try_exists(&logs_path).await? {
            for line in tokio::fs::read_to_string(&logs_path).await?.lines() {
                if !line.trim().is_empty() {
                    logs.push(serde_json::from_str::<LogEntry>(line)?);
                }
            }
        }

        Ok(Some(RunRecord {
            scan_id: status.scan_id,
            target: status.target,
            status: status.status,
            error: status.error,
            error_type: status.error_type,
            iterations: status.iterations,
            findings,
            endpoints: status.endpoints,
            logs,
            finished_at: status.finished_at,
        }))
    }
}
