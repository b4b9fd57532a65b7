use std::collections::HashSet;
use std::sync::Mutex;
use crate::models::Vulnerability;

#[derive(Default)]
struct LedgerInner {
    keys: HashSet<(String, String)>,
    entries: Vec<Vulnerability>,
}

/// Finding list deduplicated by `(name, request evidence)`.
///
/// A single agent owns one; a pool hands one ledger to every worker so the
/// same issue found by two roles is reported once.
#[derive(Default)]
pub struct FindingLedger {
    inner: Mutex<LedgerInner>,
}

impl FindingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the finding was not known yet.
    pub fn record(&self, finding: Vulnerability) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.keys.insert(finding.dedup_key()) {
            inner.entries.push(finding);
            true
        } else {
            false
        }
    }

    /// Add findings from an earlier run.
    pub fn seed(&self, findings: impl IntoIterator<Item = Vulnerability>) {
        for finding in findings {
            self.record(finding);
        }
    }

    pub fn snapshot(&self) -> Vec<Vulnerability> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).entries.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
