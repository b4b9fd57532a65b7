use std::sync::{Arc, RwLock};
use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use crate::models::{LogEntry, LogKind};

/// Append-only log buffer with dense, zero-based indices.
///
/// Safe for concurrent appends from several agents; entries from one
/// appender keep their causal order, entries from different appenders are
/// interleaved by arrival.
pub struct LogStream {
    entries: RwLock<Vec<LogEntry>>,
    len_tx: watch::Sender<u64>,
}

impl LogStream {
    pub fn new() -> Self {
        let (len_tx, _) = watch::channel(0);
        Self { entries: RwLock::new(Vec::new()), len_tx }
    }

    /// Append an entry and return the index it was assigned.
    pub fn append(&self, kind: LogKind, message: impl Into<String>, source: Option<&str>) -> u64 {
        let message = message.into();
        let index = {
            let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
            let index = entries.len() as u64;
            entries.push(LogEntry {
                index,
                timestamp: Utc::now(),
                kind,
                message: message.clone(),
                source: source.map(str::to_string),
            });
            index
        };
        self.len_tx.send_replace(index + 1);

        let source = source.unwrap_or("-");
        match kind {
            LogKind::Error => warn!(index, source, "{}", message),
            LogKind::Tool => debug!(index, source, "{}", message),
            _ => info!(index, source, kind = %kind, "{}", message),
        }
        index
    }

    pub fn len(&self) -> u64 {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries with index in `[since, len)`. A cursor past the end yields
    /// nothing.
    pub fn since(&self, since: u64) -> Vec<LogEntry> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let start = usize::try_from(since).unwrap_or(usize::MAX).min(entries.len());
        entries[start..].to_vec()
    }

    /// Rendered lines for `[since, len)`.
    pub fn lines_since(&self, since: u64) -> Vec<String> {
        self.since(since).iter().map(LogEntry::render).collect()
    }

    /// Receiver that observes the current length; lets followers wait for
    /// new entries instead of polling on a timer.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.len_tx.subscribe()
    }
}

impl Default for LogStream {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle through which one agent writes into a (possibly shared) stream.
#[derive(Clone)]
pub struct LogSink {
    stream: Arc<LogStream>,
    source: Option<String>,
}

impl LogSink {
    pub fn new(stream: Arc<LogStream>, source: Option<String>) -> Self {
        Self { stream, source }
    }

    pub fn append(&self, kind: LogKind, message: impl Into<String>) -> u64 {
        self.stream.append(kind, message, self.source.as_deref())
    }

    pub fn stream(&self) -> &Arc<LogStream> {
        &self.stream
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }
}
