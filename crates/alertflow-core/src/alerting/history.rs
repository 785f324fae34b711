//! Alert history: an append-only, time-bounded ledger of sent alerts
//!
//! Records are kept ordered by timestamp, oldest first, so window queries
//! are a binary search from the end.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{Alert, AlertRecord};

/// In-memory alert history
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertHistory {
    records: Vec<AlertRecord>,
}

impl AlertHistory {
    /// Create an empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a history from records in any order
    pub fn from_records(mut records: Vec<AlertRecord>) -> Self {
        records.sort_by_key(|r| r.timestamp);
        Self { records }
    }

    /// Append a record, keeping timestamp order
    pub fn append(&mut self, record: AlertRecord) {
        let at = self
            .records
            .partition_point(|r| r.timestamp <= record.timestamp);
        self.records.insert(at, record);
    }

    /// Records strictly newer than `now - within`, oldest first
    pub fn recent(&self, within: Duration, now: DateTime<Utc>) -> &[AlertRecord] {
        let cutoff = now - within;
        let start = self.records.partition_point(|r| r.timestamp <= cutoff);
        &self.records[start..]
    }

    /// Drop records at or before `older_than`; returns how many were dropped
    pub fn prune(&mut self, older_than: DateTime<Utc>) -> usize {
        let stale = self.records.partition_point(|r| r.timestamp <= older_than);
        self.records.drain(..stale);
        stale
    }

    /// Records tracing the same `(title, source)` as `alert`, oldest first
    pub fn matching<'a>(&'a self, alert: &'a Alert) -> impl Iterator<Item = &'a AlertRecord> + 'a {
        self.records.iter().filter(move |r| r.matches(alert))
    }

    /// All records, oldest first
    pub fn records(&self) -> &[AlertRecord] {
        &self.records
    }

    /// Newest record
    pub fn last(&self) -> Option<&AlertRecord> {
        self.records.last()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the history is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// JSON file backing for [`AlertHistory`]
#[derive(Debug, Clone)]
pub struct HistoryFile {
    path: PathBuf,
    max_records: usize,
}

impl HistoryFile {
    /// Create a new history file handle
    pub fn new(path: impl Into<PathBuf>, max_records: usize) -> Self {
        Self {
            path: path.into(),
            max_records,
        }
    }

    /// Location of the file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the history. A missing file is an empty history.
    pub fn load(&self) -> Result<AlertHistory> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No alert history yet");
                return Ok(AlertHistory::new());
            }
            Err(e) => return Err(Error::store(format!("{}: {e}", self.path.display()))),
        };

        if raw.trim().is_empty() {
            return Ok(AlertHistory::new());
        }

        let records: Vec<AlertRecord> = serde_json::from_str(&raw)
            .map_err(|e| Error::store(format!("{}: {e}", self.path.display())))?;

        debug!(path = %self.path.display(), count = records.len(), "Loaded alert history");
        Ok(AlertHistory::from_records(records))
    }

    /// Write the newest `max_records` records. The file is replaced
    /// atomically so an interrupted write never leaves a truncated ledger.
    pub fn save(&self, history: &AlertHistory) -> Result<()> {
        let records = history.records();
        let keep = &records[records.len().saturating_sub(self.max_records)..];
        let body = serde_json::to_string_pretty(keep)?;

        let to_store = |e: std::io::Error| Error::store(format!("{}: {e}", self.path.display()));

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(to_store)?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, body).map_err(to_store)?;
        std::fs::rename(&tmp, &self.path).map_err(to_store)?;

        debug!(path = %self.path.display(), count = keep.len(), "Saved alert history");
        Ok(())
    }
}
