//! Failure-risk prediction models
//!
//! The predictive monitor writes `predictions_<timestamp>.json` reports into
//! its logs directory. Only the summary counts drive alerting; the per-tool
//! predictions are carried through untouched as alert details.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Error, Result};

/// File name prefix of prediction reports
pub const PREDICTION_FILE_PREFIX: &str = "predictions_";

/// Aggregate risk counts of a prediction report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionSummary {
    /// Tools covered by the report
    pub total_tools: u64,
    /// Tools predicted to fail soon
    pub critical_risks: u64,
    /// Tools at elevated risk
    pub high_risks: u64,
    /// Tools whose recent behaviour looks anomalous
    pub anomalies: u64,
}

/// One predictive-monitor report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionReport {
    /// Risk counts
    pub summary: PredictionSummary,
    /// Per-tool predictions, keyed by tool name
    pub predictions: Map<String, Value>,
}

impl PredictionReport {
    /// Read a report document from disk
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| Error::input(format!("{}: {e}", path.display())))
    }

    /// Read the report at `path`, or the newest report inside it when `path`
    /// is a directory. A directory without reports yields `None`.
    pub fn discover(path: &Path) -> Result<Option<Self>> {
        if !path.is_dir() {
            return Self::load(path).map(Some);
        }
        match Self::latest_in(path)? {
            Some(latest) => {
                debug!(path = %latest.display(), "Using newest prediction report");
                Self::load(&latest).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Newest `predictions_*.json` file in `dir`, by modification time
    /// and then by name
    pub fn latest_in(dir: &Path) -> Result<Option<PathBuf>> {
        let mut newest: Option<(SystemTime, PathBuf)> = None;

        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with(PREDICTION_FILE_PREFIX) || !name.ends_with(".json") {
                continue;
            }

            let modified = entry
                .metadata()?
                .modified()
                .unwrap_or(SystemTime::UNIX_EPOCH);
            let candidate = (modified, entry.path());
            match &newest {
                Some(current) if *current >= candidate => {}
                _ => newest = Some(candidate),
            }
        }

        Ok(newest.map(|(_, path)| path))
    }

    /// Per-tool predictions as indented JSON
    pub fn predictions_pretty(&self) -> String {
        serde_json::to_string_pretty(&self.predictions).unwrap_or_default()
    }
}
