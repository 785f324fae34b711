//! Metric snapshot models
//!
//! A [`MetricReport`] is what the metric collectors hand to a batch: one
//! snapshot of system-wide metrics plus one per monitored tool. Raw report
//! documents use the collectors' field names; they are normalised here to
//! the canonical metric names the threshold profiles are keyed by.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Mapping of canonical metric name to observed value
pub type MetricSnapshot = BTreeMap<String, f64>;

/// Status string a tool reports when nothing is wrong
pub const HEALTHY_STATUS: &str = "healthy";

/// Collector field name -> canonical metric name, for tool blocks
const TOOL_FIELDS: &[(&str, &str)] = &[
    ("response_time", "response_time_ms"),
    ("error_rate", "error_rate_percent"),
    ("uptime", "uptime_percent"),
    ("memory_usage", "memory_mb"),
    ("cpu_usage", "cpu_percent"),
    ("health_score", "tool_health_score"),
];

/// Collector block name -> canonical metric name, for `{ "percent": n }` system blocks
const SYSTEM_PERCENT_BLOCKS: &[(&str, &str)] = &[
    ("disk_usage", "disk_usage_percent"),
    ("memory", "memory_usage_percent"),
    ("cpu", "cpu_usage_percent"),
];

/// Per-tool section of a metric report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolReport {
    /// Reported health status, if any
    pub status: Option<String>,
    /// Canonical metrics for this tool
    pub metrics: MetricSnapshot,
}

impl ToolReport {
    /// Whether the tool failed to report a healthy status. A block with no
    /// status at all counts as unhealthy.
    pub fn is_unhealthy(&self) -> bool {
        !self
            .status
            .as_deref()
            .is_some_and(|status| status.eq_ignore_ascii_case(HEALTHY_STATUS))
    }
}

/// Metrics for one batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricReport {
    /// System-wide metrics
    pub system: MetricSnapshot,
    /// Per-tool metrics, keyed by tool name
    pub tools: BTreeMap<String, ToolReport>,
    /// Offending keys skipped while parsing
    #[serde(skip)]
    pub issues: Vec<String>,
}

impl MetricReport {
    /// Read and normalise a report document from disk
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&raw)?;
        Ok(Self::from_value(&value))
    }

    /// Normalise a raw report document.
    ///
    /// Malformed values never fail the whole report: the offending key is
    /// skipped and described in [`MetricReport::issues`].
    pub fn from_value(value: &Value) -> Self {
        let mut report = Self::default();

        if let Some(system) = value.get("system").and_then(Value::as_object) {
            for (key, entry) in system {
                let canonical = SYSTEM_PERCENT_BLOCKS
                    .iter()
                    .find(|(block, _)| block == key)
                    .map(|(_, name)| *name);

                match (canonical, entry) {
                    (Some(name), Value::Object(block)) => {
                        if let Some(percent) = block.get("percent") {
                            report.record(name, percent);
                        }
                    }
                    (_, Value::Object(_)) => {}
                    (Some(name), other) => report.record(name, other),
                    (None, other) => report.record(key, other),
                }
            }
        }

        let tools = value.get("tools").and_then(|tools| {
            tools
                .get("details")
                .and_then(Value::as_object)
                .or_else(|| tools.as_object())
        });

        for (name, info) in tools.into_iter().flatten() {
            let Some(info) = info.as_object() else {
                report
                    .issues
                    .push(Error::input(format!("tool '{name}' is not an object")).to_string());
                continue;
            };

            let mut tool = ToolReport {
                status: info.get("status").and_then(Value::as_str).map(String::from),
                metrics: MetricSnapshot::new(),
            };

            for (field, entry) in info {
                let canonical = TOOL_FIELDS
                    .iter()
                    .find(|(raw, canonical)| raw == field || canonical == field)
                    .map(|(_, canonical)| *canonical);

                if let Some(metric) = canonical {
                    match parse_metric(metric, entry) {
                        Ok(Some(value)) => {
                            tool.metrics.insert(metric.to_string(), value);
                        }
                        Ok(None) => {}
                        Err(e) => report.issues.push(format!("{name}: {e}")),
                    }
                }
            }

            report.tools.insert(name.clone(), tool);
        }

        report
    }

    fn record(&mut self, metric: &str, entry: &Value) {
        match parse_metric(metric, entry) {
            Ok(Some(value)) => {
                self.system.insert(metric.to_string(), value);
            }
            Ok(None) => {}
            Err(e) => self.issues.push(e.to_string()),
        }
    }
}

/// Parse one metric value. `null` means "not reported".
fn parse_metric(metric: &str, entry: &Value) -> Result<Option<f64>> {
    match entry {
        Value::Null => Ok(None),
        Value::Number(n) => match n.as_f64() {
            Some(v) if v.is_finite() => Ok(Some(v)),
            _ => Err(Error::input(format!("metric '{metric}' is not a finite number"))),
        },
        other => Err(Error::input(format!(
            "metric '{metric}' has non-numeric value {other}"
        ))),
    }
}
