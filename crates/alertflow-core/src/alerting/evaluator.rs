//! Threshold evaluation
//!
//! Compares metric snapshots against the resolved threshold profile and
//! produces raw alerts. Evaluation is a pure function of its inputs.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::config::ThresholdConfig;
use crate::models::{Alert, Level, MetricReport, MetricSnapshot, PredictionReport, ToolReport};

/// Source recorded on threshold alerts
pub const THRESHOLD_SOURCE: &str = "custom_threshold_monitor";

/// Source recorded on tool health-status alerts
pub const TOOL_MONITOR_SOURCE: &str = "tool_monitor";

/// Source recorded on alerts about the pipeline's own inputs
pub const ALERT_SYSTEM_SOURCE: &str = "alert_system";

/// Source recorded on failure-risk prediction alerts
pub const PREDICTIVE_SOURCE: &str = "predictive_monitor";

/// Which side of the threshold is bad
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// Alert when `value >= threshold`
    Above,
    /// Alert when `value < threshold`
    Below,
}

/// How far past the threshold a value must go to be critical
#[derive(Debug, Clone, Copy, PartialEq)]
enum CriticalBand {
    /// Absolute distance from the threshold
    Offset(f64),
    /// Multiple of the threshold
    Factor(f64),
}

/// Presentation and severity rule for one metric family
#[derive(Debug, Clone, Copy)]
struct MetricRule {
    label: &'static str,
    unit: &'static str,
    direction: Direction,
    critical: CriticalBand,
}

impl MetricRule {
    const fn above(label: &'static str, unit: &'static str, critical: CriticalBand) -> Self {
        Self {
            label,
            unit,
            direction: Direction::Above,
            critical,
        }
    }

    const fn below(label: &'static str, unit: &'static str, critical: CriticalBand) -> Self {
        Self {
            label,
            unit,
            direction: Direction::Below,
            critical,
        }
    }

    fn for_metric(metric: &str) -> Option<Self> {
        use CriticalBand::{Factor, Offset};

        let rule = match metric {
            "disk_usage_percent" => Self::above("Disk Usage", "%", Offset(10.0)),
            "memory_usage_percent" => Self::above("Memory Usage", "%", Offset(10.0)),
            "cpu_usage_percent" => Self::above("CPU Usage", "%", Offset(15.0)),
            "network_latency_ms" => Self::above("Network Latency", "ms", Factor(2.0)),
            "response_time_ms" => Self::above("Response Time", "ms", Factor(2.0)),
            "error_rate_percent" => Self::above("Error Rate", "%", Factor(2.0)),
            "memory_mb" => Self::above("Memory", "MB", Factor(2.0)),
            "cpu_percent" => Self::above("CPU", "%", Factor(2.0)),
            "uptime_percent" => Self::below("Uptime", "%", Offset(5.0)),
            "tool_health_score" => Self::below("Health Score", "", Factor(0.5)),
            _ => return None,
        };
        Some(rule)
    }

    fn breached(&self, value: f64, threshold: f64) -> bool {
        match self.direction {
            Direction::Above => value >= threshold,
            Direction::Below => value < threshold,
        }
    }

    fn level(&self, value: f64, threshold: f64) -> Level {
        let critical = match (self.direction, self.critical) {
            (Direction::Above, CriticalBand::Offset(d)) => value >= threshold + d,
            (Direction::Above, CriticalBand::Factor(f)) => value >= threshold * f,
            (Direction::Below, CriticalBand::Offset(d)) => value < threshold - d,
            (Direction::Below, CriticalBand::Factor(f)) => value < threshold * f,
        };
        if critical {
            Level::Critical
        } else {
            Level::High
        }
    }
}

/// Evaluates metric snapshots against threshold profiles
#[derive(Debug, Clone)]
pub struct ThresholdEvaluator {
    config: ThresholdConfig,
}

impl ThresholdEvaluator {
    /// Create a new evaluator
    pub fn new(config: ThresholdConfig) -> Self {
        Self { config }
    }

    /// Threshold profiles in use
    pub fn config(&self) -> &ThresholdConfig {
        &self.config
    }

    /// Evaluate a whole report: system metrics, then each tool's health
    /// status and metrics.
    pub fn evaluate_report(
        &self,
        report: &MetricReport,
        environment: &str,
        now: DateTime<Utc>,
    ) -> Vec<Alert> {
        let mut alerts = self.evaluate(&report.system, None, environment, now);

        for (name, tool) in &report.tools {
            if tool.is_unhealthy() {
                alerts.push(Self::unhealthy_tool_alert(name, tool, now));
            }

            if !tool.metrics.is_empty() {
                alerts.extend(self.evaluate(&tool.metrics, Some(name), environment, now));
            }
        }

        debug!(count = alerts.len(), environment, "Evaluated metric report");
        alerts
    }

    /// Evaluate one snapshot. Emits one alert per metric that is present in
    /// both the snapshot and the resolved thresholds and is on the bad side
    /// of its threshold.
    pub fn evaluate(
        &self,
        metrics: &MetricSnapshot,
        tool: Option<&str>,
        environment: &str,
        now: DateTime<Utc>,
    ) -> Vec<Alert> {
        if !self.config.enabled {
            return Vec::new();
        }

        let thresholds = self.config.resolve(environment, tool);
        let scope = tool.unwrap_or("System");
        let mut alerts = Vec::new();

        for (metric, &value) in metrics {
            let Some(&threshold) = thresholds.get(metric) else {
                continue;
            };

            if !value.is_finite() {
                warn!(metric = %metric, scope, "Skipping non-finite metric value");
                continue;
            }

            let rule = MetricRule::for_metric(metric)
                .unwrap_or(MetricRule::above("", "", CriticalBand::Factor(2.0)));

            if !rule.breached(value, threshold) {
                continue;
            }

            let level = rule.level(value, threshold);
            let label = if rule.label.is_empty() { metric.as_str() } else { rule.label };

            alerts.push(
                Alert::new(
                    level,
                    format!("{label} Alert ({scope})"),
                    format!(
                        "{label} is {}{unit} (threshold: {}{unit})",
                        value,
                        threshold,
                        unit = rule.unit
                    ),
                    THRESHOLD_SOURCE,
                    now,
                )
                .with_tool(tool)
                .with_metric(metric.clone(), value, threshold),
            );
        }

        alerts
    }

    /// HIGH alert for a tool that did not report a healthy status. The tool
    /// block is attached as details.
    pub fn unhealthy_tool_alert(name: &str, tool: &ToolReport, now: DateTime<Utc>) -> Alert {
        let status = tool.status.as_deref().unwrap_or("no");
        let alert = Alert::new(
            Level::High,
            format!("Tool {name} Unhealthy"),
            format!("Tool {name} is reporting {status} status"),
            TOOL_MONITOR_SOURCE,
            now,
        )
        .with_tool(Some(name));

        match serde_json::to_string_pretty(tool) {
            Ok(details) => alert.with_details(details),
            Err(_) => alert,
        }
    }

    /// CRITICAL alert when the predictive monitor reports tools at critical
    /// failure risk, carrying the per-tool predictions as details
    pub fn prediction_alert(report: &PredictionReport, now: DateTime<Utc>) -> Option<Alert> {
        let critical = report.summary.critical_risks;
        if critical == 0 {
            return None;
        }

        Some(
            Alert::new(
                Level::Critical,
                "Critical Tool Failure Risk",
                format!("{critical} tools have critical failure risk"),
                PREDICTIVE_SOURCE,
                now,
            )
            .with_details(report.predictions_pretty()),
        )
    }

    /// Alert raised when no metric report could be read at all
    pub fn report_missing_alert(now: DateTime<Utc>) -> Alert {
        Alert::new(
            Level::Medium,
            "Metric Report Missing",
            "Could not read the metric report for monitoring",
            ALERT_SYSTEM_SOURCE,
            now,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn evaluator() -> ThresholdEvaluator {
        ThresholdEvaluator::new(ThresholdConfig::default())
    }

    fn snapshot(entries: &[(&str, f64)]) -> MetricSnapshot {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), *v))
            .collect()
    }

    fn by_metric<'a>(alerts: &'a [Alert], metric: &str) -> Option<&'a Alert> {
        alerts.iter().find(|a| a.metric.as_deref() == Some(metric))
    }

    #[test]
    fn test_development_system_metrics() {
        let metrics = snapshot(&[
            ("disk_usage_percent", 95.0),
            ("memory_usage_percent", 70.0),
            ("cpu_usage_percent", 85.0),
        ]);

        let alerts = evaluator().evaluate(&metrics, None, "development", Utc::now());

        assert_eq!(alerts.len(), 2);
        let disk = by_metric(&alerts, "disk_usage_percent").unwrap();
        assert_eq!(disk.level, Level::High);
        assert_eq!(disk.threshold, Some(90.0));
        assert_eq!(disk.title, "Disk Usage Alert (System)");
        assert_eq!(disk.message, "Disk Usage is 95% (threshold: 90%)");

        let cpu = by_metric(&alerts, "cpu_usage_percent").unwrap();
        assert_eq!(cpu.level, Level::High);
        assert!(by_metric(&alerts, "memory_usage_percent").is_none());
    }

    #[test]
    fn test_production_is_stricter() {
        let metrics = snapshot(&[
            ("disk_usage_percent", 95.0),
            ("memory_usage_percent", 70.0),
            ("cpu_usage_percent", 85.0),
        ]);

        let alerts = evaluator().evaluate(&metrics, None, "production", Utc::now());
        assert_eq!(alerts.len(), 2);
        let cpu = by_metric(&alerts, "cpu_usage_percent").unwrap();
        assert_eq!(cpu.level, Level::Critical);
    }

    #[rstest]
    #[case("disk_usage_percent", 99.9, Level::High)]
    #[case("disk_usage_percent", 100.0, Level::Critical)]
    #[case("cpu_usage_percent", 94.0, Level::High)]
    #[case("cpu_usage_percent", 95.0, Level::Critical)]
    #[case("network_latency_ms", 999.0, Level::High)]
    #[case("network_latency_ms", 1000.0, Level::Critical)]
    #[case("tool_health_score", 0.5, Level::High)]
    #[case("tool_health_score", 0.3, Level::Critical)]
    fn test_severity_bands(#[case] metric: &str, #[case] value: f64, #[case] expected: Level) {
        let metrics = snapshot(&[(metric, value)]);
        let alerts = evaluator().evaluate(&metrics, None, "development", Utc::now());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].level, expected);
    }

    #[test]
    fn test_tool_thresholds_and_uptime_inversion() {
        let metrics = snapshot(&[
            ("response_time_ms", 2500.0),
            ("error_rate_percent", 1.0),
            ("uptime_percent", 99.0),
        ]);

        let alerts = evaluator().evaluate(
            &metrics,
            Some("CodingReviewer"),
            "development",
            Utc::now(),
        );

        assert_eq!(alerts.len(), 2);
        let response = by_metric(&alerts, "response_time_ms").unwrap();
        assert_eq!(response.level, Level::High);
        assert_eq!(response.tool.as_deref(), Some("CodingReviewer"));
        assert_eq!(response.title, "Response Time Alert (CodingReviewer)");

        let uptime = by_metric(&alerts, "uptime_percent").unwrap();
        assert_eq!(uptime.level, Level::High);
        assert_eq!(uptime.threshold, Some(99.9));
    }

    #[test]
    fn test_uptime_at_threshold_is_fine() {
        let alerts = evaluator().evaluate(
            &snapshot(&[("uptime_percent", 99.5)]),
            Some("UnknownTool"),
            "development",
            Utc::now(),
        );
        assert!(alerts.is_empty());
    }

    #[test]
    fn test_unknown_metrics_and_missing_thresholds_are_ignored() {
        let mut config = ThresholdConfig::default();
        config
            .environments
            .get_mut("development")
            .unwrap()
            .insert("queue_depth".to_string(), 100.0);
        let evaluator = ThresholdEvaluator::new(config);

        let metrics = snapshot(&[
            ("queue_depth", 250.0),
            ("open_files", 1e9),
            ("cpu_usage_percent", f64::NAN),
        ]);
        let alerts = evaluator.evaluate(&metrics, None, "development", Utc::now());

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].title, "queue_depth Alert (System)");
        assert_eq!(alerts[0].level, Level::Critical);
    }

    #[test]
    fn test_disabled_thresholds_emit_nothing() {
        let mut config = ThresholdConfig::default();
        config.enabled = false;
        let alerts = ThresholdEvaluator::new(config).evaluate(
            &snapshot(&[("disk_usage_percent", 100.0)]),
            None,
            "development",
            Utc::now(),
        );
        assert!(alerts.is_empty());
    }

    #[test]
    fn test_report_includes_unhealthy_tools() {
        let mut report = MetricReport::default();
        report.system.insert("disk_usage_percent".into(), 50.0);
        report.tools.insert(
            "PlannerApp".into(),
            ToolReport {
                status: Some("degraded".into()),
                metrics: snapshot(&[("error_rate_percent", 7.0)]),
            },
        );

        let alerts = evaluator().evaluate_report(&report, "development", Utc::now());

        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].title, "Tool PlannerApp Unhealthy");
        assert_eq!(alerts[0].source, TOOL_MONITOR_SOURCE);
        assert_eq!(
            alerts[0].message,
            "Tool PlannerApp is reporting degraded status",
        );
        let details = alerts[0].details.as_deref().unwrap();
        assert!(details.contains("\"status\": \"degraded\""), "{details}");
        assert!(details.contains("\"error_rate_percent\": 7.0"), "{details}");
        assert_eq!(alerts[1].level, Level::Critical);
    }

    #[test]
    fn test_tool_without_status_is_unhealthy() {
        let mut report = MetricReport::default();
        report.tools.insert(
            "AvoidObstaclesGame".into(),
            ToolReport {
                status: None,
                metrics: snapshot(&[("response_time_ms", 50.0)]),
            },
        );

        let alerts = evaluator().evaluate_report(&report, "development", Utc::now());

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].title, "Tool AvoidObstaclesGame Unhealthy");
        assert_eq!(
            alerts[0].message,
            "Tool AvoidObstaclesGame is reporting no status",
        );
        let details = alerts[0].details.as_deref().unwrap();
        assert!(details.contains("\"status\": null"), "{details}");
    }

    #[test]
    fn test_prediction_alert_needs_critical_risks() {
        let mut report = PredictionReport::default();
        report.summary.high_risks = 4;
        let quiet = ThresholdEvaluator::prediction_alert(&report, Utc::now());
        assert_eq!(quiet, None);

        report.summary.critical_risks = 2;
        report.predictions.insert(
            "PlannerApp".to_string(),
            serde_json::json!({ "risk_level": "CRITICAL" }),
        );
        let alert = ThresholdEvaluator::prediction_alert(&report, Utc::now()).unwrap();

        assert_eq!(alert.level, Level::Critical);
        assert_eq!(alert.title, "Critical Tool Failure Risk");
        assert_eq!(alert.message, "2 tools have critical failure risk");
        assert_eq!(alert.source, PREDICTIVE_SOURCE);
        assert_eq!(
            alert.details.as_deref(),
            Some("{\n  \"PlannerApp\": {\n    \"risk_level\": \"CRITICAL\"\n  }\n}")
        );
    }
}
