//! Batch processing pipeline
//!
//! One pass evaluates a metric report, correlates the resulting alerts and
//! then walks them one by one through escalation, throttling and dispatch.
//! The pass never fails: store, input and transport problems end up as
//! warnings in the [`ProcessingSummary`].

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{Config, FALLBACK_ENVIRONMENT};
use crate::error::Result;
use crate::models::{Alert, MetricReport, PredictionReport};

use super::correlator::Correlator;
use super::dispatcher::Dispatcher;
use super::escalator::Escalator;
use super::evaluator::ThresholdEvaluator;
use super::history::{AlertHistory, HistoryFile};
use super::notifier::{build_notifiers, Notifier};
use super::throttle::ThrottleGate;

/// Counts reported for one batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingSummary {
    /// Alerts produced by threshold evaluation
    pub raw_count: usize,
    /// Alerts left after correlation
    pub correlated_count: usize,
    /// Composite alerts among them
    pub group_count: usize,
    /// Alerts whose level was raised
    pub escalated_count: usize,
    /// Alerts delivered to at least one channel
    pub sent_count: usize,
    /// Alerts held back by the throttle gate
    pub throttled_count: usize,
    /// Alerts skipped because the batch deadline passed
    pub dropped_count: usize,
    /// Recovered failures
    pub warnings: Vec<String>,
}

/// Runs the whole alert pipeline for one batch
pub struct AlertProcessor {
    evaluator: ThresholdEvaluator,
    correlator: Correlator,
    escalator: Escalator,
    throttle: ThrottleGate,
    dispatcher: Dispatcher,
    retention: Duration,
    deadline: Option<StdDuration>,
}

impl AlertProcessor {
    /// Create a processor with the given notifiers
    pub fn new(config: &Config, notifiers: Vec<Box<dyn Notifier>>) -> Self {
        Self {
            evaluator: ThresholdEvaluator::new(config.thresholds.clone()),
            correlator: Correlator::new(config.correlation.clone()),
            escalator: Escalator::new(config.escalation.clone()),
            throttle: ThrottleGate::new(config.throttling.clone()),
            dispatcher: Dispatcher::new(
                config.routing.clone(),
                config.escalation.force_channels.clone(),
                notifiers,
                StdDuration::from_secs(config.notifications.timeout_seconds),
            ),
            retention: Duration::hours(i64::from(config.history.retention_hours)),
            deadline: config
                .processing
                .batch_deadline_seconds
                .map(StdDuration::from_secs),
        }
    }

    /// Create a processor with a notifier for every enabled channel
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(config, build_notifiers(&config.notifications)?))
    }

    /// Channel dispatcher
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Throttle gate
    pub fn throttle(&self) -> &ThrottleGate {
        &self.throttle
    }

    /// Threshold evaluator
    pub fn evaluator(&self) -> &ThresholdEvaluator {
        &self.evaluator
    }

    /// Load history from `store`, process one batch and save the history
    /// back. A history that cannot be read is replaced by an empty one for
    /// this pass and the file is left untouched.
    pub async fn run(
        &self,
        store: &HistoryFile,
        report: Option<&MetricReport>,
        predictions: Option<&PredictionReport>,
        environment: &str,
    ) -> ProcessingSummary {
        let mut store_warnings = Vec::new();

        let (mut history, persist) = match store.load() {
            Ok(history) => (history, true),
            Err(e) => {
                warn!(error = %e, "Alert history unreadable, using an empty history for this pass");
                store_warnings.push(e.to_string());
                (AlertHistory::new(), false)
            }
        };

        let mut summary = self
            .process_batch(report, predictions, environment, &mut history, Utc::now())
            .await;

        if persist {
            if let Err(e) = store.save(&history) {
                warn!(error = %e, "Failed to save alert history");
                store_warnings.push(e.to_string());
            }
        }

        summary.warnings.splice(0..0, store_warnings);
        summary
    }

    /// Process one metric report and, if given, the latest failure-risk
    /// predictions. A missing metric report raises a single
    /// "Metric Report Missing" alert instead; predictions are checked either
    /// way.
    pub async fn process_batch(
        &self,
        report: Option<&MetricReport>,
        predictions: Option<&PredictionReport>,
        environment: &str,
        history: &mut AlertHistory,
        now: DateTime<Utc>,
    ) -> ProcessingSummary {
        let mut warnings = Vec::new();

        if self.evaluator.config().environment(environment).is_none() {
            warn!(environment, fallback = FALLBACK_ENVIRONMENT, "Unknown environment");
            warnings.push(format!(
                "unknown environment '{environment}', using '{FALLBACK_ENVIRONMENT}' thresholds"
            ));
        }

        let mut raw = match report {
            Some(report) => {
                warnings.extend(report.issues.iter().cloned());
                self.evaluator.evaluate_report(report, environment, now)
            }
            None => vec![ThresholdEvaluator::report_missing_alert(now)],
        };
        raw.extend(predictions.and_then(|p| ThresholdEvaluator::prediction_alert(p, now)));

        let mut summary = self.process_alerts(raw, history, now).await;
        summary.warnings.splice(0..0, warnings);
        summary
    }

    /// Correlate, escalate, throttle and dispatch already-evaluated alerts
    pub async fn process_alerts(
        &self,
        raw: Vec<Alert>,
        history: &mut AlertHistory,
        now: DateTime<Utc>,
    ) -> ProcessingSummary {
        let started = Instant::now();
        let mut summary = ProcessingSummary {
            raw_count: raw.len(),
            ..ProcessingSummary::default()
        };

        let pruned = history.prune(now - self.retention);
        if pruned > 0 {
            debug!(pruned, "Pruned expired history records");
        }

        let alerts = self.correlator.correlate(raw, now);
        summary.correlated_count = alerts.len();
        summary.group_count = alerts.iter().filter(|a| a.is_correlated()).count();

        let total = alerts.len();
        let deadline = self.deadline;
        for (index, mut alert) in alerts.into_iter().enumerate() {
            if deadline.is_some_and(|limit| started.elapsed() >= limit) {
                summary.dropped_count = total - index;
                warn!(dropped = summary.dropped_count, "Batch deadline exceeded");
                summary.warnings.push(format!(
                    "batch deadline exceeded, {} alerts dropped",
                    summary.dropped_count
                ));
                break;
            }

            let escalated = self.escalator.maybe_escalate(&mut alert, history, now);
            if escalated {
                summary.escalated_count += 1;
            } else if !self.throttle.allow(&alert, history, now) {
                summary.throttled_count += 1;
                continue;
            }

            let report = self.dispatcher.send(&alert, history, now).await;
            if report.success {
                summary.sent_count += 1;
            }
            summary.warnings.extend(
                report
                    .results
                    .iter()
                    .filter_map(|r| r.as_error())
                    .map(|e| e.to_string()),
            );
        }

        info!(
            raw = summary.raw_count,
            correlated = summary.correlated_count,
            escalated = summary.escalated_count,
            sent = summary.sent_count,
            throttled = summary.throttled_count,
            dropped = summary.dropped_count,
            "Batch processed"
        );

        summary
    }
}
