//! Alert correlation
//!
//! Alerts from one batch are bucketed by time window. Inside each bucket the
//! configured patterns, in declaration order, claim every alert they match;
//! a pattern that claims two or more alerts turns them into one composite
//! alert. Correlation never produces more alerts than it was given.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::{CorrelationConfig, CorrelationPattern};
use crate::models::{Alert, CorrelatedAlert, CorrelationGroup, Level};

/// Source recorded on composite alerts
pub const CORRELATOR_SOURCE: &str = "alert_correlator";

impl CorrelationPattern {
    /// Whether `alert` matches: a keyword appears in the lower-cased title
    /// and message, and the alert's source is one of the pattern's sources.
    pub fn matches(&self, alert: &Alert) -> bool {
        if !self.sources.iter().any(|s| *s == alert.source) {
            return false;
        }

        let text = format!("{} {}", alert.title, alert.message).to_lowercase();
        self.keywords
            .iter()
            .any(|keyword| text.contains(&keyword.to_lowercase()))
    }
}

/// Groups related alerts into composite alerts
#[derive(Debug, Clone)]
pub struct Correlator {
    config: CorrelationConfig,
}

impl Correlator {
    /// Create a new correlator
    pub fn new(config: CorrelationConfig) -> Self {
        Self { config }
    }

    /// Correlate one batch of alerts. Output is ordered by bucket; within a
    /// bucket composites come first (in pattern order), then pass-through
    /// alerts in input order.
    pub fn correlate(&self, alerts: Vec<Alert>, now: DateTime<Utc>) -> Vec<Alert> {
        if !self.config.enabled || alerts.len() < 2 {
            return alerts;
        }

        let input = alerts.len();
        let mut buckets: BTreeMap<i64, Vec<Alert>> = BTreeMap::new();
        for alert in alerts {
            buckets
                .entry(self.bucket_of(alert.timestamp))
                .or_default()
                .push(alert);
        }

        let mut output = Vec::with_capacity(input);
        for (_, bucket) in buckets {
            if bucket.len() < 2 {
                output.extend(bucket);
                continue;
            }
            output.extend(self.correlate_bucket(bucket, now));
        }

        if output.len() < input {
            info!(
                raw = input,
                correlated = output.len(),
                "Correlation merged {} alerts",
                input - output.len()
            );
        }

        output
    }

    /// Bucket index: timestamp floored to a multiple of the window
    fn bucket_of(&self, timestamp: DateTime<Utc>) -> i64 {
        let width = i64::from(self.config.time_window_minutes.max(1)) * 60;
        timestamp.timestamp().div_euclid(width)
    }

    fn correlate_bucket(&self, mut pool: Vec<Alert>, now: DateTime<Utc>) -> Vec<Alert> {
        let mut composites = Vec::new();

        for pattern in &self.config.patterns {
            if pool.len() < 2 {
                break;
            }

            let matched = pool.iter().filter(|alert| pattern.matches(alert)).count();
            if matched < 2 {
                continue;
            }

            let (claimed, rest): (Vec<Alert>, Vec<Alert>) =
                pool.into_iter().partition(|alert| pattern.matches(alert));
            pool = rest;

            for chunk in chunks(claimed, self.config.max_group_size) {
                if chunk.len() < 2 {
                    // A lone leftover is not a group; later patterns may still claim it
                    pool.extend(chunk);
                    continue;
                }
                debug!(pattern = %pattern.name, count = chunk.len(), "Correlated alerts");
                composites.push(self.composite(pattern, chunk, now));
            }
        }

        composites.extend(pool);
        composites
    }

    fn composite(
        &self,
        pattern: &CorrelationPattern,
        members: Vec<Alert>,
        now: DateTime<Utc>,
    ) -> Alert {
        let highest = members
            .iter()
            .map(|alert| alert.level)
            .max()
            .unwrap_or(Level::Low);
        let level = pattern
            .group_level
            .map_or(highest, |floor| highest.max(floor));

        let sources: BTreeSet<&str> = members.iter().map(|a| a.source.as_str()).collect();
        let details = members
            .iter()
            .map(|a| format!("• {}: {}", a.title, a.message))
            .collect::<Vec<_>>()
            .join("\n");

        let title = if pattern.group_title.is_empty() {
            format!("Multiple {}", members[0].title)
        } else {
            pattern.group_title.clone()
        };

        let group = CorrelationGroup {
            pattern: pattern.name.clone(),
            alert_count: members.len(),
            sources: sources.iter().map(|s| (*s).to_string()).collect(),
            time_window_minutes: self.config.time_window_minutes,
            alerts: members.iter().map(CorrelatedAlert::from).collect(),
        };

        let mut alert = Alert::new(
            level,
            title,
            format!(
                "Correlated {} related alerts from {} sources",
                group.alert_count,
                group.sources.len()
            ),
            CORRELATOR_SOURCE,
            now,
        )
        .with_details(details);
        alert.correlation_group = Some(group);
        alert
    }
}

/// Split into consecutive chunks of at most `size`
fn chunks(alerts: Vec<Alert>, size: usize) -> Vec<Vec<Alert>> {
    let size = size.max(2);
    let mut out = Vec::new();
    let mut current = Vec::with_capacity(size);
    for alert in alerts {
        current.push(alert);
        if current.len() == size {
            out.push(std::mem::replace(&mut current, Vec::with_capacity(size)));
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}
