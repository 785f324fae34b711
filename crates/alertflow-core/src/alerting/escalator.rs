//! Escalation policies
//!
//! The escalator looks back over the alert history for the same
//! `(title, source)` identity and may raise an alert's level before it is
//! sent. Policies are tried in a fixed order (frequency, duration,
//! persistence) and the first one that raises the level wins; they never
//! stack and never lower a level.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::config::EscalationConfig;
use crate::models::{Alert, Level};

use super::history::AlertHistory;

/// Outcome of a policy that applies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Escalation {
    /// Level to raise to
    pub level: Level,
    /// Audit text stored on the alert and its history record
    pub reason: String,
}

/// Applies escalation policies to alerts
#[derive(Debug, Clone)]
pub struct Escalator {
    config: EscalationConfig,
}

impl Escalator {
    /// Create a new escalator
    pub fn new(config: EscalationConfig) -> Self {
        Self { config }
    }

    /// Raise `alert.level` if a policy applies. Returns true iff the level
    /// was raised, in which case `alert.escalation_reason` is set.
    pub fn maybe_escalate(
        &self,
        alert: &mut Alert,
        history: &AlertHistory,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(escalation) = self.evaluate(alert, history, now) else {
            return false;
        };

        info!(
            title = %alert.title,
            from = %alert.level,
            to = %escalation.level,
            reason = %escalation.reason,
            "Escalating alert"
        );

        alert.level = escalation.level;
        alert.escalation_reason = Some(escalation.reason);
        true
    }

    /// Decide without mutating
    pub fn evaluate(
        &self,
        alert: &Alert,
        history: &AlertHistory,
        now: DateTime<Utc>,
    ) -> Option<Escalation> {
        if !self.config.enabled {
            return None;
        }

        self.frequency(alert, history, now)
            .or_else(|| self.duration(alert, history, now))
            .or_else(|| self.persistence(alert, history, now))
    }

    fn frequency(
        &self,
        alert: &Alert,
        history: &AlertHistory,
        now: DateTime<Utc>,
    ) -> Option<Escalation> {
        let policy = &self.config.frequency;
        if !policy.enabled {
            return None;
        }

        let window = policy.time_window_minutes;
        let occurrences = history
            .recent(Duration::minutes(i64::from(window)), now)
            .iter()
            .filter(|r| r.matches(alert))
            .count();

        // Only the highest threshold met is considered
        let (_, target) = policy
            .ordered_thresholds()
            .into_iter()
            .find(|(count, _)| occurrences >= *count as usize)?;

        (target > alert.level).then(|| Escalation {
            level: target,
            reason: format!("Frequency escalation: {occurrences} occurrences in {window} minutes"),
        })
    }

    fn duration(
        &self,
        alert: &Alert,
        history: &AlertHistory,
        now: DateTime<Utc>,
    ) -> Option<Escalation> {
        let policy = &self.config.duration;
        if !policy.enabled {
            return None;
        }

        let first_seen = history.matching(alert).next()?.timestamp;
        let elapsed = (now - first_seen).num_seconds() as f64 / 60.0;

        let (_, target) = policy
            .ordered_thresholds()
            .into_iter()
            .find(|(minutes, _)| elapsed >= f64::from(*minutes))?;

        (target > alert.level).then(|| Escalation {
            level: target,
            reason: format!("Duration escalation: {elapsed:.1} minutes since first occurrence"),
        })
    }

    fn persistence(
        &self,
        alert: &Alert,
        history: &AlertHistory,
        now: DateTime<Utc>,
    ) -> Option<Escalation> {
        let policy = &self.config.persistence;
        if !policy.enabled || policy.check_interval_minutes == 0 || policy.max_checks == 0 {
            return None;
        }

        let interval_secs = i64::from(policy.check_interval_minutes) * 60;
        let lookback = Duration::minutes(i64::from(policy.lookback_minutes()));

        let intervals: BTreeSet<i64> = history
            .recent(lookback, now)
            .iter()
            .filter(|r| r.matches(alert) && r.timestamp <= now)
            .map(|r| (now - r.timestamp).num_seconds() / interval_secs)
            .collect();

        if intervals.len() < policy.max_checks as usize || policy.escalate_to <= alert.level {
            return None;
        }

        Some(Escalation {
            level: policy.escalate_to,
            reason: format!(
                "Persistent escalation: issue present in {} consecutive {}-min intervals",
                intervals.len(),
                policy.check_interval_minutes
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DurationPolicy, FrequencyPolicy, PersistencePolicy};
    use crate::models::{AlertRecord, ChannelKind};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    const TITLE: &str = "Tool X Unhealthy";
    const SOURCE: &str = "tool_monitor";

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn record(minutes_ago: i64, now: DateTime<Utc>) -> AlertRecord {
        AlertRecord {
            timestamp: now - Duration::minutes(minutes_ago),
            level: Level::Medium,
            title: TITLE.to_string(),
            source: SOURCE.to_string(),
            channels: vec![ChannelKind::Slack],
            success: true,
            escalated: false,
            escalation_reason: None,
        }
    }

    fn history(minutes_ago: &[i64], now: DateTime<Utc>) -> AlertHistory {
        AlertHistory::from_records(minutes_ago.iter().map(|m| record(*m, now)).collect())
    }

    fn alert(level: Level, now: DateTime<Utc>) -> Alert {
        let message = "Tool X is reporting unhealthy status";
        Alert::new(level, TITLE, message, SOURCE, now)
    }

    fn only_frequency(thresholds: &[(&str, Level)]) -> EscalationConfig {
        EscalationConfig {
            frequency: FrequencyPolicy {
                enabled: true,
                thresholds: thresholds
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), *v))
                    .collect(),
                time_window_minutes: 60,
            },
            duration: DurationPolicy {
                enabled: false,
                thresholds: BTreeMap::new(),
            },
            persistence: PersistencePolicy {
                enabled: false,
                ..PersistencePolicy::default()
            },
            ..EscalationConfig::default()
        }
    }

    fn only_duration() -> EscalationConfig {
        EscalationConfig {
            frequency: FrequencyPolicy {
                enabled: false,
                ..FrequencyPolicy::default()
            },
            persistence: PersistencePolicy {
                enabled: false,
                ..PersistencePolicy::default()
            },
            ..EscalationConfig::default()
        }
    }

    fn only_persistence() -> EscalationConfig {
        EscalationConfig {
            frequency: FrequencyPolicy {
                enabled: false,
                ..FrequencyPolicy::default()
            },
            duration: DurationPolicy {
                enabled: false,
                ..DurationPolicy::default()
            },
            ..EscalationConfig::default()
        }
    }

    #[test]
    fn test_frequency_escalates_on_third_occurrence() {
        let now = now();
        let escalator = Escalator::new(only_frequency(&[("3", Level::High)]));
        let mut alert = alert(Level::Medium, now);

        assert!(escalator.maybe_escalate(&mut alert, &history(&[50, 30, 10], now), now));
        assert_eq!(alert.level, Level::High);
        assert_eq!(
            alert.escalation_reason.as_deref(),
            Some("Frequency escalation: 3 occurrences in 60 minutes")
        );
    }

    #[test]
    fn test_frequency_ignores_records_outside_window() {
        let now = now();
        let escalator = Escalator::new(only_frequency(&[("3", Level::High)]));
        let mut alert = alert(Level::Medium, now);

        assert!(!escalator.maybe_escalate(&mut alert, &history(&[90, 30, 10], now), now));
        assert_eq!(alert.level, Level::Medium);
        assert!(alert.escalation_reason.is_none());
    }

    #[test]
    fn test_frequency_uses_highest_threshold_met() {
        let now = now();
        let escalator =
            Escalator::new(only_frequency(&[("3", Level::High), ("5", Level::Critical)]));
        let mut alert = alert(Level::Low, now);

        assert!(escalator.maybe_escalate(&mut alert, &history(&[1, 2, 3, 4, 5], now), now));
        assert_eq!(alert.level, Level::Critical);
    }

    #[test]
    fn test_never_lowers() {
        let now = now();
        let escalator = Escalator::new(only_frequency(&[("3", Level::High)]));
        let mut alert = alert(Level::Critical, now);

        assert!(!escalator.maybe_escalate(&mut alert, &history(&[1, 2, 3], now), now));
        assert_eq!(alert.level, Level::Critical);
    }

    #[test]
    fn test_duration_uses_first_occurrence() {
        let now = now();
        let escalator = Escalator::new(only_duration());
        let mut alert = alert(Level::Medium, now);

        assert!(escalator.maybe_escalate(&mut alert, &history(&[125, 5], now), now));
        assert_eq!(alert.level, Level::Critical);
        assert!(alert
            .escalation_reason
            .as_deref()
            .unwrap()
            .starts_with("Duration escalation: 125.0 minutes"));
    }

    #[test]
    fn test_duration_without_history_does_not_fire() {
        let now = now();
        let escalator = Escalator::new(only_duration());
        let mut alert = alert(Level::Medium, now);
        assert!(!escalator.maybe_escalate(&mut alert, &AlertHistory::new(), now));
    }

    #[test]
    fn test_persistence_needs_every_interval() {
        let now = now();
        let escalator = Escalator::new(only_persistence());

        let mut alert_a = alert(Level::Medium, now);
        assert!(escalator.maybe_escalate(&mut alert_a, &history(&[2, 20, 35, 50], now), now));
        assert_eq!(alert_a.level, Level::Critical);
        assert_eq!(
            alert_a.escalation_reason.as_deref(),
            Some("Persistent escalation: issue present in 4 consecutive 15-min intervals")
        );

        // Interval 1 (15-30 min ago) is missing
        let mut alert_b = alert(Level::Medium, now);
        assert!(!escalator.maybe_escalate(&mut alert_b, &history(&[2, 5, 35, 50], now), now));
    }

    #[test]
    fn test_first_applicable_policy_wins() {
        let now = now();
        let escalator = Escalator::new(EscalationConfig::default());
        let mut alert = alert(Level::Medium, now);

        // Three occurrences (frequency -> HIGH) spanning 125 minutes (duration -> CRITICAL)
        let history = history(&[125, 30, 10, 5], now);
        assert!(escalator.maybe_escalate(&mut alert, &history, now));
        assert_eq!(alert.level, Level::High);
        let reason = alert.escalation_reason.as_deref().unwrap();
        assert!(reason.starts_with("Frequency"), "{reason}");
    }

    #[test]
    fn test_falls_through_when_frequency_target_not_higher() {
        let now = now();
        let escalator = Escalator::new(EscalationConfig::default());
        let mut alert = alert(Level::High, now);

        let history = history(&[125, 30, 10, 5], now);
        assert!(escalator.maybe_escalate(&mut alert, &history, now));
        assert_eq!(alert.level, Level::Critical);
        let reason = alert.escalation_reason.as_deref().unwrap();
        assert!(reason.starts_with("Duration"), "{reason}");
    }

    #[test]
    fn test_disabled_master_switch() {
        let now = now();
        let mut config = EscalationConfig::default();
        config.enabled = false;
        let mut alert = alert(Level::Low, now);
        let history = history(&[1, 2, 3, 4, 5], now);
        assert!(!Escalator::new(config).maybe_escalate(&mut alert, &history, now));
    }
}
