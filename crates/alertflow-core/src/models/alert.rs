//! Alert data models

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alert severity level
///
/// Ordered `Low < Medium < High < Critical`; every comparison and sort in the
/// crate goes through this ordering.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum Level {
    /// Informational, routed to chat only by default
    #[default]
    Low,
    /// Degraded but not urgent
    Medium,
    /// Needs attention soon
    High,
    /// Needs attention now
    Critical,
}

impl Level {
    /// All levels in rank order
    pub const ALL: [Level; 4] = [Level::Low, Level::Medium, Level::High, Level::Critical];

    /// Upper-case name used in config documents and notifications
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Low => "LOW",
            Level::Medium => "MEDIUM",
            Level::High => "HIGH",
            Level::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(Level::Low),
            "MEDIUM" => Ok(Level::Medium),
            "HIGH" => Ok(Level::High),
            "CRITICAL" => Ok(Level::Critical),
            other => Err(format!("unknown alert level '{other}'")),
        }
    }
}

impl TryFrom<String> for Level {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Notification transport kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// SMTP email
    Email,
    /// Slack incoming webhook
    Slack,
    /// Generic JSON webhook
    Webhook,
}

impl ChannelKind {
    /// Lower-case name used in config documents and history records
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelKind::Email => "email",
            ChannelKind::Slack => "slack",
            ChannelKind::Webhook => "webhook",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single candidate notification, possibly a composite of correlated alerts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Severity level
    pub level: Level,

    /// Short title; together with `source` it identifies "the same alert"
    pub title: String,

    /// Human-readable message
    pub message: String,

    /// Subsystem that produced the alert (e.g. "tool_monitor")
    pub source: String,

    /// Tool the alert refers to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,

    /// Metric that breached its threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,

    /// Observed metric value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,

    /// Threshold the value was compared against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,

    /// Free-form detail text appended to notifications
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    /// When the alert was raised
    pub timestamp: DateTime<Utc>,

    /// Why the level was raised, set only by the escalator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_reason: Option<String>,

    /// Audit trail of merged alerts, set only on composite alerts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_group: Option<CorrelationGroup>,
}

impl Alert {
    /// Create a plain alert with no optional fields set
    pub fn new(
        level: Level,
        title: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
            source: source.into(),
            tool: None,
            metric: None,
            value: None,
            threshold: None,
            details: None,
            timestamp,
            escalation_reason: None,
            correlation_group: None,
        }
    }

    /// Attach the tool this alert refers to
    #[must_use]
    pub fn with_tool(mut self, tool: Option<&str>) -> Self {
        self.tool = tool.map(String::from);
        self
    }

    /// Attach the metric breach that produced this alert
    #[must_use]
    pub fn with_metric(mut self, metric: impl Into<String>, value: f64, threshold: f64) -> Self {
        self.metric = Some(metric.into());
        self.value = Some(value);
        self.threshold = Some(threshold);
        self
    }

    /// Attach detail text
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Whether the escalator raised this alert
    pub fn is_escalated(&self) -> bool {
        self.escalation_reason.is_some()
    }

    /// Whether this is a composite produced by the correlator
    pub fn is_correlated(&self) -> bool {
        self.correlation_group.is_some()
    }

    /// The outgoing form of an escalated alert: prefixed title, message
    /// headed by the escalation reason. Non-escalated alerts are returned
    /// unchanged.
    pub fn escalated_view(&self) -> Alert {
        let Some(reason) = &self.escalation_reason else {
            return self.clone();
        };

        let mut view = self.clone();
        view.title = format!("ESCALATED: {}", self.title);
        view.message = format!("🚨 ESCALATED ALERT 🚨\n{}\n\n{}", reason, self.message);
        view
    }
}

/// Summary of the raw alerts merged into one composite alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationGroup {
    /// Name of the pattern that matched
    pub pattern: String,

    /// Number of merged alerts
    pub alert_count: usize,

    /// Distinct producing subsystems, sorted
    pub sources: Vec<String>,

    /// Width of the correlation bucket
    pub time_window_minutes: u32,

    /// The merged alerts
    pub alerts: Vec<CorrelatedAlert>,
}

/// Audit entry for one member of a correlation group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelatedAlert {
    /// Member title
    pub title: String,
    /// Member level before grouping
    pub level: Level,
    /// Member source
    pub source: String,
    /// Member timestamp
    pub timestamp: DateTime<Utc>,
}

impl From<&Alert> for CorrelatedAlert {
    fn from(alert: &Alert) -> Self {
        Self {
            title: alert.title.clone(),
            level: alert.level,
            source: alert.source.clone(),
            timestamp: alert.timestamp,
        }
    }
}

/// Persisted trace of a sent (or attempted) alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    /// When the send was attempted
    pub timestamp: DateTime<Utc>,

    /// Level at send time (after escalation)
    pub level: Level,

    /// Un-prefixed alert title
    pub title: String,

    /// Producing subsystem
    #[serde(default)]
    pub source: String,

    /// Channels selected for delivery
    #[serde(default)]
    pub channels: Vec<ChannelKind>,

    /// Whether at least one channel delivered
    pub success: bool,

    /// Whether the alert went out on the escalated path
    #[serde(default)]
    pub escalated: bool,

    /// Escalation reason, if escalated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_reason: Option<String>,
}

impl AlertRecord {
    /// Build the history record for a delivery attempt
    pub fn for_alert(
        alert: &Alert,
        channels: Vec<ChannelKind>,
        success: bool,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            timestamp,
            level: alert.level,
            title: alert.title.clone(),
            source: alert.source.clone(),
            channels,
            success,
            escalated: alert.is_escalated(),
            escalation_reason: alert.escalation_reason.clone(),
        }
    }

    /// Whether this record traces the same alert identity
    pub fn matches(&self, alert: &Alert) -> bool {
        self.title == alert.title && self.source == alert.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_level_ordering() {
        assert!(Level::Low < Level::Medium);
        assert!(Level::Medium < Level::High);
        assert!(Level::High < Level::Critical);
        assert_eq!(Level::ALL.iter().max(), Some(&Level::Critical));
    }

    #[test]
    fn test_level_parsing_is_case_insensitive() {
        assert_eq!("critical".parse::<Level>(), Ok(Level::Critical));
        assert_eq!(" High ".parse::<Level>(), Ok(Level::High));
        assert!("urgent".parse::<Level>().is_err());

        let level: Level = serde_json::from_str("\"medium\"").unwrap();
        assert_eq!(level, Level::Medium);
        assert_eq!(serde_json::to_string(&Level::Low).unwrap(), "\"LOW\"");
    }

    #[test]
    fn test_escalated_view() {
        let mut alert = Alert::new(
            Level::High,
            "Tool X Unhealthy",
            "down",
            "tool_monitor",
            Utc::now(),
        );
        assert_eq!(alert.escalated_view(), alert);

        let reason = "Frequency escalation: 3 occurrences in 60 minutes";
        alert.escalation_reason = Some(reason.into());
        let view = alert.escalated_view();
        assert_eq!(view.title, "ESCALATED: Tool X Unhealthy");
        assert!(view.message.contains("3 occurrences"));
        assert!(view.message.ends_with("down"));
    }

    #[test]
    fn test_record_keeps_identity() {
        let mut alert = Alert::new(
            Level::Medium,
            "Disk Usage Alert (System)",
            "m",
            "custom_threshold_monitor",
            Utc::now(),
        );
        alert.escalation_reason = Some("because".into());
        let channels = vec![ChannelKind::Slack];
        let record = AlertRecord::for_alert(&alert, channels, true, Utc::now());

        assert!(record.escalated);
        assert!(record.matches(&alert));
        assert_eq!(record.title, "Disk Usage Alert (System)");
    }

    #[test]
    fn test_record_tolerates_legacy_fields() {
        let json = r#"{
            "timestamp": "2024-05-01T10:00:00Z",
            "level": "HIGH",
            "title": "t",
            "success": false
        }"#;
        let record: AlertRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.source, "");
        assert!(!record.escalated);
        assert!(record.channels.is_empty());
    }
}
