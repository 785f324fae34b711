//! Configuration management for AlertFlow
//!
//! The built-in defaults form the base layer. A JSON document and
//! `ALERTFLOW__SECTION__KEY` environment variables are merged on top of them
//! key by key, so a document only needs to name what it changes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::{ChannelKind, Level, MetricSnapshot};

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "ALERTFLOW";

/// Config file name inside the platform config directory
pub const CONFIG_FILE_NAME: &str = "alertflow.json";

/// History file name inside the platform data directory
pub const HISTORY_FILE_NAME: &str = "alert_history.json";

/// Environment used when a requested one is not defined
pub const FALLBACK_ENVIRONMENT: &str = "development";

/// Tool profile used when a tool has no profile of its own
pub const DEFAULT_TOOL_PROFILE: &str = "default";

/// Longest accepted history retention (ten years)
pub const MAX_RETENTION_HOURS: u32 = 24 * 365 * 10;

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Notification transports
    pub notifications: NotificationsConfig,

    /// Level -> channels routing table
    pub routing: BTreeMap<Level, Vec<ChannelKind>>,

    /// Rate limit and cooldown
    pub throttling: ThrottlingConfig,

    /// Escalation policies
    pub escalation: EscalationConfig,

    /// Correlation rules
    pub correlation: CorrelationConfig,

    /// Threshold profiles
    pub thresholds: ThresholdConfig,

    /// Alert history store
    pub history: HistoryConfig,

    /// Batch processing limits
    pub processing: ProcessingConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            notifications: NotificationsConfig::default(),
            routing: default_routing(),
            throttling: ThrottlingConfig::default(),
            escalation: EscalationConfig::default(),
            correlation: CorrelationConfig::default(),
            thresholds: ThresholdConfig::default(),
            history: HistoryConfig::default(),
            processing: ProcessingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_routing() -> BTreeMap<Level, Vec<ChannelKind>> {
    BTreeMap::from([
        (Level::Critical, vec![ChannelKind::Email, ChannelKind::Slack]),
        (Level::High, vec![ChannelKind::Email, ChannelKind::Slack]),
        (Level::Medium, vec![ChannelKind::Slack]),
        (Level::Low, vec![ChannelKind::Slack]),
    ])
}

impl Config {
    /// Load configuration: defaults, then the document at `path` (if any),
    /// then environment overrides. The result is validated.
    ///
    /// Layers are merged as JSON values so map keys such as tool and
    /// environment names keep their case.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut merged = serde_json::to_value(Config::default())?;

        if let Some(path) = path {
            debug!(path = %path.display(), "Merging configuration document");
            let raw = std::fs::read_to_string(path).map_err(|e| {
                Error::config(format!("cannot read {}: {e}", path.display()))
            })?;
            let document: serde_json::Value = serde_json::from_str(&raw).map_err(|e| {
                Error::config(format!("{} is not valid JSON: {e}", path.display()))
            })?;
            if !document.is_object() {
                return Err(Error::config(format!("{} is not a JSON object", path.display())));
            }
            merge_values(&mut merged, document);
        }

        let overrides = config::Config::builder()
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<serde_json::Value>()?;
        merge_values(&mut merged, overrides);

        let config: Config = serde_json::from_value(merged)
            .map_err(|e| Error::config(format!("invalid configuration: {e}")))?;
        config.validate()
    }

    /// Platform default location of the config document
    pub fn default_path() -> PathBuf {
        project_dirs()
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
    }

    /// Reject unusable settings and widen the history retention so every
    /// escalation lookback is covered.
    pub fn validate(mut self) -> Result<Self> {
        if self.correlation.time_window_minutes == 0 {
            return Err(Error::config("correlation.time_window_minutes must be positive"));
        }
        if self.correlation.max_group_size < 2 {
            return Err(Error::config("correlation.max_group_size must be at least 2"));
        }

        if self.history.retention_hours > MAX_RETENTION_HOURS {
            return Err(Error::config(format!(
                "history.retention_hours must not exceed {MAX_RETENTION_HOURS}"
            )));
        }

        let persistence = &self.escalation.persistence;
        let empty_window = persistence.check_interval_minutes == 0 || persistence.max_checks == 0;
        if persistence.enabled && empty_window {
            return Err(Error::config(
                "escalation.persistence needs a positive check_interval_minutes and max_checks",
            ));
        }

        if self.thresholds.environments.is_empty() {
            return Err(Error::config(
                "thresholds.environments must define at least one environment",
            ));
        }
        if self
            .thresholds
            .environment(&self.thresholds.current_environment)
            .is_none()
        {
            return Err(Error::config(format!(
                "thresholds.current_environment '{}' is not defined",
                self.thresholds.current_environment
            )));
        }

        let lookback_hours = self.escalation.max_lookback_minutes().div_ceil(60);
        if lookback_hours > self.history.retention_hours {
            warn!(
                configured = self.history.retention_hours,
                required = lookback_hours,
                "Widening history retention to cover escalation lookback"
            );
            self.history.retention_hours = lookback_hours;
        }

        Ok(self)
    }

    /// Resolved history file path
    pub fn history_path(&self) -> PathBuf {
        self.history.path.clone().unwrap_or_else(|| {
            project_dirs()
                .map(|dirs| dirs.data_dir().join(HISTORY_FILE_NAME))
                .unwrap_or_else(|| PathBuf::from(HISTORY_FILE_NAME))
        })
    }
}

/// Deep-merge `overlay` into `base`. Objects merge key by key; any other
/// value replaces what it overlays.
fn merge_values(base: &mut serde_json::Value, overlay: serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base), serde_json::Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Persist `thresholds.current_environment` into the document at `path`,
/// leaving every other key in the document as it was.
pub fn persist_environment(path: &Path, environment: &str) -> Result<()> {
    let mut document = match std::fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str::<serde_json::Value>(&raw)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => serde_json::json!({}),
        Err(e) => return Err(e.into()),
    };

    let root = document
        .as_object_mut()
        .ok_or_else(|| Error::config(format!("{} is not a JSON object", path.display())))?;
    let thresholds = root
        .entry("thresholds")
        .or_insert_with(|| serde_json::json!({}));
    let thresholds = thresholds
        .as_object_mut()
        .ok_or_else(|| Error::config("thresholds must be a JSON object"))?;
    thresholds.insert(
        "current_environment".to_string(),
        serde_json::Value::String(environment.to_string()),
    );

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, serde_json::to_string_pretty(&document)?)?;
    Ok(())
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "alertflow")
}

/// Notification transports
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    /// Per-delivery timeout in seconds
    pub timeout_seconds: u64,
    /// SMTP email
    pub email: EmailConfig,
    /// Slack incoming webhook
    pub slack: SlackConfig,
    /// Generic JSON webhook
    pub webhook: WebhookConfig,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 10,
            email: EmailConfig::default(),
            slack: SlackConfig::default(),
            webhook: WebhookConfig::default(),
        }
    }
}

/// SMTP email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    /// Deliver over SMTP
    pub enabled: bool,
    /// SMTP relay host
    pub smtp_server: String,
    /// SMTP port; STARTTLS is used
    pub smtp_port: u16,
    /// SMTP login; empty skips authentication
    pub username: String,
    /// SMTP password
    pub password: String,
    /// Sender address
    pub from_email: String,
    /// Recipient addresses
    pub to_emails: Vec<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_server: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            username: String::new(),
            password: String::new(),
            from_email: String::new(),
            to_emails: Vec::new(),
        }
    }
}

/// Slack webhook configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    /// Deliver to Slack
    pub enabled: bool,
    /// Incoming-webhook URL
    pub webhook_url: String,
    /// Target channel
    pub channel: String,
    /// Display name of the poster
    pub username: String,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            webhook_url: String::new(),
            channel: "#alerts".to_string(),
            username: "Tool Monitor".to_string(),
        }
    }
}

/// Generic webhook configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Deliver to the webhook
    pub enabled: bool,
    /// Endpoint receiving the alert as JSON
    pub url: String,
    /// Extra request headers
    pub headers: BTreeMap<String, String>,
}

/// Throttling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottlingConfig {
    /// Sends allowed in any rolling 60-minute window
    pub max_alerts_per_hour: usize,
    /// Global quiet period after any send, in minutes
    pub cooldown_minutes: u32,
}

impl Default for ThrottlingConfig {
    fn default() -> Self {
        Self {
            max_alerts_per_hour: 10,
            cooldown_minutes: 5,
        }
    }
}

/// Escalation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    /// Master switch
    pub enabled: bool,
    /// Repeat-count policy
    pub frequency: FrequencyPolicy,
    /// Time-since-first-seen policy
    pub duration: DurationPolicy,
    /// Presence-in-every-interval policy
    pub persistence: PersistencePolicy,
    /// Channels always included for escalated alerts
    pub force_channels: Vec<ChannelKind>,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            frequency: FrequencyPolicy::default(),
            duration: DurationPolicy::default(),
            persistence: PersistencePolicy::default(),
            force_channels: vec![ChannelKind::Email, ChannelKind::Slack],
        }
    }
}

impl EscalationConfig {
    /// Longest history lookback any enabled policy needs, in minutes
    pub fn max_lookback_minutes(&self) -> u32 {
        let mut lookback = 0;
        if self.frequency.enabled {
            lookback = lookback.max(self.frequency.time_window_minutes);
        }
        if self.duration.enabled {
            let longest = self
                .duration
                .ordered_thresholds()
                .first()
                .map_or(0, |(minutes, _)| *minutes);
            lookback = lookback.max(longest);
        }
        if self.persistence.enabled {
            lookback = lookback.max(self.persistence.lookback_minutes());
        }
        lookback
    }
}

/// Frequency escalation: N occurrences within a window raise the level
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrequencyPolicy {
    /// Apply this policy
    pub enabled: bool,
    /// Occurrence count (as a string key) -> target level
    pub thresholds: BTreeMap<String, Level>,
    /// Lookback for counting occurrences
    pub time_window_minutes: u32,
}

impl Default for FrequencyPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            thresholds: BTreeMap::from([
                ("3".to_string(), Level::High),
                ("5".to_string(), Level::Critical),
            ]),
            time_window_minutes: 60,
        }
    }
}

impl FrequencyPolicy {
    /// Thresholds sorted highest count first
    pub fn ordered_thresholds(&self) -> Vec<(u32, Level)> {
        ordered(&self.thresholds)
    }
}

/// Duration escalation: minutes since first occurrence raise the level
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DurationPolicy {
    /// Apply this policy
    pub enabled: bool,
    /// Elapsed minutes (as a string key) -> target level
    pub thresholds: BTreeMap<String, Level>,
}

impl Default for DurationPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            thresholds: BTreeMap::from([
                ("30".to_string(), Level::High),
                ("120".to_string(), Level::Critical),
            ]),
        }
    }
}

impl DurationPolicy {
    /// Thresholds sorted longest duration first
    pub fn ordered_thresholds(&self) -> Vec<(u32, Level)> {
        ordered(&self.thresholds)
    }
}

/// Persistence escalation: present in every check interval of the lookback
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistencePolicy {
    /// Apply this policy
    pub enabled: bool,
    /// Width of one check interval
    pub check_interval_minutes: u32,
    /// Number of consecutive intervals inspected
    pub max_checks: u32,
    /// Level applied when every interval has an occurrence
    pub escalate_to: Level,
}

impl Default for PersistencePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_minutes: 15,
            max_checks: 4,
            escalate_to: Level::Critical,
        }
    }
}

impl PersistencePolicy {
    /// `check_interval_minutes × max_checks`
    pub fn lookback_minutes(&self) -> u32 {
        self.check_interval_minutes.saturating_mul(self.max_checks)
    }
}

/// Parse string-keyed thresholds, skipping keys that are not integers
fn ordered(thresholds: &BTreeMap<String, Level>) -> Vec<(u32, Level)> {
    let mut items: Vec<(u32, Level)> = thresholds
        .iter()
        .filter_map(|(key, level)| match key.trim().parse::<u32>() {
            Ok(n) => Some((n, *level)),
            Err(_) => {
                debug!(key = %key, "Skipping non-integer escalation threshold");
                None
            }
        })
        .collect();
    items.sort_by(|a, b| b.0.cmp(&a.0));
    items
}

/// Correlation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    /// Pass alerts through unchanged when false
    pub enabled: bool,
    /// Bucket width in minutes
    pub time_window_minutes: u32,
    /// Largest composite a single pattern may produce
    pub max_group_size: usize,
    /// Patterns, tried in declaration order
    pub patterns: Vec<CorrelationPattern>,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        let resource_sources = ["system_monitor", "tool_monitor", "custom_threshold_monitor"];
        Self {
            enabled: true,
            time_window_minutes: 10,
            max_group_size: 5,
            patterns: vec![
                CorrelationPattern::new(
                    "disk_issues",
                    &["disk", "space", "storage", "filesystem"],
                    &resource_sources,
                    "Storage System Issues",
                    Level::High,
                ),
                CorrelationPattern::new(
                    "memory_issues",
                    &["memory", "ram", "swap", "out of memory"],
                    &resource_sources,
                    "Memory Resource Issues",
                    Level::High,
                ),
                CorrelationPattern::new(
                    "network_issues",
                    &["network", "connection", "timeout", "dns"],
                    &resource_sources,
                    "Network Connectivity Issues",
                    Level::Medium,
                ),
                CorrelationPattern::new(
                    "tool_failures",
                    &["unhealthy", "failed", "error", "crash"],
                    &["tool_monitor", "predictive_monitor"],
                    "Tool Health Issues",
                    Level::High,
                ),
            ],
        }
    }
}

/// A named rule for merging related alerts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationPattern {
    /// Pattern name, recorded in composite details
    pub name: String,
    /// Lower-case substrings searched for in title and message
    pub keywords: Vec<String>,
    /// Producing subsystems this pattern applies to
    pub sources: Vec<String>,
    /// Title of the composite alert
    pub group_title: String,
    /// Floor for the composite level; never lowers it
    pub group_level: Option<Level>,
}

impl CorrelationPattern {
    /// Build a pattern from string slices
    pub fn new(
        name: &str,
        keywords: &[&str],
        sources: &[&str],
        group_title: &str,
        group_level: Level,
    ) -> Self {
        Self {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            sources: sources.iter().map(|s| (*s).to_string()).collect(),
            group_title: group_title.to_string(),
            group_level: Some(group_level),
        }
    }
}

/// Threshold profiles
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Disables threshold evaluation entirely when false
    pub enabled: bool,
    /// Environment profile applied by default
    pub current_environment: String,
    /// Environment name -> metric thresholds
    pub environments: BTreeMap<String, MetricSnapshot>,
    /// Tool name -> metric thresholds (`default` applies to unlisted tools)
    pub tools: BTreeMap<String, MetricSnapshot>,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            current_environment: FALLBACK_ENVIRONMENT.to_string(),
            environments: BTreeMap::from([
                (
                    "development".to_string(),
                    profile(&[
                        ("disk_usage_percent", 90.0),
                        ("memory_usage_percent", 85.0),
                        ("cpu_usage_percent", 80.0),
                        ("network_latency_ms", 500.0),
                        ("tool_health_score", 0.7),
                    ]),
                ),
                (
                    "staging".to_string(),
                    profile(&[
                        ("disk_usage_percent", 85.0),
                        ("memory_usage_percent", 80.0),
                        ("cpu_usage_percent", 75.0),
                        ("network_latency_ms", 300.0),
                        ("tool_health_score", 0.8),
                    ]),
                ),
                (
                    "production".to_string(),
                    profile(&[
                        ("disk_usage_percent", 80.0),
                        ("memory_usage_percent", 75.0),
                        ("cpu_usage_percent", 70.0),
                        ("network_latency_ms", 200.0),
                        ("tool_health_score", 0.9),
                    ]),
                ),
            ]),
            tools: BTreeMap::from([
                (
                    DEFAULT_TOOL_PROFILE.to_string(),
                    profile(&[
                        ("response_time_ms", 1000.0),
                        ("error_rate_percent", 5.0),
                        ("uptime_percent", 99.5),
                        ("memory_mb", 500.0),
                        ("cpu_percent", 50.0),
                    ]),
                ),
                (
                    "CodingReviewer".to_string(),
                    profile(&[
                        ("response_time_ms", 2000.0),
                        ("error_rate_percent", 2.0),
                        ("uptime_percent", 99.9),
                        ("memory_mb", 1000.0),
                        ("cpu_percent", 60.0),
                    ]),
                ),
                (
                    "PlannerApp".to_string(),
                    profile(&[
                        ("response_time_ms", 1500.0),
                        ("error_rate_percent", 3.0),
                        ("uptime_percent", 99.7),
                        ("memory_mb", 800.0),
                        ("cpu_percent", 55.0),
                    ]),
                ),
                (
                    "AvoidObstaclesGame".to_string(),
                    profile(&[
                        ("response_time_ms", 100.0),
                        ("error_rate_percent", 1.0),
                        ("uptime_percent", 99.8),
                        ("memory_mb", 200.0),
                        ("cpu_percent", 40.0),
                    ]),
                ),
            ]),
        }
    }
}

fn profile(entries: &[(&str, f64)]) -> MetricSnapshot {
    entries
        .iter()
        .map(|(name, value)| ((*name).to_string(), *value))
        .collect()
}

impl ThresholdConfig {
    /// Look up an environment profile by name (exact, then case-insensitive)
    pub fn environment(&self, name: &str) -> Option<&MetricSnapshot> {
        lookup(&self.environments, name)
    }

    /// Environment profile, falling back to `development`
    pub fn environment_or_fallback(&self, name: &str) -> &MetricSnapshot {
        static EMPTY: MetricSnapshot = MetricSnapshot::new();

        self.environment(name)
            .or_else(|| {
                warn!(environment = %name, "Unknown environment, using {}", FALLBACK_ENVIRONMENT);
                self.environment(FALLBACK_ENVIRONMENT)
            })
            .unwrap_or(&EMPTY)
    }

    /// Tool profile, falling back to the `default` profile
    pub fn tool(&self, name: &str) -> Option<&MetricSnapshot> {
        lookup(&self.tools, name).or_else(|| self.tools.get(DEFAULT_TOOL_PROFILE))
    }

    /// Environment defaults overridden by tool-specific values
    pub fn resolve(&self, environment: &str, tool: Option<&str>) -> MetricSnapshot {
        let mut resolved = self.environment_or_fallback(environment).clone();
        if let Some(overrides) = tool.and_then(|tool| self.tool(tool)) {
            resolved.extend(overrides.iter().map(|(k, v)| (k.clone(), *v)));
        }
        resolved
    }
}

fn lookup<'a>(map: &'a BTreeMap<String, MetricSnapshot>, name: &str) -> Option<&'a MetricSnapshot> {
    map.get(name).or_else(|| {
        map.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    })
}

/// History store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// History file location (platform data dir when unset)
    pub path: Option<PathBuf>,
    /// Records older than this are pruned
    pub retention_hours: u32,
    /// Newest records kept in the file
    pub max_records: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: None,
            retention_hours: 24,
            max_records: 1000,
        }
    }
}

/// Batch processing configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Abort dispatching once a batch has run this long
    pub batch_deadline_seconds: Option<u64>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (json or pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        let config = Config::default().validate().unwrap();
        assert_eq!(config.history.retention_hours, 24);
        assert_eq!(config.escalation.max_lookback_minutes(), 120);
        assert_eq!(
            config.escalation.frequency.ordered_thresholds(),
            vec![(5, Level::Critical), (3, Level::High)]
        );
    }

    #[test]
    fn test_retention_widened_to_lookback() {
        let mut config = Config::default();
        config.escalation.persistence.check_interval_minutes = 60;
        config.escalation.persistence.max_checks = 30;

        let config = config.validate().unwrap();
        assert_eq!(config.history.retention_hours, 30);
    }

    #[test]
    fn test_rejects_unknown_current_environment() {
        let mut config = Config::default();
        config.thresholds.current_environment = "qa".to_string();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_zero_window() {
        let mut config = Config::default();
        config.correlation.time_window_minutes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_integer_threshold_keys_skipped() {
        let policy = FrequencyPolicy {
            enabled: true,
            thresholds: BTreeMap::from([
                ("often".to_string(), Level::Critical),
                ("2".to_string(), Level::Medium),
            ]),
            time_window_minutes: 30,
        };
        assert_eq!(policy.ordered_thresholds(), vec![(2, Level::Medium)]);
    }

    #[test]
    fn test_resolve_tool_overrides_environment() {
        let mut thresholds = ThresholdConfig::default();
        thresholds
            .tools
            .get_mut("CodingReviewer")
            .unwrap()
            .insert("cpu_usage_percent".to_string(), 95.0);

        let resolved = thresholds.resolve("development", Some("CodingReviewer"));
        assert_eq!(resolved["cpu_usage_percent"], 95.0);
        assert_eq!(resolved["disk_usage_percent"], 90.0);
        assert_eq!(resolved["response_time_ms"], 2000.0);

        let unknown_tool = thresholds.resolve("production", Some("Mystery"));
        assert_eq!(unknown_tool["response_time_ms"], 1000.0);
        assert_eq!(unknown_tool["disk_usage_percent"], 80.0);

        let unknown_env = thresholds.resolve("moon", None);
        assert_eq!(unknown_env["disk_usage_percent"], 90.0);
    }

    #[test]
    fn test_load_merges_document_over_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "throttling": {{ "cooldown_minutes": 1 }},
                "thresholds": {{
                    "current_environment": "production",
                    "environments": {{ "production": {{ "disk_usage_percent": 70 }} }}
                }}
            }}"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.throttling.cooldown_minutes, 1);
        assert_eq!(config.throttling.max_alerts_per_hour, 10);
        assert_eq!(config.thresholds.current_environment, "production");

        let production = config.thresholds.environment("production").unwrap();
        assert_eq!(production["disk_usage_percent"], 70.0);
        assert_eq!(production["cpu_usage_percent"], 70.0);
        assert!(config.thresholds.environment("staging").is_some());
        assert_eq!(config.correlation.patterns.len(), 4);
    }

    #[test]
    fn test_load_keeps_map_key_case() {
        let defaults = Config::load(None).unwrap();
        let tools: Vec<&str> = defaults
            .thresholds
            .tools
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(
            tools,
            vec!["AvoidObstaclesGame", "CodingReviewer", "PlannerApp", "default"],
        );

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "thresholds": {{
                    "current_environment": "QA-Lab",
                    "environments": {{ "QA-Lab": {{ "disk_usage_percent": 60 }} }},
                    "tools": {{ "ReportBuilder": {{ "response_time_ms": 750 }} }}
                }}
            }}"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.thresholds.current_environment, "QA-Lab");
        assert!(config.thresholds.environments.contains_key("QA-Lab"));
        assert!(config.thresholds.environments.contains_key("development"));
        let builder = &config.thresholds.tools["ReportBuilder"];
        assert_eq!(builder["response_time_ms"], 750.0);
        assert!(config.thresholds.tools.contains_key("CodingReviewer"));
    }

    #[test]
    fn test_load_rejects_non_object_document() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[1, 2, 3]").unwrap();
        assert!(matches!(Config::load(Some(file.path())), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_unbounded_retention() {
        let mut config = Config::default();
        config.history.retention_hours = u32::MAX;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.history.retention_hours = MAX_RETENTION_HOURS;
        let validated = config.validate().unwrap();
        assert_eq!(validated.history.retention_hours, MAX_RETENTION_HOURS);
    }

    #[test]
    fn test_persist_environment_preserves_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alertflow.json");
        std::fs::write(&path, r#"{"throttling":{"cooldown_minutes":2}}"#).unwrap();

        persist_environment(&path, "staging").unwrap();

        let document: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(document["thresholds"]["current_environment"], "staging");
        assert_eq!(document["throttling"]["cooldown_minutes"], 2);
    }
}
