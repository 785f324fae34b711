//! Send throttling: a global hourly rate limit plus a global cooldown

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::warn;

use crate::config::ThrottlingConfig;
use crate::models::Alert;

use super::history::AlertHistory;

/// Why a send was held back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// Send may proceed
    Allow,
    /// `max_alerts_per_hour` already reached
    RateLimited {
        /// Sends in the rolling hour, failed attempts included
        sent_last_hour: usize,
        /// Configured hourly limit
        limit: usize,
    },
    /// Another alert went out less than `cooldown_minutes` ago
    Cooldown {
        /// Time until the cooldown ends
        remaining: Duration,
    },
}

/// Snapshot of throttle state for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct ThrottleStatus {
    /// Sends recorded in the last 60 minutes
    pub sent_last_hour: usize,
    /// Configured hourly limit
    pub max_alerts_per_hour: usize,
    /// Configured cooldown length
    pub cooldown_minutes: u32,
    /// Seconds until the cooldown ends, if one is active
    pub cooldown_remaining_seconds: Option<i64>,
}

/// Rate limit and cooldown gate for the normal send path
#[derive(Debug, Clone)]
pub struct ThrottleGate {
    config: ThrottlingConfig,
}

impl ThrottleGate {
    /// Create a new gate
    pub fn new(config: ThrottlingConfig) -> Self {
        Self { config }
    }

    /// Decide whether a send may proceed now
    pub fn check(&self, history: &AlertHistory, now: DateTime<Utc>) -> ThrottleDecision {
        let sent_last_hour = history.recent(Duration::hours(1), now).len();
        if sent_last_hour >= self.config.max_alerts_per_hour {
            return ThrottleDecision::RateLimited {
                sent_last_hour,
                limit: self.config.max_alerts_per_hour,
            };
        }

        if let Some(remaining) = self.cooldown_remaining(history, now) {
            return ThrottleDecision::Cooldown { remaining };
        }

        ThrottleDecision::Allow
    }

    /// Whether `alert` may be sent now; logs the reason when it may not
    pub fn allow(&self, alert: &Alert, history: &AlertHistory, now: DateTime<Utc>) -> bool {
        match self.check(history, now) {
            ThrottleDecision::Allow => true,
            ThrottleDecision::RateLimited { sent_last_hour, limit } => {
                warn!(
                    title = %alert.title,
                    sent_last_hour,
                    limit,
                    "Alert throttled: too many alerts in the last hour"
                );
                false
            }
            ThrottleDecision::Cooldown { remaining } => {
                warn!(
                    title = %alert.title,
                    remaining_seconds = remaining.num_seconds(),
                    "Alert throttled: cooldown period active"
                );
                false
            }
        }
    }

    /// Current throttle state
    pub fn status(&self, history: &AlertHistory, now: DateTime<Utc>) -> ThrottleStatus {
        ThrottleStatus {
            sent_last_hour: history.recent(Duration::hours(1), now).len(),
            max_alerts_per_hour: self.config.max_alerts_per_hour,
            cooldown_minutes: self.config.cooldown_minutes,
            cooldown_remaining_seconds: self
                .cooldown_remaining(history, now)
                .map(|d| d.num_seconds()),
        }
    }

    fn cooldown_remaining(&self, history: &AlertHistory, now: DateTime<Utc>) -> Option<Duration> {
        let cooldown = Duration::minutes(i64::from(self.config.cooldown_minutes));
        let last = history.last()?.timestamp;
        let ends = last + cooldown;
        (ends > now).then(|| ends - now)
    }
}
