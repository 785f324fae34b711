//! Channel routing and delivery
//!
//! Normal alerts go to the channels their level routes to. Escalated alerts
//! go to the union of those channels and the forced escalation channels, in
//! their escalated presentation. Every attempt is recorded in the history.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};

use crate::models::{Alert, AlertRecord, ChannelKind, Level};

use super::history::AlertHistory;
use super::notifier::{NotificationError, NotificationResult, Notifier};

/// Outcome of one dispatch
#[derive(Debug, Clone)]
pub struct DispatchReport {
    /// At least one channel delivered
    pub success: bool,
    /// Channels selected by routing
    pub channels: Vec<ChannelKind>,
    /// Per-channel results for channels that have a notifier
    pub results: Vec<NotificationResult>,
}

/// Routes alerts to notifiers and records the outcome
pub struct Dispatcher {
    routes: BTreeMap<Level, Vec<ChannelKind>>,
    force_channels: Vec<ChannelKind>,
    notifiers: Vec<Box<dyn Notifier>>,
    timeout: Duration,
}

impl Dispatcher {
    /// Create a new dispatcher
    pub fn new(
        routes: BTreeMap<Level, Vec<ChannelKind>>,
        force_channels: Vec<ChannelKind>,
        notifiers: Vec<Box<dyn Notifier>>,
        timeout: Duration,
    ) -> Self {
        Self {
            routes,
            force_channels,
            notifiers,
            timeout,
        }
    }

    /// Channels with a live notifier
    pub fn enabled_channels(&self) -> Vec<ChannelKind> {
        self.notifiers.iter().map(|n| n.channel()).collect()
    }

    /// Channels an alert would be routed to
    pub fn channels_for(&self, alert: &Alert) -> Vec<ChannelKind> {
        let mut channels = self.routes.get(&alert.level).cloned().unwrap_or_default();

        if alert.is_escalated() {
            for channel in &self.force_channels {
                if !channels.contains(channel) {
                    channels.push(*channel);
                }
            }
        }

        channels
    }

    /// Deliver `alert` and append its record to `history`, whatever the
    /// outcome.
    pub async fn send(
        &self,
        alert: &Alert,
        history: &mut AlertHistory,
        now: DateTime<Utc>,
    ) -> DispatchReport {
        let channels = self.channels_for(alert);
        let outgoing = alert.escalated_view();

        let mut results = Vec::with_capacity(channels.len());
        for channel in &channels {
            let Some(notifier) = self.notifiers.iter().find(|n| n.channel() == *channel) else {
                debug!(channel = %channel, title = %alert.title, "Channel not enabled, skipping");
                continue;
            };
            results.push(self.deliver(notifier.as_ref(), &outgoing).await);
        }

        let success = results.iter().any(|r| r.success);
        if channels.is_empty() {
            warn!(level = %alert.level, title = %alert.title, "No channels routed for alert level");
        }

        history.append(AlertRecord::for_alert(alert, channels.clone(), success, now));

        DispatchReport {
            success,
            channels,
            results,
        }
    }

    /// Deliver to every enabled channel, bypassing routing and history
    pub async fn send_to_all(&self, alert: &Alert) -> Vec<NotificationResult> {
        let mut results = Vec::with_capacity(self.notifiers.len());
        for notifier in &self.notifiers {
            results.push(self.deliver(notifier.as_ref(), alert).await);
        }
        results
    }

    async fn deliver(&self, notifier: &dyn Notifier, alert: &Alert) -> NotificationResult {
        let channel = notifier.channel();
        let sent_at = Utc::now();

        let delivery = tokio::time::timeout(self.timeout, notifier.deliver(alert));
        let outcome = match delivery.await {
            Ok(outcome) => outcome,
            Err(_) => Err(NotificationError::Timeout(self.timeout)),
        };

        if let Err(e) = &outcome {
            error!(channel = %channel, title = %alert.title, error = %e, "Notification failed");
        }

        NotificationResult {
            channel,
            success: outcome.is_ok(),
            error: outcome.err().map(|e| e.to_string()),
            sent_at,
        }
    }
}
