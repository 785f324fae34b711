//! Notification delivery for alerts

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::{EmailConfig, NotificationsConfig, SlackConfig, WebhookConfig};
use crate::error::{Error, Result};
use crate::models::{Alert, ChannelKind, Level};

/// A notification transport
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Channel this notifier delivers to
    fn channel(&self) -> ChannelKind;

    /// Deliver one alert
    async fn deliver(&self, alert: &Alert) -> std::result::Result<(), NotificationError>;
}

/// Result of sending a notification
#[derive(Debug, Clone)]
pub struct NotificationResult {
    /// Channel the attempt went to
    pub channel: ChannelKind,
    /// Whether the channel accepted the alert
    pub success: bool,
    /// Failure description, if any
    pub error: Option<String>,
    /// When the attempt finished
    pub sent_at: DateTime<Utc>,
}

impl NotificationResult {
    /// The failure as a transport error, if delivery failed
    pub fn as_error(&self) -> Option<Error> {
        if self.success {
            return None;
        }
        Some(Error::transport(
            self.channel.as_str(),
            self.error
                .clone()
                .unwrap_or_else(|| "unknown error".to_string()),
        ))
    }
}

/// Notification errors
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    /// Request failed or the endpoint answered with a non-2xx status
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// SMTP relay rejected or dropped the message
    #[error("SMTP error: {0}")]
    SmtpError(String),

    /// Channel settings cannot produce a valid request
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Delivery exceeded the per-channel timeout
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

/// Build a notifier for every enabled channel
pub fn build_notifiers(config: &NotificationsConfig) -> Result<Vec<Box<dyn Notifier>>> {
    let timeout = Duration::from_secs(config.timeout_seconds);
    let mut notifiers: Vec<Box<dyn Notifier>> = Vec::new();

    if config.email.enabled {
        notifiers.push(Box::new(EmailNotifier::new(config.email.clone(), timeout)?));
    }

    if config.slack.enabled || config.webhook.enabled {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to create HTTP client: {e}")))?;

        if config.slack.enabled {
            notifiers.push(Box::new(SlackNotifier::new(client.clone(), config.slack.clone())?));
        }
        if config.webhook.enabled {
            notifiers.push(Box::new(WebhookNotifier::new(client, config.webhook.clone())?));
        }
    }

    debug!(count = notifiers.len(), "Built notifiers");
    Ok(notifiers)
}

/// Slack incoming-webhook notifier
pub struct SlackNotifier {
    client: Client,
    config: SlackConfig,
}

impl SlackNotifier {
    /// Create a new Slack notifier
    pub fn new(client: Client, config: SlackConfig) -> Result<Self> {
        if config.webhook_url.is_empty() {
            return Err(Error::config(
                "notifications.slack.webhook_url is required when Slack is enabled",
            ));
        }
        Ok(Self { client, config })
    }

    fn payload(&self, alert: &Alert) -> SlackPayload {
        let color = match alert.level {
            Level::Critical => "#ff0000",
            Level::High => "#ff8000",
            Level::Medium => "#ffff00",
            Level::Low => "#00ff00",
        };

        let mut fields = vec![
            SlackField {
                title: "Level".to_string(),
                value: alert.level.to_string(),
                short: true,
            },
            SlackField {
                title: "Source".to_string(),
                value: alert.source.clone(),
                short: true,
            },
        ];

        if let Some(tool) = &alert.tool {
            fields.push(SlackField {
                title: "Tool".to_string(),
                value: tool.clone(),
                short: true,
            });
        }

        if let (Some(value), Some(threshold)) = (alert.value, alert.threshold) {
            fields.push(SlackField {
                title: "Value / Threshold".to_string(),
                value: format!("{value} / {threshold}"),
                short: true,
            });
        }

        if let Some(details) = &alert.details {
            fields.push(SlackField {
                title: "Details".to_string(),
                value: format!("```{details}```"),
                short: false,
            });
        }

        SlackPayload {
            channel: Some(self.config.channel.clone()).filter(|c| !c.is_empty()),
            username: Some(self.config.username.clone()).filter(|u| !u.is_empty()),
            attachments: vec![SlackAttachment {
                color: color.to_string(),
                title: format!("🚨 {}", alert.title),
                text: alert.message.clone(),
                fields,
                footer: Some("AlertFlow".to_string()),
                ts: Some(alert.timestamp.timestamp()),
            }],
        }
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn channel(&self) -> ChannelKind {
        ChannelKind::Slack
    }

    async fn deliver(&self, alert: &Alert) -> std::result::Result<(), NotificationError> {
        let response = self
            .client
            .post(&self.config.webhook_url)
            .json(&self.payload(alert))
            .send()
            .await
            .map_err(|e| NotificationError::HttpError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::HttpError(format!(
                "Slack returned {}: {}",
                status, body
            )));
        }

        info!(title = %alert.title, "Slack notification sent");
        Ok(())
    }
}

/// Generic JSON webhook notifier; posts the alert itself as the body
pub struct WebhookNotifier {
    client: Client,
    config: WebhookConfig,
}

impl WebhookNotifier {
    /// Create a new webhook notifier
    pub fn new(client: Client, config: WebhookConfig) -> Result<Self> {
        if config.url.is_empty() {
            return Err(Error::config(
                "notifications.webhook.url is required when the webhook is enabled",
            ));
        }
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn channel(&self) -> ChannelKind {
        ChannelKind::Webhook
    }

    async fn deliver(&self, alert: &Alert) -> std::result::Result<(), NotificationError> {
        let mut request = self.client.post(&self.config.url).json(alert);

        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotificationError::HttpError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::HttpError(format!(
                "Webhook returned {}: {}",
                status, body
            )));
        }

        info!(title = %alert.title, url = %self.config.url, "Webhook notification sent");
        Ok(())
    }
}

/// SMTP email notifier (STARTTLS)
pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    config: EmailConfig,
}

impl EmailNotifier {
    /// Create a new email notifier
    pub fn new(config: EmailConfig, timeout: Duration) -> Result<Self> {
        if config.from_email.is_empty() || config.to_emails.is_empty() {
            return Err(Error::config(
                "notifications.email needs from_email and at least one to_emails entry",
            ));
        }

        let server = &config.smtp_server;
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(server)
            .map_err(|e| Error::config(format!("invalid SMTP server '{server}': {e}")))?
            .port(config.smtp_port)
            .timeout(Some(timeout));

        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            config,
        })
    }

    fn message(&self, alert: &Alert) -> std::result::Result<Message, NotificationError> {
        let address_error =
            |e: lettre::address::AddressError| NotificationError::ConfigError(e.to_string());

        let mut builder = Message::builder()
            .from(self.config.from_email.parse().map_err(address_error)?)
            .subject(format!("🚨 Alert: {}", alert.title))
            .header(ContentType::TEXT_HTML);

        for to in &self.config.to_emails {
            builder = builder.to(to.parse().map_err(address_error)?);
        }

        builder
            .body(render_html(alert))
            .map_err(|e| NotificationError::SmtpError(e.to_string()))
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn channel(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn deliver(&self, alert: &Alert) -> std::result::Result<(), NotificationError> {
        let message = self.message(alert)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| NotificationError::SmtpError(e.to_string()))?;

        info!(
            title = %alert.title,
            recipients = self.config.to_emails.len(),
            "Email notification sent"
        );
        Ok(())
    }
}

fn render_html(alert: &Alert) -> String {
    let details = alert
        .details
        .as_deref()
        .map(|d| format!("<pre>{}</pre>", escape_html(d)))
        .unwrap_or_default();

    format!(
        "<html><body>\
         <h2>🚨 Alert</h2>\
         <h3>{title}</h3>\
         <p><strong>Level:</strong> {level}</p>\
         <p><strong>Time:</strong> {time}</p>\
         <p><strong>Source:</strong> {source}</p>\
         <hr><p>{message}</p>{details}\
         </body></html>",
        title = escape_html(&alert.title),
        level = alert.level,
        time = alert.timestamp.to_rfc3339(),
        source = escape_html(&alert.source),
        message = escape_html(&alert.message).replace('\n', "<br>"),
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

// Slack payload types
#[derive(Debug, Serialize)]
struct SlackPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    attachments: Vec<SlackAttachment>,
}

#[derive(Debug, Serialize)]
struct SlackAttachment {
    color: String,
    title: String,
    text: String,
    fields: Vec<SlackField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    footer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ts: Option<i64>,
}

#[derive(Debug, Serialize)]
struct SlackField {
    title: String,
    value: String,
    short: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn slack() -> SlackNotifier {
        SlackNotifier::new(
            Client::new(),
            SlackConfig {
                enabled: true,
                webhook_url: "http://localhost/hook".into(),
                ..SlackConfig::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn test_slack_payload_fields() {
        let alert = Alert::new(
            Level::Critical,
            "Disk Usage Alert (System)",
            "Disk Usage is 99%",
            "custom_threshold_monitor",
            Utc::now(),
        )
        .with_metric("disk_usage_percent", 99.0, 90.0)
        .with_details("mount /");

        let payload = serde_json::to_value(slack().payload(&alert)).unwrap();
        let attachment = &payload["attachments"][0];

        assert_eq!(payload["channel"], "#alerts");
        assert_eq!(attachment["color"], "#ff0000");
        assert_eq!(attachment["title"], "🚨 Disk Usage Alert (System)");
        assert_eq!(attachment["fields"][0]["value"], "CRITICAL");
        assert_eq!(attachment["fields"][2]["value"], "99 / 90");
        assert_eq!(attachment["fields"][3]["short"], false);
    }

    #[test]
    fn test_enabled_channels_require_targets() {
        let config = NotificationsConfig {
            slack: SlackConfig {
                enabled: true,
                ..SlackConfig::default()
            },
            ..NotificationsConfig::default()
        };
        assert!(matches!(build_notifiers(&config), Err(Error::Config(_))));

        let config = NotificationsConfig {
            email: EmailConfig {
                enabled: true,
                ..EmailConfig::default()
            },
            ..NotificationsConfig::default()
        };
        assert!(build_notifiers(&config).is_err());
    }

    #[test]
    fn test_no_channels_enabled_by_default() {
        let notifiers = build_notifiers(&NotificationsConfig::default()).unwrap();
        assert!(notifiers.is_empty());
    }

    #[test]
    fn test_email_message_builds() {
        let notifier = EmailNotifier::new(
            EmailConfig {
                enabled: true,
                from_email: "monitor@example.com".into(),
                to_emails: vec!["ops@example.com".into(), "oncall@example.com".into()],
                ..EmailConfig::default()
            },
            Duration::from_secs(10),
        )
        .unwrap();

        let alert = Alert::new(
            Level::High,
            "Tool <X> Unhealthy",
            "line1\nline2",
            "tool_monitor",
            Utc::now(),
        );
        assert!(notifier.message(&alert).is_ok());

        let html = render_html(&alert);
        assert!(html.contains("Tool &lt;X&gt; Unhealthy"));
        assert!(html.contains("line1<br>line2"));
    }
}
