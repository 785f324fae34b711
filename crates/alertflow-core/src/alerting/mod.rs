//! Alert pipeline for AlertFlow
//!
//! Threshold evaluation, correlation, escalation, throttling and channel
//! dispatch, plus the JSON history they all read from.

mod correlator;
mod dispatcher;
mod escalator;
mod evaluator;
mod history;
mod notifier;
mod pipeline;
mod throttle;

pub use correlator::{Correlator, CORRELATOR_SOURCE};
pub use dispatcher::{DispatchReport, Dispatcher};
pub use escalator::{Escalation, Escalator};
pub use evaluator::{
    ThresholdEvaluator, ALERT_SYSTEM_SOURCE, PREDICTIVE_SOURCE, THRESHOLD_SOURCE,
    TOOL_MONITOR_SOURCE,
};
pub use history::{AlertHistory, HistoryFile};
pub use notifier::{
    build_notifiers, EmailNotifier, NotificationError, NotificationResult, Notifier, SlackNotifier,
    WebhookNotifier,
};
pub use pipeline::{AlertProcessor, ProcessingSummary};
pub use throttle::{ThrottleDecision, ThrottleGate, ThrottleStatus};
