//! # AlertFlow
//!
//! Alert processing core for tool and system monitoring.
//!
//! AlertFlow turns metric reports into alerts, merges related alerts,
//! escalates recurring or long-running ones and delivers them through
//! throttled notification channels.
//!
//! ## Architecture
//!
//! - **Evaluator**: Compares metrics against per-environment and per-tool thresholds
//! - **Correlator**: Merges related alerts inside a time window into composites
//! - **Escalator**: Raises severity by frequency, duration or persistence
//! - **Throttle**: Global hourly rate limit and cooldown
//! - **Dispatcher**: Routes alerts to email, Slack and webhook channels
//! - **History**: JSON ledger of every dispatch attempt
//!
//! ## Quick Start
//!
//! ```bash
//! # Run one batch against a metric report
//! alertflow check --metrics dashboard_data.json
//!
//! # Show throttle state and routing
//! alertflow status
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod alerting;
pub mod config;
pub mod error;
pub mod models;

pub use config::Config;
pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::alerting::{AlertHistory, AlertProcessor, HistoryFile, ProcessingSummary};
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::models::*;
}
