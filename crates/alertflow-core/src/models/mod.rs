//! Data models for AlertFlow

mod alert;
mod metrics;
mod prediction;

pub use alert::*;
pub use metrics::*;
pub use prediction::*;
