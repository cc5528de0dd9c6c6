//! Generation and streaming metrics

mod collector;
mod types;

pub use collector::MetricsCollector;
pub use types::{MetricsSnapshot, StreamMetrics};

/// Latency samples kept for percentile estimates
pub(crate) const MAX_METRICS_HISTORY: usize = 1000;
