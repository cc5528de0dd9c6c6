use std::time::Duration;
use serde::{Serialize, Deserialize};

/// Snapshot of all metrics at a point in time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Time since the collector was created
    pub uptime: Duration,

    /// Successful model loads
    pub loads: usize,

    /// Synchronous generations completed
    pub generations: usize,

    /// Tokens produced by synchronous generations
    pub generated_tokens: usize,

    /// Synchronous generations that stopped on an error
    pub generation_errors: usize,

    /// Average generation latency
    pub average_latency: Duration,

    /// 95th percentile generation latency
    pub p95_latency: Duration,

    /// Average tokens per second over both paths
    pub tokens_per_second: f32,

    pub streams: StreamMetrics,
}

/// Streaming counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMetrics {
    pub started: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub failed: usize,
    /// Tokens pushed to the handoff queue
    pub tokens: usize,
}
