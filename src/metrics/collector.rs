use std::collections::VecDeque;
use std::time::{Duration, Instant};
use parking_lot::RwLock;

use crate::types::{FinishReason, GenerationOutput};

use super::{MetricsSnapshot, StreamMetrics, MAX_METRICS_HISTORY};

/// Collects load, generation and stream counters
pub struct MetricsCollector {
    state: RwLock<MetricsState>,
    start_time: Instant,
}

#[derive(Debug, Default)]
struct MetricsState {
    loads: usize,

    generations: usize,
    generated_tokens: usize,
    generation_errors: usize,
    generation_time: Duration,
    latencies: VecDeque<Duration>,

    streams: StreamMetrics,
    stream_time: Duration,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MetricsState::default()),
            start_time: Instant::now(),
        }
    }

    pub fn record_load(&self) {
        self.state.write().loads += 1;
    }

    pub fn record_generation(&self, output: &GenerationOutput) {
        let mut state = self.state.write();
        state.generations += 1;
        state.generated_tokens += output.tokens_generated;
        state.generation_time += output.processing_time;
        if output.finish_reason == FinishReason::Error {
            state.generation_errors += 1;
        }

        state.latencies.push_back(output.processing_time);
        if state.latencies.len() > MAX_METRICS_HISTORY {
            state.latencies.pop_front();
        }
    }

    pub fn record_stream_started(&self) {
        self.state.write().streams.started += 1;
    }

    pub fn record_stream_finished(&self, tokens: usize, reason: FinishReason, duration: Duration) {
        let mut state = self.state.write();
        state.streams.tokens += tokens;
        state.stream_time += duration;
        match reason {
            FinishReason::EndOfGeneration | FinishReason::TokenBudget => state.streams.completed += 1,
            FinishReason::Cancelled => state.streams.cancelled += 1,
            FinishReason::Error => state.streams.failed += 1,
        }
    }

    /// Get a snapshot of current metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.state.read();

        let mut latencies: Vec<Duration> = state.latencies.iter().copied().collect();
        latencies.sort();
        let average_latency = if latencies.is_empty() {
            Duration::default()
        } else {
            latencies.iter().sum::<Duration>() / latencies.len() as u32
        };
        let p95_idx = (latencies.len() * 95 / 100).min(latencies.len().saturating_sub(1));

        let busy = (state.generation_time + state.stream_time).as_secs_f32();
        let tokens = state.generated_tokens + state.streams.tokens;
        let tokens_per_second = if busy > 0.0 { tokens as f32 / busy } else { 0.0 };

        MetricsSnapshot {
            uptime: self.start_time.elapsed(),
            loads: state.loads,
            generations: state.generations,
            generated_tokens: state.generated_tokens,
            generation_errors: state.generation_errors,
            average_latency,
            p95_latency: latencies.get(p95_idx).copied().unwrap_or_default(),
            tokens_per_second,
            streams: state.streams.clone(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
