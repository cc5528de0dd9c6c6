// Location: src/processing/stream.rs

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use parking_lot::Mutex;

use crate::{
    error::{EngineError, Result},
    metrics::MetricsCollector,
    model::InferenceBackend,
    types::{FinishReason, StreamState},
};

use super::common::{prepare_prompt, prepare_sampler, resolve_target_tokens, run_decode_loop, DecodeState};
use super::queue::TokenQueue;

/// Atomic cell holding the current [`StreamState`]
#[derive(Debug)]
pub(crate) struct StreamStatus(AtomicU8);

impl StreamStatus {
    pub fn new() -> Self {
        Self(AtomicU8::new(StreamState::Idle as u8))
    }

    pub fn get(&self) -> StreamState {
        match self.0.load(Ordering::Acquire) {
            1 => StreamState::Starting,
            2 => StreamState::Running,
            3 => StreamState::Completed,
            4 => StreamState::Cancelled,
            5 => StreamState::Failed,
            _ => StreamState::Idle,
        }
    }

    pub fn set(&self, state: StreamState) {
        self.0.store(state as u8, Ordering::Release);
    }

    fn transition(&self, from: StreamState, to: StreamState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Move a starting or running stream to `Cancelled`
    pub fn cancel(&self) {
        if !self.transition(StreamState::Starting, StreamState::Cancelled) {
            self.transition(StreamState::Running, StreamState::Cancelled);
        }
    }
}

/// State shared between the engine and its stream worker
#[derive(Clone)]
pub(crate) struct StreamChannels {
    pub queue: Arc<TokenQueue>,
    pub cancel: Arc<AtomicBool>,
    pub status: Arc<StreamStatus>,
    pub metrics: Arc<MetricsCollector>,
}

/// Inputs of one streaming run
pub(crate) struct StreamJob<B: InferenceBackend> {
    pub backend: Arc<B>,
    pub model: Arc<B::Model>,
    pub state: Arc<Mutex<DecodeState<B>>>,
    pub pending_sampler: Option<B::Sampler>,
    pub context_length: u32,
    pub prompt: String,
    pub max_tokens: i32,
}

/// Spawn the producer thread for a stream. The queue must already be open.
pub(crate) fn spawn_stream_worker<B: InferenceBackend>(
    job: StreamJob<B>,
    channels: StreamChannels,
) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("llama-stream".into())
        .spawn(move || run_stream(job, channels))
        .map_err(|e| EngineError::WorkerError {
            message: format!("failed to spawn stream worker: {}", e),
        })
}

/// Publishes the outcome of a run exactly once. If the worker unwinds
/// before [`finish`](StreamExit::finish), dropping this reports the stream
/// as failed so observers never see it active forever.
struct StreamExit<'a> {
    channels: &'a StreamChannels,
    started: Instant,
    finished: bool,
}

impl<'a> StreamExit<'a> {
    fn new(channels: &'a StreamChannels) -> Self {
        Self {
            channels,
            started: Instant::now(),
            finished: false,
        }
    }

    /// Record metrics, publish the final state, then close the queue.
    /// A raised cancel flag takes precedence over `reason`.
    fn finish(&mut self, generated: usize, reason: FinishReason) -> FinishReason {
        self.finished = true;
        let reason = if self.channels.cancel.load(Ordering::Acquire) {
            FinishReason::Cancelled
        } else {
            reason
        };

        self.channels
            .metrics
            .record_stream_finished(generated, reason, self.started.elapsed());

        // Observers treat an inactive queue as "finished", so publish last.
        self.channels.status.set(match reason {
            FinishReason::EndOfGeneration | FinishReason::TokenBudget => StreamState::Completed,
            FinishReason::Cancelled => StreamState::Cancelled,
            FinishReason::Error => StreamState::Failed,
        });
        self.channels.queue.close();
        reason
    }
}

impl Drop for StreamExit<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::error!("Stream worker unwound before finishing");
            self.finish(0, FinishReason::Error);
        }
    }
}

fn run_stream<B: InferenceBackend>(job: StreamJob<B>, channels: StreamChannels) {
    let mut exit = StreamExit::new(&channels);
    tracing::info!(prompt_len = job.prompt.len(), max_tokens = job.max_tokens, "Stream worker start");

    // Held for the whole run; the session lock is never taken here.
    let mut state = job.state.lock();
    let DecodeState { sampler, context } = &mut *state;
    let sampler = prepare_sampler(&*job.backend, sampler, job.pending_sampler);

    let prompt_tokens = match prepare_prompt(&*job.backend, &*job.model, context, &job.prompt) {
        Ok(count) => count,
        Err(e) => {
            tracing::error!(error = %e, "Stream worker failed before the first token");
            exit.finish(0, FinishReason::Error);
            return;
        }
    };

    let budget = resolve_target_tokens(job.max_tokens, prompt_tokens, job.context_length);
    channels.status.transition(StreamState::Starting, StreamState::Running);

    let cancel = &channels.cancel;
    let queue = &channels.queue;
    let outcome = run_decode_loop(
        &*job.backend,
        &*job.model,
        sampler,
        context,
        budget,
        || cancel.load(Ordering::Acquire),
        |piece| queue.push(piece),
    );

    let finish_reason = exit.finish(outcome.generated, outcome.finish_reason);
    tracing::info!(
        generated = outcome.generated,
        prompt_tokens,
        finish_reason = ?finish_reason,
        "Stream worker done"
    );
}
