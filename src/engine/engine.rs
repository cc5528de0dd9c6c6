use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use parking_lot::Mutex;

use crate::{
    config::{LoadConfig, SamplerConfig, StreamConfig},
    error::{EngineError, Result},
    metrics::{MetricsCollector, MetricsSnapshot},
    model::{build_sampler_stages, validate_model_file, InferenceBackend, ModelLoader},
    processing::{
        generate_blocking, spawn_stream_worker, BlockingJob, StreamChannels, StreamForwarder, StreamJob,
        StreamStatus, TokenQueue,
    },
    types::{FinishReason, GenerationOutput, GenerationRequest, SessionInfo, StreamState},
    utils::call_once_per_type,
};

use super::builder::EngineBuilder;
use super::session::Session;

/// Main entry point: owns at most one live session and the streaming
/// machinery around it.
///
/// All methods take `&self`; share the engine between threads with an
/// `Arc`. Load, release, sampler updates and synchronous generation are
/// serialized on the session lock. Polling, cancelling and the stream state
/// queries never take that lock.
pub struct LlamaEngine<B: InferenceBackend> {
    backend: Arc<B>,
    loader: ModelLoader<B>,
    session: Mutex<Option<Session<B>>>,
    queue: Arc<TokenQueue>,
    cancel: Arc<AtomicBool>,
    status: Arc<StreamStatus>,
    metrics: Arc<MetricsCollector>,
    stream_config: StreamConfig,
}

impl<B: InferenceBackend> LlamaEngine<B> {
    /// Create an engine with no session and default stream settings
    pub fn new(backend: B) -> Self {
        let backend = Arc::new(backend);
        Self::from_parts(backend.clone(), ModelLoader::new(backend), StreamConfig::default())
    }

    /// Create a new engine builder
    pub fn builder(backend: B) -> EngineBuilder<B> {
        EngineBuilder::new(backend)
    }

    pub(crate) fn from_parts(backend: Arc<B>, loader: ModelLoader<B>, stream_config: StreamConfig) -> Self {
        Self {
            backend,
            loader,
            session: Mutex::new(None),
            queue: Arc::new(TokenQueue::new()),
            cancel: Arc::new(AtomicBool::new(false)),
            status: Arc::new(StreamStatus::new()),
            metrics: Arc::new(MetricsCollector::new()),
            stream_config,
        }
    }

    /// Run the backend's global initialization. Only the first call per
    /// backend type in the process has any effect.
    pub fn initialize_backend(&self) {
        let backend = &self.backend;
        if call_once_per_type::<B>(|| backend.init()) {
            tracing::info!("Inference backend initialized");
        }
    }

    /// Load a model and make it the live session.
    ///
    /// Configuration and model-file problems are reported before anything
    /// changes. Past that point the previous session is torn down first
    /// (its worker cancelled and joined), so a failed load leaves no session.
    pub fn load(&self, config: &LoadConfig) -> Result<()> {
        self.initialize_backend();
        config.validate()?;
        let file_size = validate_model_file(&config.model_path, config.max_model_bytes)?;

        let started = Instant::now();
        let mut session = self.session.lock();
        if session.take().is_some() {
            tracing::info!("Released previous session before load");
        }
        self.queue.close();
        self.queue.clear();

        let loaded = self.loader.load(config)?;
        *session = Some(Session::new(loaded, config, self.cancel.clone()));

        self.metrics.record_load();
        tracing::info!(
            bytes = file_size,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Session ready"
        );
        Ok(())
    }

    /// Replace the sampler configuration. The new chain is built now and
    /// takes effect at the start of the next generation; a running stream
    /// keeps the chain it started with.
    pub fn update_sampler(&self, config: SamplerConfig) -> Result<()> {
        let mut guard = self.session.lock();
        let session = guard.as_mut().ok_or(EngineError::NotReady)?;

        let stages = build_sampler_stages(&config);
        session.pending_sampler = Some(self.backend.build_sampler(&session.model, &stages));
        session.sampler_config = config;

        tracing::debug!(stages = stages.len(), "Sampler chain rebuilt");
        Ok(())
    }

    /// Generate a completion on the calling thread.
    ///
    /// Blocks until done, and behind a running stream if there is one.
    /// Tokenize and decode failures do not fail the call: the output carries
    /// the text produced so far and `FinishReason::Error`.
    pub fn generate(&self, prompt: &str, max_tokens: i32) -> Result<GenerationOutput> {
        if prompt.is_empty() {
            return Err(EngineError::InvalidPrompt);
        }

        let mut guard = self.session.lock();
        let session = guard.as_mut().ok_or(EngineError::NotReady)?;
        let mut state = session.state.lock();

        let output = generate_blocking(
            BlockingJob {
                backend: &*self.backend,
                model: &*session.model,
                pending_sampler: session.pending_sampler.take(),
                context_length: session.context_length,
                prompt,
                max_tokens,
            },
            &mut state,
        );

        self.metrics.record_generation(&output);
        Ok(output)
    }

    pub fn generate_request(&self, request: &GenerationRequest) -> Result<GenerationOutput> {
        self.generate(&request.prompt, request.max_tokens)
    }

    /// Run [`generate`](Self::generate) on tokio's blocking pool
    pub async fn generate_async(self: &Arc<Self>, prompt: impl Into<String>, max_tokens: i32) -> Result<GenerationOutput> {
        let engine = Arc::clone(self);
        let prompt = prompt.into();

        tokio::task::spawn_blocking(move || engine.generate(&prompt, max_tokens))
            .await
            .map_err(|e| EngineError::WorkerError {
                message: format!("generation task failed: {}", e),
            })?
    }

    /// Start a streaming generation on a background worker and return
    /// immediately.
    ///
    /// A previous worker is cancelled and joined first, and the handoff
    /// queue starts empty. Fragments are read with
    /// [`poll_fragment`](Self::poll_fragment) or a [`StreamForwarder`].
    pub fn start_stream(&self, prompt: &str, max_tokens: i32) -> Result<()> {
        if prompt.is_empty() {
            return Err(EngineError::InvalidPrompt);
        }

        let mut guard = self.session.lock();
        let session = guard.as_mut().ok_or(EngineError::NotReady)?;
        session.stop_worker();

        self.queue.open();
        self.cancel.store(false, Ordering::Release);
        self.status.set(StreamState::Starting);

        let had_pending = session.pending_sampler.is_some();
        let job = StreamJob {
            backend: self.backend.clone(),
            model: session.model.clone(),
            state: session.state.clone(),
            pending_sampler: session.pending_sampler.take(),
            context_length: session.context_length,
            prompt: prompt.to_string(),
            max_tokens,
        };

        // Counted before the worker exists so it can never finish first
        self.metrics.record_stream_started();
        match spawn_stream_worker(job, self.channels()) {
            Ok(worker) => {
                session.worker = Some(worker);
                tracing::debug!(max_tokens, "Stream started");
                Ok(())
            }
            Err(e) => {
                self.metrics.record_stream_finished(0, FinishReason::Error, Duration::ZERO);
                self.queue.close();
                self.status.set(StreamState::Failed);
                if had_pending {
                    let stages = build_sampler_stages(&session.sampler_config);
                    session.pending_sampler = Some(self.backend.build_sampler(&session.model, &stages));
                }
                tracing::error!(error = %e, "Stream start failed");
                Err(e)
            }
        }
    }

    /// Pop the oldest streamed fragment. Never blocks.
    pub fn poll_fragment(&self) -> Option<String> {
        self.queue.try_pop()
    }

    /// Ask the running stream to stop.
    ///
    /// The stream reads as inactive as soon as this returns and nothing more
    /// is appended; fragments already queued stay poll-able. The worker
    /// itself exits at its next token boundary.
    pub fn cancel_stream(&self) {
        self.cancel.store(true, Ordering::Release);
        self.queue.close();
        self.status.cancel();
        tracing::debug!("Stream cancel requested");
    }

    pub fn is_stream_active(&self) -> bool {
        self.queue.is_active()
    }

    pub fn stream_state(&self) -> StreamState {
        self.status.get()
    }

    /// Spawn a consumer that batches the current stream's fragments into
    /// events. It competes with [`poll_fragment`](Self::poll_fragment) for
    /// fragments, so use one or the other.
    pub fn forward_stream(&self) -> Result<StreamForwarder> {
        StreamForwarder::spawn(self.queue.clone(), self.stream_config.clone())
    }

    /// Tear down the live session, if any. Safe to call repeatedly.
    pub fn release(&self) {
        let mut session = self.session.lock();
        if session.take().is_some() {
            tracing::info!("Session released");
        }
        self.queue.close();
        self.queue.clear();
    }

    pub fn is_loaded(&self) -> bool {
        self.session.lock().is_some()
    }

    pub fn session_info(&self) -> Option<SessionInfo> {
        self.session.lock().as_ref().map(Session::info)
    }

    /// Get a snapshot of current metrics
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn channels(&self) -> StreamChannels {
        StreamChannels {
            queue: self.queue.clone(),
            cancel: self.cancel.clone(),
            status: self.status.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<B: InferenceBackend> Drop for LlamaEngine<B> {
    fn drop(&mut self) {
        self.release();
    }
}
