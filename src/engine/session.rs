use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use parking_lot::Mutex;

use crate::{
    config::{LoadConfig, SamplerConfig},
    model::{InferenceBackend, LoadedModel, TunedParams},
    processing::DecodeState,
    types::SessionInfo,
};

/// The live binding of a model, its context and sampler chain.
///
/// Field order is drop order: sampler chains, then the context, then the
/// model. `Drop` stops the worker first so it is the last owner of the
/// shared handles by the time they are freed.
pub(crate) struct Session<B: InferenceBackend> {
    /// Chain built by a sampler update, installed at the next generation
    pub pending_sampler: Option<B::Sampler>,
    pub state: Arc<Mutex<DecodeState<B>>>,
    pub model: Arc<B::Model>,
    pub worker: Option<JoinHandle<()>>,
    cancel: Arc<AtomicBool>,
    pub sampler_config: SamplerConfig,
    pub tuned: TunedParams,
    pub context_length: u32,
    pub gpu_layers: u32,
}

impl<B: InferenceBackend> Session<B> {
    pub fn new(loaded: LoadedModel<B>, config: &LoadConfig, cancel: Arc<AtomicBool>) -> Self {
        let LoadedModel {
            sampler,
            context,
            model,
            tuned,
            context_length,
        } = loaded;

        Self {
            pending_sampler: None,
            state: Arc::new(Mutex::new(DecodeState {
                sampler,
                context,
            })),
            model: Arc::new(model),
            worker: None,
            cancel,
            sampler_config: config.sampler.clone(),
            tuned,
            context_length,
            gpu_layers: config.gpu_layers,
        }
    }

    /// Request cancellation of the running worker, if any, and wait for it
    pub fn stop_worker(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        self.cancel.store(true, Ordering::Release);
        if worker.join().is_err() {
            tracing::error!("Stream worker panicked");
        } else {
            tracing::debug!("Stream worker joined");
        }
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            tuned: self.tuned,
            context_length: self.context_length,
            gpu_layers: self.gpu_layers,
            sampler: self.sampler_config.clone(),
        }
    }
}

impl<B: InferenceBackend> Drop for Session<B> {
    fn drop(&mut self) {
        self.stop_worker();
        tracing::debug!("Freeing session handles");
    }
}
