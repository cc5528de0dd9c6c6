use std::sync::Arc;

use crate::{
    config::{EngineConfig, StreamConfig},
    error::Result,
    model::{InferenceBackend, ModelLoader},
};

use super::engine::LlamaEngine;

/// Builder for constructing a [`LlamaEngine`]
pub struct EngineBuilder<B: InferenceBackend> {
    backend: Arc<B>,
    config: Option<EngineConfig>,
    stream_config: Option<StreamConfig>,
    hardware_threads: Option<u32>,
}

impl<B: InferenceBackend> EngineBuilder<B> {
    /// Create a new builder instance
    pub fn new(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
            config: None,
            stream_config: None,
            hardware_threads: None,
        }
    }

    /// Set the engine configuration. A non-empty model path makes
    /// [`build`](Self::build) load the model.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Override the forwarder settings from the configuration
    pub fn with_stream_config(mut self, stream_config: StreamConfig) -> Self {
        self.stream_config = Some(stream_config);
        self
    }

    /// Pin the hardware concurrency used for resource tuning
    pub fn with_hardware_threads(mut self, threads: u32) -> Self {
        self.hardware_threads = Some(threads);
        self
    }

    /// Build the engine instance
    pub fn build(self) -> Result<LlamaEngine<B>> {
        let config = self.config.unwrap_or_default();
        let stream_config = self.stream_config.unwrap_or_else(|| config.stream.clone());
        stream_config.validate()?;

        let mut loader = ModelLoader::new(self.backend.clone());
        if let Some(threads) = self.hardware_threads {
            loader = loader.with_hardware_threads(threads);
        }

        let engine = LlamaEngine::from_parts(self.backend, loader, stream_config);
        engine.initialize_backend();

        if !config.load.model_path.as_os_str().is_empty() {
            engine.load(&config.load)?;
        }

        Ok(engine)
    }
}
