use std::path::Path;
use std::sync::Arc;

use crate::config::LoadConfig;
use crate::error::{describe, EngineError, ModelFileProblem, Result};

use super::{
    build_sampler_stages, hardware_concurrency, tune, InferenceBackend, TunedParams, TuningOverrides,
};

/// Check that a model file exists, is non-empty and fits the size guard.
/// Returns its size in bytes.
pub fn validate_model_file(path: &Path, max_bytes: u64) -> Result<u64> {
    let reject = |reason| EngineError::ModelFileError {
        path: path.to_path_buf(),
        reason,
    };

    if !path.exists() {
        return Err(reject(ModelFileProblem::Missing));
    }
    let size = std::fs::metadata(path)
        .map(|meta| meta.len())
        .map_err(|_| reject(ModelFileProblem::UnknownSize))?;
    if size == 0 {
        return Err(reject(ModelFileProblem::Empty));
    }
    if size > max_bytes {
        return Err(reject(ModelFileProblem::TooLarge {
            actual_bytes: size,
            max_bytes,
        }));
    }
    Ok(size)
}

/// Handles produced by a successful load. Field order is drop order:
/// sampler chain, then context, then model.
pub struct LoadedModel<B: InferenceBackend> {
    pub sampler: B::Sampler,
    pub context: B::Context,
    pub model: B::Model,
    pub tuned: TunedParams,
    /// Context length granted by the backend
    pub context_length: u32,
}

/// Runs the load sequence: weights, tuning, context, first sampler chain
pub struct ModelLoader<B: InferenceBackend> {
    backend: Arc<B>,
    hardware_threads: u32,
}

impl<B: InferenceBackend> ModelLoader<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            hardware_threads: hardware_concurrency(),
        }
    }

    /// Pin the hardware concurrency the tuner sees
    pub fn with_hardware_threads(mut self, threads: u32) -> Self {
        self.hardware_threads = threads.max(1);
        self
    }

    /// Load weights and build a context for them. Nothing is leaked on
    /// failure: handles created before the failing step are dropped.
    pub fn load(&self, config: &LoadConfig) -> Result<LoadedModel<B>> {
        let path = config.model_path.as_path();
        tracing::info!(path = %path.display(), gpu_layers = config.gpu_layers, "Loading model");

        let model = self.backend.load_model(path, config.gpu_layers).map_err(|e| {
            let message = describe(&e);
            tracing::error!(path = %path.display(), error = %message, "Model load failed");
            EngineError::ModelError { message }
        })?;

        let parameter_count = self.backend.parameter_count(&model);
        let tuned = tune(
            parameter_count,
            self.hardware_threads,
            TuningOverrides {
                context_length: config.context_length,
                threads: config.threads,
                batch_size: config.batch_size,
            },
        );

        let context = self.backend.create_context(&model, &tuned).map_err(|e| {
            let message = describe(&e);
            tracing::error!(error = %message, "Context creation failed");
            EngineError::ContextError { message }
        })?;
        let context_length = self.backend.context_length(&context);

        let stages = build_sampler_stages(&config.sampler);
        let sampler = self.backend.build_sampler(&model, &stages);

        tracing::info!(
            ctx = context_length,
            threads = tuned.threads,
            threads_batch = tuned.batch_threads,
            n_batch = tuned.batch_size,
            params = parameter_count,
            small_model = tuned.small_model,
            stages = stages.len(),
            "Model loaded"
        );

        Ok(LoadedModel {
            sampler,
            context,
            model,
            tuned,
            context_length,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = validate_model_file(&dir.path().join("absent.gguf"), 1024).unwrap_err();
        assert!(matches!(
            err,
            EngineError::ModelFileError { reason: ModelFileProblem::Missing, .. }
        ));
    }

    #[test]
    fn test_empty_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = validate_model_file(file.path(), 1024).unwrap_err();
        assert!(matches!(
            err,
            EngineError::ModelFileError { reason: ModelFileProblem::Empty, .. }
        ));
    }

    #[test]
    fn test_size_guard() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 2048]).unwrap();
        file.flush().unwrap();

        assert_eq!(validate_model_file(file.path(), 4096).unwrap(), 2048);
        assert_eq!(validate_model_file(file.path(), 2048).unwrap(), 2048);

        let err = validate_model_file(file.path(), 1024).unwrap_err();
        assert!(matches!(
            err,
            EngineError::ModelFileError {
                reason: ModelFileProblem::TooLarge { actual_bytes: 2048, max_bytes: 1024 },
                ..
            }
        ));
    }
}
