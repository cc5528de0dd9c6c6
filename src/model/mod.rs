//! Model module: the capability interface of the external inference engine
//! plus the pure policy code (resource tuning, sampler chain layout) and the
//! load sequence built on top of it.

mod loader;
mod sampler;
mod tuning;

pub use loader::{validate_model_file, LoadedModel, ModelLoader};
pub use sampler::{build_sampler_stages, SamplerStage};
pub use tuning::{hardware_concurrency, is_small_model, tune, TunedParams, TuningOverrides};

use std::path::Path;

/// Token id as understood by the backend vocabulary
pub type Token = i32;

/// Role used when formatting a prompt through the model's chat template
pub(crate) const CHAT_ROLE_USER: &str = "user";

/// Operations the session engine needs from an inference engine.
///
/// The handle types are owned values; dropping one releases the backend
/// resource behind it. Implementations must not assume any call ordering
/// beyond what the handle types enforce: a context is only ever used by one
/// thread at a time and the model is shared read-only.
pub trait InferenceBackend: Send + Sync + 'static {
    /// Loaded weights and vocabulary
    type Model: Send + Sync + 'static;
    /// Inference context (KV cache, thread pool)
    type Context: Send + 'static;
    /// Materialized sampler chain
    type Sampler: Send + 'static;

    /// Process-wide backend initialization. Called at most once per backend type.
    fn init(&self);

    fn load_model(&self, path: &Path, gpu_layers: u32) -> anyhow::Result<Self::Model>;

    fn parameter_count(&self, model: &Self::Model) -> u64;

    fn create_context(&self, model: &Self::Model, params: &TunedParams) -> anyhow::Result<Self::Context>;

    /// Context window actually granted by the backend
    fn context_length(&self, context: &Self::Context) -> u32;

    /// Chat template embedded in the model, if any
    fn chat_template(&self, model: &Self::Model) -> Option<String>;

    /// Format a single message with the generation prompt appended
    fn apply_chat_template(&self, template: &str, role: &str, content: &str) -> anyhow::Result<String>;

    fn tokenize(&self, model: &Self::Model, text: &str) -> anyhow::Result<Vec<Token>>;

    /// Feed tokens into the context, advancing its state
    fn decode(&self, context: &mut Self::Context, tokens: &[Token]) -> anyhow::Result<()>;

    /// Materialize the stages, in order, into a backend chain
    fn build_sampler(&self, model: &Self::Model, stages: &[SamplerStage]) -> Self::Sampler;

    /// Clear stateful stages (mirostat, penalties)
    fn reset_sampler(&self, sampler: &mut Self::Sampler);

    fn sample(&self, sampler: &mut Self::Sampler, context: &mut Self::Context) -> Token;

    fn is_end_of_generation(&self, model: &Self::Model, token: Token) -> bool;

    fn token_to_text(&self, model: &Self::Model, token: Token) -> anyhow::Result<String>;
}
