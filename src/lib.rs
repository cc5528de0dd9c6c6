//! Llama Session - on-device language model session manager
//!
//! This crate owns the lifecycle of a single inference session on top of an
//! external inference engine (see [`InferenceBackend`]): resource tuning at
//! load time, sampler chain assembly, blocking generation, and a streaming
//! generation worker with cooperative cancellation and a non-blocking
//! fragment queue.

// Public modules
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod model;
pub mod processing;
pub mod types;
pub mod utils;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-exports for public API
pub use config::{EngineConfig, LoadConfig, LogLevel, MirostatMode, SamplerConfig, StreamConfig};
pub use engine::{EngineBuilder, LlamaEngine};
pub use error::{EngineError, ModelFileProblem, Result};
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use model::{InferenceBackend, SamplerStage, Token, TunedParams};
pub use processing::{resolve_target_tokens, StreamForwarder, TokenQueue};
pub use types::{FinishReason, GenerationOutput, GenerationRequest, SessionInfo, StreamEvent, StreamState};
pub use utils::{setup_logging, LogConfig};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_numbers() {
        assert!(!VERSION.is_empty());
    }
}
