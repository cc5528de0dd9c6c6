//! Common type definitions used throughout the engine

use std::time::Duration;
use serde::{Serialize, Deserialize};

use crate::config::SamplerConfig;
use crate::model::TunedParams;

/// A prompt plus the number of tokens the caller wants back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    /// Non-positive asks the engine to size the budget from the context
    pub max_tokens: i32,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, max_tokens: i32) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens,
        }
    }
}

/// Why a generation loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinishReason {
    /// The model emitted an end-of-generation token
    EndOfGeneration,
    /// The resolved token budget was reached
    TokenBudget,
    /// The caller cancelled the stream
    Cancelled,
    /// Tokenization, decoding or piece conversion failed
    Error,
}

/// Lifecycle of the most recent stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamState {
    Idle,
    Starting,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl StreamState {
    pub fn is_finished(self) -> bool {
        matches!(self, StreamState::Completed | StreamState::Cancelled | StreamState::Failed)
    }
}

/// Result of a synchronous generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOutput {
    /// Generated text, possibly partial when `finish_reason` is `Error`
    pub text: String,
    /// Number of tokens the formatted prompt occupied
    pub prompt_tokens: usize,
    /// Number of tokens generated
    pub tokens_generated: usize,
    pub finish_reason: FinishReason,
    /// Time taken to process
    pub processing_time: Duration,
}

impl GenerationOutput {
    pub(crate) fn failed(prompt_tokens: usize, processing_time: Duration) -> Self {
        Self {
            text: String::new(),
            prompt_tokens,
            tokens_generated: 0,
            finish_reason: FinishReason::Error,
            processing_time,
        }
    }
}

/// Events delivered by the stream forwarder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// One or more coalesced fragments
    Token(String),
    /// The stream finished and the queue is drained
    Done,
}

/// Snapshot of the live session's tuned resources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub tuned: TunedParams,
    /// Context length reported by the backend
    pub context_length: u32,
    pub gpu_layers: u32,
    pub sampler: SamplerConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_output_is_empty() {
        let output = GenerationOutput::failed(12, Duration::from_millis(3));
        assert!(output.text.is_empty());
        assert_eq!(output.prompt_tokens, 12);
        assert_eq!(output.tokens_generated, 0);
        assert_eq!(output.finish_reason, FinishReason::Error);
    }

    #[test]
    fn test_request_roundtrips_through_json() {
        let request = GenerationRequest::new("hello", 0);
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"prompt":"hello","max_tokens":0}"#);
    }
}
