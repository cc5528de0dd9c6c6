// Location: src/config.rs

use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Serialize, Deserialize};

use crate::error::{EngineError, Result};

/// Default soft guard on model file size (sized for 4-bit 7B models)
pub const DEFAULT_MAX_MODEL_BYTES: u64 = 3_500 * 1024 * 1024;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub load: LoadConfig,
    pub stream: StreamConfig,
    pub log_level: LogLevel,
}

/// Parameters for loading a model into a new session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Path to the model file
    pub model_path: PathBuf,

    /// Context length override, 0 lets the tuner decide
    pub context_length: u32,

    /// Thread count override, 0 lets the tuner decide
    pub threads: u32,

    /// Batch size override, 0 lets the tuner decide
    pub batch_size: u32,

    /// Layers to offload to the GPU
    pub gpu_layers: u32,

    /// Sampler configuration the first chain is built from
    pub sampler: SamplerConfig,

    /// Refuse model files larger than this
    pub max_model_bytes: u64,
}

/// Mirostat sampling mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MirostatMode {
    #[default]
    Disabled,
    V1,
    V2,
}

impl From<i32> for MirostatMode {
    fn from(code: i32) -> Self {
        match code {
            1 => MirostatMode::V1,
            2 => MirostatMode::V2,
            _ => MirostatMode::Disabled,
        }
    }
}

/// Token selection parameters. Non-positive advanced values disable their stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub temperature: f32,
    pub top_k: i32,
    pub top_p: f32,
    pub min_p: f32,
    pub typical_p: f32,
    pub top_n_sigma: f32,
    pub mirostat: MirostatMode,
    pub mirostat_tau: f32,
    pub mirostat_eta: f32,
    pub repeat_penalty: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    /// Penalty window, non-positive means 64
    pub repeat_last_n: i32,
    /// Minimum candidates kept by filter stages, non-positive means 1
    pub min_keep: i32,
    pub seed: u32,
}

/// Pacing of the stream event forwarder
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Flush after this many fragments
    pub flush_every_fragments: usize,

    /// Flush when this much time passed since the last flush
    pub flush_interval: Duration,

    /// Sleep between polls while the stream is active but the queue is empty
    pub idle_poll_interval: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::new(),
            context_length: 0,
            threads: 0,
            batch_size: 0,
            gpu_layers: 0,
            sampler: SamplerConfig::default(),
            max_model_bytes: DEFAULT_MAX_MODEL_BYTES,
        }
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_k: 40,
            top_p: 0.95,
            min_p: 0.0,
            typical_p: 0.0,
            top_n_sigma: 0.0,
            mirostat: MirostatMode::Disabled,
            mirostat_tau: 0.0,
            mirostat_eta: 0.0,
            repeat_penalty: 0.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            repeat_last_n: 0,
            min_keep: 0,
            seed: 0,
        }
    }
}

impl SamplerConfig {
    /// Greedy-equivalent setup: only the single most likely token survives
    pub fn greedy() -> Self {
        Self {
            temperature: 0.0,
            top_k: 1,
            top_p: 1.0,
            ..Self::default()
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            flush_every_fragments: 4,
            flush_interval: Duration::from_millis(30),
            idle_poll_interval: Duration::from_millis(8),
        }
    }
}

impl LoadConfig {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.model_path.as_os_str().to_string_lossy().trim().is_empty() {
            return Err(EngineError::config("model_path", "Model path must be provided"));
        }
        if self.max_model_bytes == 0 {
            return Err(EngineError::config("max_model_bytes", "Size guard must be positive"));
        }
        Ok(())
    }
}

impl StreamConfig {
    pub fn validate(&self) -> Result<()> {
        if self.flush_every_fragments == 0 {
            return Err(EngineError::config(
                "flush_every_fragments",
                "Must flush after at least one fragment",
            ));
        }
        if self.idle_poll_interval.is_zero() {
            return Err(EngineError::config("idle_poll_interval", "Poll interval must be positive"));
        }
        Ok(())
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        self.load.validate()?;
        self.stream.validate()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| EngineError::config("json", format!("Invalid configuration: {}", e)))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            EngineError::config("path", format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&contents)
    }
}
