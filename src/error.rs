use std::path::PathBuf;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the session engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Configuration error for {parameter}: {message}")]
    ConfigurationError {
        message: String,
        parameter: String,
    },

    #[error("Model file {}: {reason}", path.display())]
    ModelFileError {
        path: PathBuf,
        reason: ModelFileProblem,
    },

    #[error("Model error: {message}")]
    ModelError { message: String },

    #[error("Context error: {message}")]
    ContextError { message: String },

    #[error("No model loaded")]
    NotReady,

    #[error("Prompt must not be empty")]
    InvalidPrompt,

    #[error("Tokenization failed: {message}")]
    TokenizationError { message: String },

    #[error("Decode failed: {message}")]
    DecodeError { message: String },

    #[error("Worker error: {message}")]
    WorkerError { message: String },
}

/// Why a model file was rejected before loading
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelFileProblem {
    Missing,
    UnknownSize,
    Empty,
    TooLarge { actual_bytes: u64, max_bytes: u64 },
}

impl std::fmt::Display for ModelFileProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelFileProblem::Missing => write!(f, "not found"),
            ModelFileProblem::UnknownSize => write!(f, "unable to determine size"),
            ModelFileProblem::Empty => write!(f, "file is empty"),
            ModelFileProblem::TooLarge { actual_bytes, max_bytes } => write!(
                f,
                "size {} MB exceeds {} MB guard",
                actual_bytes / (1024 * 1024),
                max_bytes / (1024 * 1024)
            ),
        }
    }
}

impl EngineError {
    pub(crate) fn config(parameter: &str, message: impl Into<String>) -> Self {
        EngineError::ConfigurationError {
            message: message.into(),
            parameter: parameter.to_string(),
        }
    }

    /// True when the call was rejected because no session is loaded
    pub fn is_not_ready(&self) -> bool {
        matches!(self, EngineError::NotReady)
    }

    /// True for caller-side mistakes (bad config, bad model file, bad prompt)
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            EngineError::ConfigurationError { .. }
                | EngineError::ModelFileError { .. }
                | EngineError::InvalidPrompt
        )
    }
}

/// Render a backend failure with its full context chain
pub(crate) fn describe(err: &anyhow::Error) -> String {
    format!("{:#}", err)
}
