//! Error types for embedding generation and vector math.

use thiserror::Error;

/// Result type alias for embedding operations.
pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// Maximum number of characters of an error body kept in [`EmbeddingError::Protocol`].
pub const MAX_ERROR_BODY_CHARS: usize = 200;

/// Errors that can occur while fetching embeddings or doing math over them.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// Endpoint missing or unusable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The request never produced an HTTP response.
    #[error("network request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// Non-2xx status from the embedding server.
    #[error("API error ({status}): {body}")]
    Protocol { status: u16, body: String },

    /// 2xx response without a usable embedding.
    #[error("invalid embedding response: {0}")]
    ResponseShape(String),

    /// Vectors of different dimensions were combined.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// Nothing to work with.
    #[error("empty input: {0}")]
    EmptyInput(String),
}

impl EmbeddingError {
    /// Build a protocol error, truncating the body to [`MAX_ERROR_BODY_CHARS`].
    pub fn protocol(status: u16, body: &str) -> Self {
        Self::Protocol {
            status,
            body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        }
    }

    /// Stable, machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Transport(_) => "transport",
            Self::Protocol { .. } => "protocol",
            Self::ResponseShape(_) => "response_shape",
            Self::ShapeMismatch { .. } => "shape_mismatch",
            Self::EmptyInput(_) => "empty_input",
        }
    }
}

impl From<reqwest::Error> for EmbeddingError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            Self::Configuration(err.to_string())
        } else {
            Self::Transport(err)
        }
    }
}
