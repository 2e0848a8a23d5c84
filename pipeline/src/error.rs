//! Error types for the analysis pipeline.

use charsim_embeddings::EmbeddingError;
use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur while starting or running an analysis.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Embedding retrieval or vector math failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The background task ended without a final message.
    #[error("analysis worker stopped unexpectedly")]
    WorkerLost,
}

impl PipelineError {
    /// Stable, machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Embedding(e) => e.kind(),
            Self::Config(_) => "configuration",
            Self::WorkerLost => "internal",
        }
    }
}
