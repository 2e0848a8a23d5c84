//! # Embeddings
//!
//! Text embedding retrieval and the vector math used to compare embeddings.
//!
//! ## Features
//!
//! - **Embedding Generation**: Convert text to dense vectors through an HTTP inference server
//! - **Multiple Formats**: OpenAI-compatible, KoboldCpp and plain `{text}` servers
//! - **Vector Math**: Dot product, magnitude, cosine similarity, L1 distance, mean
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Embeddings                                   │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ConnectionConfig ──► HttpEmbeddingClient ──► Embedding         │
//! │                             │                     │             │
//! │                             ▼                     ▼             │
//! │                       ApiFormat            similarity::*        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod provider;
pub mod similarity;

pub use error::{EmbeddingError, Result};
pub use provider::{
    ApiFormat, ConnectionConfig, EmbeddingProvider, EmbeddingRequest, EmbeddingResponse,
    HttpEmbeddingClient,
};
pub use similarity::{cosine_similarity, l1_distance, rescale_similarity};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;
